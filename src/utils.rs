use crate::schema::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%B %d, %Y", "%d %B %Y",
];

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// How period values should be read when ordering them for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodKind {
    Numeric,
    MonthlyName,
    Daily,
    Unknown,
}

pub fn detect_period_kind(value: &Value) -> PeriodKind {
    match value {
        Value::Number(n) if !n.is_nan() => PeriodKind::Numeric,
        Value::Text(s) if find_month_name(s).is_some() => PeriodKind::MonthlyName,
        Value::Text(s) if parse_calendar_date(s).is_some() => PeriodKind::Daily,
        _ => PeriodKind::Unknown,
    }
}

/// Returns the 1-based month of the first full month name appearing as a
/// whole word in `text`, ignoring case.
pub fn find_month_name(text: &str) -> Option<u32> {
    text.split(|c: char| !c.is_alphanumeric())
        .find_map(month_index)
}

fn month_index(word: &str) -> Option<u32> {
    MONTH_NAMES
        .iter()
        .position(|m| m.eq_ignore_ascii_case(word))
        .map(|i| i as u32 + 1)
}

pub fn parse_calendar_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.date());
        }
    }

    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.date_naive())
}

/// Orders period labels newest first. Unknown periods are ordered as plain
/// text, ascending.
pub fn sort_periods(periods: &mut [String], kind: PeriodKind) {
    match kind {
        PeriodKind::MonthlyName => {
            periods.sort_by(|a, b| month_label_key(b).cmp(&month_label_key(a)));
        }
        PeriodKind::Numeric => {
            periods.sort_by(|a, b| {
                compare_with_missing_last(
                    a.trim().parse::<f64>().ok(),
                    b.trim().parse::<f64>().ok(),
                    |x, y| y.total_cmp(x),
                )
            });
        }
        PeriodKind::Daily => {
            periods.sort_by(|a, b| {
                compare_with_missing_last(parse_calendar_date(a), parse_calendar_date(b), |x, y| {
                    y.cmp(x)
                })
            });
        }
        PeriodKind::Unknown => periods.sort(),
    }
}

fn compare_with_missing_last<T>(
    a: Option<T>,
    b: Option<T>,
    cmp: impl Fn(&T, &T) -> Ordering,
) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(&x, &y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Sort key of a "Month YYYY" label: (year, month). Missing parts count as 0.
fn month_label_key(label: &str) -> (i32, u32) {
    let mut parts = label.split_whitespace();
    let month = parts.next().and_then(month_index).unwrap_or(0);
    let year = parts.next().and_then(|y| y.parse::<i32>().ok()).unwrap_or(0);
    (year, month)
}

/// With at least two periods (sorted newest first), the default comparison
/// is the second-newest against the newest.
pub fn default_period_pair(sorted_periods: &[String]) -> Option<(String, String)> {
    match sorted_periods {
        [newest, previous, ..] => Some((previous.clone(), newest.clone())),
        _ => None,
    }
}

/// Fixed-point rendering that never prints a negative zero.
pub fn format_fixed(value: f64, decimals: usize) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{:.*}", decimals, value)
}

/// Renders a change ratio as a percentage, e.g. `-0.15` as `-15.00%`.
pub fn format_percent(change_ratio: f64, decimals: usize) -> String {
    format!("{}%", format_fixed(change_ratio * 100.0, decimals))
}
