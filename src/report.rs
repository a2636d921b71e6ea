use crate::engine::ComparisonResult;
use crate::error::{MonitorError, Result};
use crate::schema::{CurrencyFormat, SymbolPosition};
use crate::utils::format_percent;
use log::debug;

pub const ENTRY_DELIMITER: &str = "------------------------------------";

const NOT_SPECIFIED: &str = "Not specified";

/// Formats a signed amount, e.g. `-1 234,56 $` with the default notation.
pub fn format_currency(amount: f64, format: &CurrencyFormat) -> String {
    let fixed = format!("{:.*}", format.decimals, amount.abs());
    let negative = amount < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');

    let (integer, fraction) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut number = group_digits(integer, &format.grouping_separator);
    if let Some(fraction) = fraction {
        number.push_str(&format.decimal_separator);
        number.push_str(fraction);
    }

    let sign = if negative { "-" } else { "" };
    match format.position {
        SymbolPosition::Prefix => format!(
            "{}{}{}{}",
            sign, format.symbol, format.symbol_spacing, number
        ),
        SymbolPosition::Suffix => format!(
            "{}{}{}{}",
            sign, number, format.symbol_spacing, format.symbol
        ),
    }
}

fn group_digits(digits: &str, separator: &str) -> String {
    let len = digits.len();
    let mut grouped = String::with_capacity(len + len / 3 * separator.len());
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            grouped.push_str(separator);
        }
        grouped.push(c);
    }
    grouped
}

/// Builds the plain-text manager report: one block per entity that has the
/// primary metric, each closed by a line of dashes.
pub fn generate_report(
    results: &[ComparisonResult],
    primary_metric: Option<&str>,
    currency: &CurrencyFormat,
) -> Result<String> {
    if results.is_empty() {
        return Err(MonitorError::EmptyResult {
            operation: "report".to_string(),
        });
    }

    let mut report = String::new();
    let mut entries = 0usize;

    for result in results {
        let Some(revenue) = primary_metric.and_then(|m| result.metric(m)) else {
            continue;
        };

        let dollar_change = revenue.value2 - revenue.value1;
        report.push_str(&format!(
            "{}\nCS Manager - {}\nClient - {}\n% Change - {}\n$ Change - {}\n{}\n",
            result.entity_key,
            result.meta.manager.as_deref().unwrap_or(NOT_SPECIFIED),
            result.meta.client.as_deref().unwrap_or(NOT_SPECIFIED),
            format_percent(revenue.change_pct, 2),
            format_currency(dollar_change, currency),
            ENTRY_DELIMITER
        ));
        entries += 1;
    }

    if entries == 0 {
        return Err(MonitorError::EmptyResult {
            operation: "report (no entity carries the primary metric)".to_string(),
        });
    }

    debug!("Generated report with {} entries", entries);
    Ok(report.trim().to_string())
}
