use crate::error::{MonitorError, Result};
use crate::schema::{ColumnNames, Granularity, GroupBy, MonitorConfig, RawRow, PERIOD_COLUMNS};
use crate::utils::{default_period_pair, detect_period_kind, sort_periods, PeriodKind};
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

pub type MetricValues = BTreeMap<String, f64>;

/// Non-fatal findings reported while loading a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum LoadWarning {
    /// No metric name contains "revenue"; flags are computed on the fallback
    /// metric, or never raised when there is no numeric column at all.
    MissingPrimaryMetric { fallback: Option<String> },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadWarning::MissingPrimaryMetric { fallback: Some(metric) } => write!(
                f,
                "'Revenue' column not found. The flag will be based on the first metric: '{}'",
                metric
            ),
            LoadWarning::MissingPrimaryMetric { fallback: None } => {
                f.write_str("No numeric columns found. No entity will be flagged")
            }
        }
    }
}

/// The numeric columns of a dataset and the one that drives flagging.
/// Established once per load and never extended afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSchema {
    metrics: Vec<String>,
    primary_metric: Option<String>,
}

impl MetricSchema {
    pub fn new(metrics: Vec<String>, primary_metric: Option<String>) -> Self {
        Self {
            metrics,
            primary_metric,
        }
    }

    /// Classifies the columns of `first_row`: a column is a metric when it is
    /// not a known identifier/period/metadata column and its value is numeric.
    pub fn detect(first_row: &RawRow, columns: &ColumnNames) -> (Self, Option<LoadWarning>) {
        let excluded = columns.non_metric_columns();
        let metrics: Vec<String> = first_row
            .iter()
            .filter(|(name, value)| !excluded.contains(name) && value.is_number())
            .map(|(name, _)| name.to_string())
            .collect();

        let revenue = metrics
            .iter()
            .find(|m| m.to_lowercase().contains("revenue"))
            .cloned();

        match revenue {
            Some(primary) => (Self::new(metrics, Some(primary)), None),
            None => {
                let fallback = metrics.first().cloned();
                let warning = LoadWarning::MissingPrimaryMetric {
                    fallback: fallback.clone(),
                };
                (Self::new(metrics, fallback), Some(warning))
            }
        }
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn primary_metric(&self) -> Option<&str> {
        self.primary_metric.as_deref()
    }

    pub fn contains(&self, metric: &str) -> bool {
        self.metrics.iter().any(|m| m == metric)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub manager: Option<String>,
    pub client: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    pub period: String,
    pub entity_key: String,
    pub metrics: MetricValues,
    pub meta: EntityMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub input_rows: usize,
    pub kept_rows: usize,
    pub period_column: String,
    pub period_kind: PeriodKind,
    pub metrics: Vec<String>,
    pub primary_metric: Option<String>,
    pub warnings: Vec<LoadWarning>,
}

/// Picks the period column from the columns of the first row.
pub fn detect_period_column(first_row: &RawRow) -> Result<String> {
    PERIOD_COLUMNS
        .iter()
        .find(|c| first_row.contains_column(c))
        .map(|c| c.to_string())
        .ok_or_else(|| MonitorError::NoPeriodColumn {
            available: first_row.columns().map(String::from).collect(),
        })
}

/// A validated dataset: rows that carry a period and at least one entity
/// identifier, with test records removed.
#[derive(Debug, Clone)]
pub struct Dataset {
    columns: ColumnNames,
    period_column: String,
    period_kind: PeriodKind,
    schema: MetricSchema,
    rows: Vec<RawRow>,
    input_rows: usize,
    warnings: Vec<LoadWarning>,
}

impl Dataset {
    pub fn load(rows: Vec<RawRow>, config: &MonitorConfig) -> Result<Self> {
        let columns = config.columns.clone();
        let input_rows = rows.len();

        let first_row = rows.first().ok_or_else(|| MonitorError::EmptyDataset {
            period_column: String::new(),
        })?;
        let period_column = detect_period_column(first_row)?;
        let (schema, warning) = MetricSchema::detect(first_row, &columns);

        let test_record = Regex::new(&config.test_record_pattern).map_err(|e| {
            MonitorError::InvalidConfig(format!(
                "test_record_pattern '{}' is not a valid regular expression: {}",
                config.test_record_pattern, e
            ))
        })?;

        let kept: Vec<RawRow> = rows
            .into_iter()
            .filter(|row| is_usable_row(row, &period_column, &columns, &test_record))
            .collect();

        if kept.is_empty() {
            return Err(MonitorError::EmptyDataset { period_column });
        }

        let period_kind = kept
            .first()
            .and_then(|row| row.get(&period_column))
            .map(detect_period_kind)
            .unwrap_or(PeriodKind::Unknown);

        let mut warnings = Vec::new();
        if let Some(warning) = warning {
            warn!("{}", warning);
            warnings.push(warning);
        }

        info!(
            "Loaded {} of {} rows (period column '{}', primary metric {:?})",
            kept.len(),
            input_rows,
            period_column,
            schema.primary_metric()
        );
        debug!("Detected {} metric columns: {:?}", schema.len(), schema.metrics());

        Ok(Self {
            columns,
            period_column,
            period_kind,
            schema,
            rows: kept,
            input_rows,
            warnings,
        })
    }

    /// Projects the dataset onto the grouping column. Rows whose grouping
    /// column is blank are skipped.
    pub fn normalize(&self, group_by: GroupBy) -> Vec<NormalizedRow> {
        let group_column = group_by.column(&self.columns);
        let mut skipped = 0usize;

        let normalized: Vec<NormalizedRow> = self
            .rows
            .iter()
            .filter_map(|row| {
                let period = row.text(&self.period_column)?;
                let Some(entity_key) = row.text(group_column) else {
                    skipped += 1;
                    return None;
                };

                let metrics = self
                    .schema
                    .metrics()
                    .iter()
                    .map(|m| (m.clone(), row.get(m).map(|v| v.metric_value()).unwrap_or(0.0)))
                    .collect();

                Some(NormalizedRow {
                    period,
                    entity_key,
                    metrics,
                    meta: EntityMetadata {
                        manager: row.text(&self.columns.manager),
                        client: row.text(&self.columns.client),
                    },
                })
            })
            .collect();

        if skipped > 0 {
            debug!(
                "Skipped {} rows without a value in '{}'",
                skipped, group_column
            );
        }

        normalized
    }

    /// Distinct period labels, newest first.
    pub fn periods(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut periods: Vec<String> = self
            .rows
            .iter()
            .filter_map(|row| row.text(&self.period_column))
            .filter(|p| seen.insert(p.clone()))
            .collect();
        sort_periods(&mut periods, self.period_kind);
        periods
    }

    pub fn default_period_pair(&self) -> Option<(String, String)> {
        default_period_pair(&self.periods())
    }

    /// Distinct non-empty manager names, sorted.
    pub fn managers(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.text(&self.columns.manager))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn summary(&self) -> LoadSummary {
        LoadSummary {
            input_rows: self.input_rows,
            kept_rows: self.rows.len(),
            period_column: self.period_column.clone(),
            period_kind: self.period_kind,
            metrics: self.schema.metrics().to_vec(),
            primary_metric: self.schema.primary_metric().map(String::from),
            warnings: self.warnings.clone(),
        }
    }

    pub fn granularity(&self) -> Option<Granularity> {
        Granularity::from_period_column(&self.period_column)
    }

    pub fn period_column(&self) -> &str {
        &self.period_column
    }

    pub fn period_kind(&self) -> PeriodKind {
        self.period_kind
    }

    pub fn schema(&self) -> &MetricSchema {
        &self.schema
    }

    pub fn columns(&self) -> &ColumnNames {
        &self.columns
    }

    pub fn rows(&self) -> &[RawRow] {
        &self.rows
    }

    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn is_usable_row(
    row: &RawRow,
    period_column: &str,
    columns: &ColumnNames,
    test_record: &Regex,
) -> bool {
    if row.text(period_column).is_none() {
        return false;
    }

    let site = row.text(&columns.site);
    if site.is_none() && row.text(&columns.ad_system).is_none() {
        return false;
    }

    !site.is_some_and(|s| test_record.is_match(&s))
}
