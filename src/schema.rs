use crate::error::{MonitorError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Period columns recognised in a dataset, in priority order.
pub const PERIOD_COLUMNS: [&str; 3] = ["Date", "Week", "Month"];

pub const DEFAULT_TEST_RECORD_PATTERN: &str = r"^TDS\s+\d+$";

/// A single cell as produced by the CSV parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Empty,
}

impl Value {
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_finite())
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    /// Numeric reading used by aggregation: anything that is not a finite
    /// number counts as zero.
    pub fn metric_value(&self) -> f64 {
        self.as_number().unwrap_or(0.0)
    }

    /// True for empty cells and blank text.
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Text(s) => s.trim().is_empty(),
            Value::Number(n) => n.is_nan(),
        }
    }

    /// Canonical text form. Integral numbers render without a fractional part
    /// so that a `Week` of `202405` reads as "202405".
    pub fn label(&self) -> String {
        match self {
            Value::Number(n) => format_number_label(*n),
            Value::Text(s) => s.clone(),
            Value::Empty => String::new(),
        }
    }

    /// The label, or `None` for blank values.
    pub fn non_blank_label(&self) -> Option<String> {
        if self.is_blank() {
            None
        } else {
            Some(self.label())
        }
    }
}

fn format_number_label(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// One parsed input row. Column order is preserved because metric and
/// primary-metric detection follow the original column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    fields: Vec<(String, Value)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Sets a column, replacing any previous value under the same name.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains_column(&self, column: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == column)
    }

    /// Non-blank label of a column, if any.
    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column).and_then(Value::non_blank_label)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Value)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut row = RawRow::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

/// Which column identifies an entity for a comparison run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    #[schemars(description = "Group by the site/application column")]
    Site,
    #[schemars(description = "Group by the ad-system column")]
    AdSystem,
}

impl GroupBy {
    pub fn column<'a>(&self, columns: &'a ColumnNames) -> &'a str {
        match self {
            GroupBy::Site => &columns.site,
            GroupBy::AdSystem => &columns.ad_system,
        }
    }

    /// Manager and client metadata are only shown when grouping by site.
    pub fn shows_metadata(&self) -> bool {
        matches!(self, GroupBy::Site)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    pub fn from_period_column(column: &str) -> Option<Self> {
        match column {
            "Date" => Some(Granularity::Daily),
            "Week" => Some(Granularity::Weekly),
            "Month" => Some(Granularity::Monthly),
            _ => None,
        }
    }
}

/// Outcome of comparing one entity across the two periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Flag {
    /// Significant drop of the primary metric.
    #[serde(rename = "YES")]
    Yes,
    /// Present in both periods, no significant drop.
    #[serde(rename = "")]
    Empty,
    /// Present in exactly one of the two periods.
    #[serde(rename = "NULL")]
    Null,
}

impl Flag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Flag::Yes => "YES",
            Flag::Empty => "",
            Flag::Null => "NULL",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ColumnNames {
    #[schemars(description = "Column holding the site/application identifier")]
    pub site: String,
    #[schemars(description = "Column holding the ad-system identifier")]
    pub ad_system: String,
    #[schemars(description = "Column holding the customer success manager name")]
    pub manager: String,
    #[schemars(description = "Column holding the client name")]
    pub client: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            site: "Site/Application".to_string(),
            ad_system: "Ad system".to_string(),
            manager: "Customer Success Manager".to_string(),
            client: "Client".to_string(),
        }
    }
}

impl ColumnNames {
    /// Columns that never count as metrics, whatever their type.
    pub fn non_metric_columns(&self) -> Vec<&str> {
        let mut cols: Vec<&str> = PERIOD_COLUMNS.to_vec();
        cols.extend([
            self.site.as_str(),
            self.ad_system.as_str(),
            self.manager.as_str(),
            self.client.as_str(),
        ]);
        cols
    }
}

/// Thresholds of the drop flag. Some reports use a percent threshold of 0.1
/// instead of 0.05.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FlagThresholds {
    #[schemars(description = "Minimum absolute drop for daily periods")]
    pub daily_amount: f64,
    #[schemars(description = "Minimum absolute drop for weekly periods")]
    pub weekly_amount: f64,
    #[schemars(description = "Minimum absolute drop for monthly periods")]
    pub monthly_amount: f64,
    #[schemars(description = "Minimum absolute drop when the granularity is not recognised")]
    pub default_amount: f64,
    #[schemars(description = "Minimum relative drop as a fraction (0.05 = 5%)")]
    pub percent: f64,
}

impl Default for FlagThresholds {
    fn default() -> Self {
        Self {
            daily_amount: 15.0,
            weekly_amount: 50.0,
            monthly_amount: 100.0,
            default_amount: 100.0,
            percent: 0.05,
        }
    }
}

impl FlagThresholds {
    pub fn amount_for(&self, granularity: Option<Granularity>) -> f64 {
        match granularity {
            Some(Granularity::Daily) => self.daily_amount,
            Some(Granularity::Weekly) => self.weekly_amount,
            Some(Granularity::Monthly) => self.monthly_amount,
            None => self.default_amount,
        }
    }

    pub fn with_percent(mut self, percent: f64) -> Self {
        self.percent = percent;
        self
    }
}

/// A metric recomputed from summed components, e.g. a per-mille CPM:
/// `numerator / denominator * scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DerivedMetric {
    pub name: String,
    pub numerator: String,
    pub denominator: String,
    #[serde(default = "default_per_mille")]
    pub scale: f64,
}

fn default_per_mille() -> f64 {
    1000.0
}

impl DerivedMetric {
    pub fn per_mille(
        name: impl Into<String>,
        numerator: impl Into<String>,
        denominator: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            numerator: numerator.into(),
            denominator: denominator.into(),
            scale: default_per_mille(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum AggregationPolicy {
    #[default]
    #[schemars(
        description = "Keep only the row with the greatest primary metric per entity and period; ties keep the first row"
    )]
    SelectBest,

    #[schemars(
        description = "Sum every metric across rows of the same entity and period, then recompute derived metrics from the sums"
    )]
    SumAndRecompute {
        #[serde(default)]
        derived_metrics: Vec<DerivedMetric>,
    },

    #[schemars(
        description = "Use SumAndRecompute when the dataset carries a CPM-like column next to revenue and impressions, SelectBest otherwise"
    )]
    DetectFromSchema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SymbolPosition {
    Prefix,
    Suffix,
}

/// Currency rendering for the narrative report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CurrencyFormat {
    pub symbol: String,
    pub position: SymbolPosition,
    #[schemars(description = "Text between the amount and the symbol")]
    pub symbol_spacing: String,
    pub decimal_separator: String,
    pub grouping_separator: String,
    pub decimals: usize,
}

impl Default for CurrencyFormat {
    fn default() -> Self {
        Self::ru_usd()
    }
}

impl CurrencyFormat {
    /// US dollars in Russian notation: `-1 234,56 $`.
    pub fn ru_usd() -> Self {
        Self {
            symbol: "$".to_string(),
            position: SymbolPosition::Suffix,
            symbol_spacing: "\u{a0}".to_string(),
            decimal_separator: ",".to_string(),
            grouping_separator: "\u{a0}".to_string(),
            decimals: 2,
        }
    }

    /// US dollars in US notation: `-$1,234.56`.
    pub fn en_us() -> Self {
        Self {
            symbol: "$".to_string(),
            position: SymbolPosition::Prefix,
            symbol_spacing: String::new(),
            decimal_separator: ".".to_string(),
            grouping_separator: ",".to_string(),
            decimals: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct MonitorConfig {
    #[schemars(description = "Names of the identifier and metadata columns")]
    pub columns: ColumnNames,

    #[schemars(description = "Thresholds of the drop flag")]
    pub thresholds: FlagThresholds,

    #[schemars(description = "How duplicate rows of one entity and period are combined")]
    pub aggregation: AggregationPolicy,

    #[schemars(
        description = "Regular expression matching test records in the site/application column; matching rows are dropped"
    )]
    pub test_record_pattern: String,

    #[schemars(description = "Currency notation used by the narrative report")]
    pub currency: CurrencyFormat,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            columns: ColumnNames::default(),
            thresholds: FlagThresholds::default(),
            aggregation: AggregationPolicy::default(),
            test_record_pattern: DEFAULT_TEST_RECORD_PATTERN.to_string(),
            currency: CurrencyFormat::default(),
        }
    }
}

impl MonitorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: MonitorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(MonitorConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }

    pub fn validate(&self) -> Result<()> {
        regex::Regex::new(&self.test_record_pattern).map_err(|e| {
            MonitorError::InvalidConfig(format!(
                "test_record_pattern '{}' is not a valid regular expression: {}",
                self.test_record_pattern, e
            ))
        })?;

        let t = &self.thresholds;
        for (name, amount) in [
            ("daily_amount", t.daily_amount),
            ("weekly_amount", t.weekly_amount),
            ("monthly_amount", t.monthly_amount),
            ("default_amount", t.default_amount),
        ] {
            if !amount.is_finite() || amount < 0.0 {
                return Err(MonitorError::InvalidConfig(format!(
                    "{} must be a non-negative number, got {}",
                    name, amount
                )));
            }
        }

        if !(0.0..=1.0).contains(&t.percent) {
            return Err(MonitorError::InvalidConfig(format!(
                "percent threshold must be between 0.0 and 1.0, got {}",
                t.percent
            )));
        }

        if let AggregationPolicy::SumAndRecompute { derived_metrics } = &self.aggregation {
            for metric in derived_metrics {
                if metric.name.is_empty()
                    || metric.numerator.is_empty()
                    || metric.denominator.is_empty()
                {
                    return Err(MonitorError::InvalidConfig(format!(
                        "derived metric {:?} needs a name, numerator and denominator",
                        metric
                    )));
                }
            }
        }

        Ok(())
    }
}
