//! # Revenue Drop Monitor
//!
//! A library for comparing two reporting periods of advertising-performance
//! data (revenue, impressions and other metrics per site or ad system) and
//! flagging the entities whose revenue dropped significantly.
//!
//! ## Core Concepts
//!
//! - **Dataset**: parsed rows keyed by a period column (`Date`, `Week` or `Month`)
//!   and an entity column (site/application or ad system)
//! - **Metric Schema**: numeric columns detected from the first row, with a
//!   primary metric (the first one containing "revenue") that drives flagging
//! - **Aggregation**: duplicate rows of one entity and period are either
//!   deduplicated (highest primary metric wins) or summed with ratio metrics
//!   recomputed
//! - **Flag**: `YES` for a significant drop, empty for no significant change,
//!   `NULL` when the entity is missing from one of the periods
//!
//! ## Example
//!
//! ```rust,ignore
//! use revenue_drop_monitor::*;
//!
//! let mut session = AnalysisSession::new(MonitorConfig::default())?;
//! session.load_csv_path("monthly.csv")?;
//!
//! let request = session.default_request(GroupBy::Site).unwrap();
//! let run = session.compare(&request)?;
//! println!("{} entities flagged", run.count_flag(Flag::Yes));
//!
//! session.set_flag_filter(FlagFilter::YesOrNull);
//! let csv = session.export_csv()?;
//! let report = session.report()?;
//! ```

pub mod aggregator;
pub mod engine;
pub mod error;
pub mod export;
pub mod filter;
pub mod ingestion;
pub mod normalizer;
pub mod report;
pub mod schema;
pub mod session;
pub mod utils;

pub use aggregator::{
    resolve_policy, AggregationStrategy, EntityPeriods, PeriodAggregate, PeriodAggregator,
    SelectBest, SumAndRecompute,
};
pub use engine::{
    change_ratio, run_comparison, ComparisonEngine, ComparisonRequest, ComparisonResult,
    ComparisonRun, FlagRule, MetricComparison,
};
pub use error::{MonitorError, Result};
pub use export::{export_csv, export_csv_to_path, ExportLayout, UTF8_BOM};
pub use filter::{FlagFilter, ManagerFilter, ResultFilter};
pub use ingestion::{parse_rows, read_rows, read_rows_from_path, CellTyper};
pub use normalizer::{
    detect_period_column, Dataset, EntityMetadata, LoadSummary, LoadWarning, MetricSchema,
    MetricValues, NormalizedRow,
};
pub use report::{format_currency, generate_report};
pub use schema::*;
pub use session::AnalysisSession;
pub use utils::*;

use log::info;

/// One-shot pipeline: parse CSV text, load it and compare the two periods
/// of `request`.
pub fn analyze_csv(
    text: &str,
    config: &MonitorConfig,
    request: &ComparisonRequest,
) -> Result<ComparisonRun> {
    config.validate()?;
    let rows = parse_rows(text)?;
    let dataset = Dataset::load(rows, config)?;

    info!(
        "Analyzing {} rows grouped by {:?}",
        dataset.len(),
        request.group_by
    );

    run_comparison(&dataset, config, request)
}
