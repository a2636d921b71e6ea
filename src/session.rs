use crate::engine::{run_comparison, ComparisonRequest, ComparisonResult, ComparisonRun};
use crate::error::{MonitorError, Result};
use crate::export::{export_csv, export_csv_to_path, ExportLayout};
use crate::filter::{FlagFilter, ManagerFilter, ResultFilter};
use crate::ingestion::{parse_rows, read_rows_from_path};
use crate::normalizer::{Dataset, LoadSummary};
use crate::report::generate_report;
use crate::schema::{GroupBy, MonitorConfig, RawRow};
use log::{debug, info};
use std::path::Path;

/// Owns everything one user works with: the loaded dataset, the canonical
/// results of the last comparison, the active filter and the filtered view.
///
/// Failed loads and comparisons leave the previous state untouched.
#[derive(Debug, Clone)]
pub struct AnalysisSession {
    config: MonitorConfig,
    dataset: Option<Dataset>,
    canonical: Option<ComparisonRun>,
    filter: ResultFilter,
    displayed: Vec<ComparisonResult>,
}

impl AnalysisSession {
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            dataset: None,
            canonical: None,
            filter: ResultFilter::default(),
            displayed: Vec::new(),
        })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Replaces the dataset. Results of earlier comparisons are dropped since
    /// they describe the previous data.
    pub fn load_rows(&mut self, rows: Vec<RawRow>) -> Result<LoadSummary> {
        let dataset = Dataset::load(rows, &self.config)?;
        let summary = dataset.summary();

        self.dataset = Some(dataset);
        self.canonical = None;
        self.filter = ResultFilter::default();
        self.displayed.clear();

        Ok(summary)
    }

    pub fn load_csv(&mut self, text: &str) -> Result<LoadSummary> {
        let rows = parse_rows(text)?;
        self.load_rows(rows)
    }

    pub fn load_csv_path(&mut self, path: impl AsRef<Path>) -> Result<LoadSummary> {
        let rows = read_rows_from_path(path)?;
        self.load_rows(rows)
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    fn require_dataset(&self) -> Result<&Dataset> {
        self.dataset.as_ref().ok_or(MonitorError::NoDatasetLoaded)
    }

    /// Selectable periods, newest first.
    pub fn periods(&self) -> Result<Vec<String>> {
        Ok(self.require_dataset()?.periods())
    }

    pub fn managers(&self) -> Result<Vec<String>> {
        Ok(self.require_dataset()?.managers())
    }

    /// The second-newest period against the newest, when there are two.
    pub fn default_request(&self, group_by: GroupBy) -> Option<ComparisonRequest> {
        let (period1, period2) = self.dataset.as_ref()?.default_period_pair()?;
        Some(ComparisonRequest::new(period1, period2, group_by))
    }

    /// Runs a comparison, caches it as the canonical result set and resets
    /// the filters.
    pub fn compare(&mut self, request: &ComparisonRequest) -> Result<&ComparisonRun> {
        let dataset = self.require_dataset()?;
        let run = run_comparison(dataset, &self.config, request)?;

        self.filter = ResultFilter::default();
        self.displayed = run.results.clone();
        Ok(self.canonical.insert(run))
    }

    pub fn canonical(&self) -> Option<&ComparisonRun> {
        self.canonical.as_ref()
    }

    pub fn filter(&self) -> &ResultFilter {
        &self.filter
    }

    /// Recomputes the displayed subset from the canonical results.
    pub fn set_filter(&mut self, filter: ResultFilter) -> &[ComparisonResult] {
        self.displayed = match &self.canonical {
            Some(run) => filter.apply(&run.results),
            None => Vec::new(),
        };
        debug!(
            "Filter {:?} / {:?} keeps {} results",
            filter.flag,
            filter.manager,
            self.displayed.len()
        );
        self.filter = filter;
        &self.displayed
    }

    pub fn set_flag_filter(&mut self, flag: FlagFilter) -> &[ComparisonResult] {
        let manager = self.filter.manager.clone();
        self.set_filter(ResultFilter::new(flag, manager))
    }

    pub fn set_manager_filter(&mut self, manager: ManagerFilter) -> &[ComparisonResult] {
        let flag = self.filter.flag;
        self.set_filter(ResultFilter::new(flag, manager))
    }

    pub fn displayed(&self) -> &[ComparisonResult] {
        &self.displayed
    }

    fn export_layout(&self) -> Result<ExportLayout> {
        let run = self.canonical.as_ref().ok_or_else(|| MonitorError::EmptyResult {
            operation: "export".to_string(),
        })?;
        Ok(ExportLayout::for_run(run, &self.config.columns))
    }

    pub fn export_csv(&self) -> Result<String> {
        let layout = self.export_layout()?;
        export_csv(&self.displayed, &layout)
    }

    pub fn export_csv_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let layout = self.export_layout()?;
        export_csv_to_path(&self.displayed, &layout, path.as_ref())?;
        info!("Exported {} entities to {}", self.displayed.len(), path.as_ref().display());
        Ok(())
    }

    pub fn report(&self) -> Result<String> {
        let primary = self.canonical.as_ref().and_then(|run| run.primary_metric.as_deref());
        generate_report(&self.displayed, primary, &self.config.currency)
    }
}
