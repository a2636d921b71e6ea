use crate::aggregator::{EntityPeriods, PeriodAggregate, PeriodAggregator};
use crate::error::{MonitorError, Result};
use crate::normalizer::{Dataset, EntityMetadata, MetricSchema};
use crate::schema::{Flag, FlagThresholds, Granularity, GroupBy, MonitorConfig};
use log::{debug, info};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricComparison {
    pub metric: String,
    pub value1: f64,
    pub value2: f64,
    /// Relative change from period 1 to period 2 as a fraction.
    pub change_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub entity_key: String,
    pub meta: EntityMetadata,
    pub metrics: Vec<MetricComparison>,
    pub flag: Flag,
}

impl ComparisonResult {
    pub fn metric(&self, name: &str) -> Option<&MetricComparison> {
        self.metrics.iter().find(|m| m.metric == name)
    }

    pub fn manager(&self) -> Option<&str> {
        self.meta.manager.as_deref()
    }
}

/// `(v2 - v1) / v1`; with a zero baseline, 1 for any growth and 0 otherwise.
pub fn change_ratio(value1: f64, value2: f64) -> f64 {
    if value1 != 0.0 {
        (value2 - value1) / value1
    } else if value2 > 0.0 {
        1.0
    } else {
        0.0
    }
}

/// Drop rule on the primary metric, with thresholds fixed for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlagRule {
    pub amount_threshold: f64,
    pub percent_threshold: f64,
}

impl FlagRule {
    pub fn new(thresholds: &FlagThresholds, granularity: Option<Granularity>) -> Self {
        Self {
            amount_threshold: thresholds.amount_for(granularity),
            percent_threshold: thresholds.percent,
        }
    }

    /// `Yes` only when the value decreased, the absolute drop exceeds the
    /// amount threshold and the relative drop exceeds the percent threshold.
    pub fn evaluate(&self, value1: f64, value2: f64) -> Flag {
        let drop_amount = value1 - value2;
        let drop_percent = if value1 != 0.0 { drop_amount / value1 } else { 0.0 };

        if value2 < value1
            && drop_amount > self.amount_threshold
            && drop_percent > self.percent_threshold
        {
            Flag::Yes
        } else {
            Flag::Empty
        }
    }
}

pub struct ComparisonEngine<'a> {
    schema: &'a MetricSchema,
    rule: FlagRule,
}

impl<'a> ComparisonEngine<'a> {
    pub fn new(schema: &'a MetricSchema, rule: FlagRule) -> Self {
        Self { schema, rule }
    }

    pub fn rule(&self) -> FlagRule {
        self.rule
    }

    pub fn compare(&self, entities: &[EntityPeriods]) -> Vec<ComparisonResult> {
        entities.iter().filter_map(|e| self.compare_entity(e)).collect()
    }

    /// `None` only for an entity with neither period, which aggregation never
    /// produces.
    pub fn compare_entity(&self, entity: &EntityPeriods) -> Option<ComparisonResult> {
        let (meta, flag) = match (&entity.period1, &entity.period2) {
            (Some(first), Some(second)) => (first.meta.clone(), self.flag(first, second)),
            (Some(only), None) | (None, Some(only)) => (only.meta.clone(), Flag::Null),
            (None, None) => return None,
        };

        let metrics = self
            .schema
            .metrics()
            .iter()
            .map(|metric| {
                let value1 = side_value(entity.period1.as_ref(), metric);
                let value2 = side_value(entity.period2.as_ref(), metric);
                MetricComparison {
                    metric: metric.clone(),
                    value1,
                    value2,
                    change_pct: change_ratio(value1, value2),
                }
            })
            .collect();

        Some(ComparisonResult {
            entity_key: entity.entity_key.clone(),
            meta,
            metrics,
            flag,
        })
    }

    fn flag(&self, first: &PeriodAggregate, second: &PeriodAggregate) -> Flag {
        match self.schema.primary_metric() {
            Some(primary) => self.rule.evaluate(first.metric(primary), second.metric(primary)),
            None => Flag::Empty,
        }
    }
}

fn side_value(aggregate: Option<&PeriodAggregate>, metric: &str) -> f64 {
    aggregate.map(|a| a.metric(metric)).unwrap_or(0.0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRequest {
    /// Baseline ("older") period label.
    pub period1: String,
    /// Comparison ("newer") period label.
    pub period2: String,
    pub group_by: GroupBy,
    /// Overrides the granularity implied by the period column.
    pub granularity: Option<Granularity>,
}

impl ComparisonRequest {
    pub fn new(period1: impl Into<String>, period2: impl Into<String>, group_by: GroupBy) -> Self {
        Self {
            period1: period1.into(),
            period2: period2.into(),
            group_by,
            granularity: None,
        }
    }

    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = Some(granularity);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.period1.trim().is_empty() || self.period2.trim().is_empty() {
            return Err(MonitorError::InvalidPeriodSelection(
                "both periods must be selected".to_string(),
            ));
        }
        if self.period1 == self.period2 {
            return Err(MonitorError::InvalidPeriodSelection(format!(
                "please select two different periods to compare (both are '{}')",
                self.period1
            )));
        }
        Ok(())
    }
}

/// Everything produced by one comparison, before any filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRun {
    pub period1: String,
    pub period2: String,
    pub group_by: GroupBy,
    pub granularity: Option<Granularity>,
    pub primary_metric: Option<String>,
    pub aggregation: String,
    pub results: Vec<ComparisonResult>,
}

impl ComparisonRun {
    pub fn count_flag(&self, flag: Flag) -> usize {
        self.results.iter().filter(|r| r.flag == flag).count()
    }
}

pub fn run_comparison(
    dataset: &Dataset,
    config: &MonitorConfig,
    request: &ComparisonRequest,
) -> Result<ComparisonRun> {
    request.validate()?;

    let granularity = request.granularity.or_else(|| dataset.granularity());
    let rule = FlagRule::new(&config.thresholds, granularity);
    debug!(
        "Flag thresholds: drop > {} and > {:.2}% ({:?})",
        rule.amount_threshold,
        rule.percent_threshold * 100.0,
        granularity
    );

    let rows = dataset.normalize(request.group_by);
    let aggregator = PeriodAggregator::new(&config.aggregation, dataset.schema());
    let entities = aggregator.aggregate(&rows, &request.period1, &request.period2);

    let engine = ComparisonEngine::new(dataset.schema(), rule);
    let results = engine.compare(&entities);

    let run = ComparisonRun {
        period1: request.period1.clone(),
        period2: request.period2.clone(),
        group_by: request.group_by,
        granularity,
        primary_metric: dataset.schema().primary_metric().map(String::from),
        aggregation: aggregator.strategy_name().to_string(),
        results,
    };

    info!(
        "Compared '{}' with '{}': {} entities, {} flagged, {} missing a period",
        run.period1,
        run.period2,
        run.results.len(),
        run.count_flag(Flag::Yes),
        run.count_flag(Flag::Null)
    );

    Ok(run)
}
