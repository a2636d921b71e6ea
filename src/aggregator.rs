use crate::normalizer::{EntityMetadata, MetricSchema, MetricValues, NormalizedRow};
use crate::schema::{AggregationPolicy, DerivedMetric};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Combined values of one entity in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodAggregate {
    pub metrics: MetricValues,
    pub meta: EntityMetadata,
    /// Number of input rows that mapped onto this entity and period.
    pub source_rows: usize,
}

impl PeriodAggregate {
    fn from_row(row: &NormalizedRow) -> Self {
        Self {
            metrics: row.metrics.clone(),
            meta: row.meta.clone(),
            source_rows: 1,
        }
    }

    pub fn metric(&self, name: &str) -> f64 {
        self.metrics.get(name).copied().unwrap_or(0.0)
    }
}

/// Both selected periods of one entity; at least one side is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPeriods {
    pub entity_key: String,
    pub period1: Option<PeriodAggregate>,
    pub period2: Option<PeriodAggregate>,
}

/// How a further row for an already seen (entity, period) is folded in.
pub trait AggregationStrategy {
    fn absorb(&self, aggregate: &mut PeriodAggregate, row: &NormalizedRow);

    /// Called once per aggregate after every row has been absorbed.
    fn finish(&self, _aggregate: &mut PeriodAggregate) {}

    fn name(&self) -> &'static str;
}

/// Keeps the row with the strictly greatest primary metric. Superseded or
/// reprocessed rows in a feed are never allowed to override a valid one.
pub struct SelectBest {
    primary_metric: Option<String>,
}

impl SelectBest {
    pub fn new(primary_metric: Option<String>) -> Self {
        Self { primary_metric }
    }

    fn primary(&self, metrics: &MetricValues) -> f64 {
        self.primary_metric
            .as_ref()
            .and_then(|m| metrics.get(m))
            .copied()
            .unwrap_or(0.0)
    }
}

impl AggregationStrategy for SelectBest {
    fn absorb(&self, aggregate: &mut PeriodAggregate, row: &NormalizedRow) {
        aggregate.source_rows += 1;
        if self.primary(&row.metrics) > self.primary(&aggregate.metrics) {
            aggregate.metrics = row.metrics.clone();
            aggregate.meta = row.meta.clone();
        }
    }

    fn name(&self) -> &'static str {
        "select_best"
    }
}

/// Rows are partial contributions: every metric is summed and ratio metrics
/// are recomputed from the summed components.
pub struct SumAndRecompute {
    derived_metrics: Vec<DerivedMetric>,
}

impl SumAndRecompute {
    pub fn new(derived_metrics: Vec<DerivedMetric>) -> Self {
        Self { derived_metrics }
    }
}

impl AggregationStrategy for SumAndRecompute {
    fn absorb(&self, aggregate: &mut PeriodAggregate, row: &NormalizedRow) {
        aggregate.source_rows += 1;
        for (metric, value) in &row.metrics {
            *aggregate.metrics.entry(metric.clone()).or_insert(0.0) += value;
        }
        if aggregate.meta.manager.is_none() {
            aggregate.meta.manager = row.meta.manager.clone();
        }
        if aggregate.meta.client.is_none() {
            aggregate.meta.client = row.meta.client.clone();
        }
    }

    fn finish(&self, aggregate: &mut PeriodAggregate) {
        for derived in &self.derived_metrics {
            let numerator = aggregate.metric(&derived.numerator);
            let denominator = aggregate.metric(&derived.denominator);
            let value = if denominator != 0.0 {
                numerator / denominator * derived.scale
            } else {
                0.0
            };
            aggregate.metrics.insert(derived.name.clone(), value);
        }
    }

    fn name(&self) -> &'static str {
        "sum_and_recompute"
    }
}

/// Turns `DetectFromSchema` into a concrete policy. A dataset qualifies for
/// summing when it has a CPM-like column alongside the primary metric and an
/// impressions column.
pub fn resolve_policy(policy: &AggregationPolicy, schema: &MetricSchema) -> AggregationPolicy {
    match policy {
        AggregationPolicy::DetectFromSchema => match detect_per_mille_metric(schema) {
            Some(derived) => {
                info!(
                    "Detected derived metric '{}' = {} / {} * {}; summing duplicate rows",
                    derived.name, derived.numerator, derived.denominator, derived.scale
                );
                AggregationPolicy::SumAndRecompute {
                    derived_metrics: vec![derived],
                }
            }
            None => AggregationPolicy::SelectBest,
        },
        other => other.clone(),
    }
}

fn detect_per_mille_metric(schema: &MetricSchema) -> Option<DerivedMetric> {
    let primary = schema.primary_metric()?;
    let cpm = schema
        .metrics()
        .iter()
        .find(|m| m.to_lowercase().contains("cpm") && m.as_str() != primary)?;
    let impressions = schema
        .metrics()
        .iter()
        .find(|m| m.to_lowercase().contains("impression") && *m != cpm)?;
    Some(DerivedMetric::per_mille(cpm.clone(), primary, impressions.clone()))
}

pub struct PeriodAggregator {
    strategy: Box<dyn AggregationStrategy>,
}

impl PeriodAggregator {
    pub fn new(policy: &AggregationPolicy, schema: &MetricSchema) -> Self {
        let strategy: Box<dyn AggregationStrategy> = match resolve_policy(policy, schema) {
            AggregationPolicy::SumAndRecompute { derived_metrics } => {
                Box::new(SumAndRecompute::new(known_derived_metrics(derived_metrics, schema)))
            }
            _ => Box::new(SelectBest::new(schema.primary_metric().map(String::from))),
        };
        Self { strategy }
    }

    pub fn with_strategy(strategy: Box<dyn AggregationStrategy>) -> Self {
        Self { strategy }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Builds one aggregate per (entity, period) for the two selected periods.
    /// Entities come out in first-seen order; rows of other periods are ignored.
    pub fn aggregate(
        &self,
        rows: &[NormalizedRow],
        period1: &str,
        period2: &str,
    ) -> Vec<EntityPeriods> {
        let mut entities: Vec<EntityPeriods> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for row in rows {
            let is_first = row.period == period1;
            if !is_first && row.period != period2 {
                continue;
            }

            let slot_idx = *index.entry(row.entity_key.clone()).or_insert_with(|| {
                entities.push(EntityPeriods {
                    entity_key: row.entity_key.clone(),
                    period1: None,
                    period2: None,
                });
                entities.len() - 1
            });

            let entity = &mut entities[slot_idx];
            let slot = if is_first {
                &mut entity.period1
            } else {
                &mut entity.period2
            };

            match slot {
                Some(existing) => self.strategy.absorb(existing, row),
                None => *slot = Some(PeriodAggregate::from_row(row)),
            }
        }

        for entity in &mut entities {
            for aggregate in [&mut entity.period1, &mut entity.period2].into_iter().flatten() {
                self.strategy.finish(aggregate);
            }
        }

        debug!(
            "Aggregated {} entities for periods '{}' and '{}' using {}",
            entities.len(),
            period1,
            period2,
            self.strategy.name()
        );

        entities
    }
}

/// The metric set is frozen at load time, so a derived metric may only
/// overwrite columns the dataset already has.
fn known_derived_metrics(derived: Vec<DerivedMetric>, schema: &MetricSchema) -> Vec<DerivedMetric> {
    derived
        .into_iter()
        .filter(|d| {
            let known = schema.contains(&d.name)
                && schema.contains(&d.numerator)
                && schema.contains(&d.denominator);
            if !known {
                warn!(
                    "Ignoring derived metric '{}': '{}', '{}' or '{}' is not a metric column",
                    d.name, d.name, d.numerator, d.denominator
                );
            }
            known
        })
        .collect()
}
