use crate::engine::ComparisonResult;
use crate::error::MonitorError;
use crate::schema::Flag;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagFilter {
    #[default]
    All,
    Yes,
    Null,
    YesOrNull,
}

impl FlagFilter {
    pub fn accepts(&self, flag: Flag) -> bool {
        match self {
            FlagFilter::All => true,
            FlagFilter::Yes => flag == Flag::Yes,
            FlagFilter::Null => flag == Flag::Null,
            FlagFilter::YesOrNull => matches!(flag, Flag::Yes | Flag::Null),
        }
    }
}

impl FromStr for FlagFilter {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(FlagFilter::All),
            "yes" => Ok(FlagFilter::Yes),
            "null" => Ok(FlagFilter::Null),
            "yes_null" | "yes_or_null" => Ok(FlagFilter::YesOrNull),
            other => Err(MonitorError::InvalidConfig(format!(
                "unknown flag filter '{}' (expected all, yes, null or yes_or_null)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerFilter {
    #[default]
    All,
    /// Exact, case-sensitive manager name.
    Named(String),
}

impl ManagerFilter {
    pub fn named(manager: impl Into<String>) -> Self {
        ManagerFilter::Named(manager.into())
    }

    pub fn accepts(&self, manager: Option<&str>) -> bool {
        match self {
            ManagerFilter::All => true,
            ManagerFilter::Named(name) => manager == Some(name.as_str()),
        }
    }
}

/// Selection applied to the canonical results; never modifies them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResultFilter {
    pub flag: FlagFilter,
    pub manager: ManagerFilter,
}

impl ResultFilter {
    pub fn new(flag: FlagFilter, manager: ManagerFilter) -> Self {
        Self { flag, manager }
    }

    pub fn matches(&self, result: &ComparisonResult) -> bool {
        self.flag.accepts(result.flag) && self.manager.accepts(result.manager())
    }

    /// Matching results in their original order.
    pub fn apply(&self, results: &[ComparisonResult]) -> Vec<ComparisonResult> {
        results.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}
