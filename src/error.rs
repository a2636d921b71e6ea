use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Could not find a period column (must be named Date, Week or Month). Available columns: {available:?}")]
    NoPeriodColumn { available: Vec<String> },

    #[error("Found 0 usable rows. Check that the column '{period_column}' is filled and that not every row was filtered out")]
    EmptyDataset { period_column: String },

    #[error("Invalid period selection: {0}")]
    InvalidPeriodSelection(String),

    #[error("No data available for {operation}")]
    EmptyResult { operation: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No dataset has been loaded into the session")]
    NoDatasetLoaded,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;
