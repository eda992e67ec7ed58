//! Error types for the forecast_demand crate

use thiserror::Error;

/// Custom error types for the forecast_demand crate
#[derive(Debug, Error)]
pub enum ForecastError {
    /// Malformed input records or a violated request constraint
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error related to data processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Error related to forecasting operations
    #[error("Forecasting error: {0}")]
    ForecastingError(String),

    /// Requested horizon needs more history than the store has
    #[error("Horizon of {requested} days not supported with {days_of_data} days of data (requires {required})")]
    HorizonNotSupported {
        requested: u32,
        days_of_data: u32,
        required: u32,
    },

    /// Inventory levels must be non-negative
    #[error("Negative inventory: {0}")]
    NegativeInventory(f64),

    #[error("Unknown store: {0}")]
    UnknownStore(String),

    #[error("Unknown SKU: {0}")]
    UnknownSku(String),

    /// Not even a national pattern exists for the category
    #[error("No demand prior available at any scope for category '{category}'")]
    PriorUnavailable { category: String },

    /// Candidate model could not be trained
    #[error("Training error: {0}")]
    TrainingError(String),

    /// Reference-data feed failure
    #[error("Feed error: {0}")]
    FeedError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Error from mathematical operations
    #[error("Math error: {0}")]
    MathError(#[from] demand_math::MathError),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ForecastError {
    /// Errors that are surfaced synchronously to callers as hard failures
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ForecastError::ValidationError(_)
                | ForecastError::InvalidParameter(_)
                | ForecastError::HorizonNotSupported { .. }
                | ForecastError::NegativeInventory(_)
                | ForecastError::UnknownStore(_)
                | ForecastError::UnknownSku(_)
        )
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        ForecastError::ValidationError(msg.into())
    }
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        ForecastError::CsvError(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::SerializationError(err.to_string())
    }
}
