//! # Demand Math
//!
//! Numeric building blocks shared by the forecasting core: descriptive
//! statistics that stay robust on sparse shop-level histories, a batch trend
//! regression, moving averages and great-circle distances between stores.

use thiserror::Error;

pub mod geo;
pub mod moving_averages;
pub mod regression;
pub mod stats;

pub use geo::{haversine_km, GeoPoint};
pub use moving_averages::{ExponentialMovingAverage, SimpleMovingAverage};
pub use regression::LinearTrend;

/// Errors that can occur in demand-related calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type for demand math operations
pub type Result<T> = std::result::Result<T, MathError>;
