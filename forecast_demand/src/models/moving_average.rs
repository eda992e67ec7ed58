//! Simple moving-average fallback for short histories

use crate::data::DemandSeries;
use crate::error::{ForecastError, Result};
use crate::models::{DayContext, ForecastModel, TrainedForecastModel};
use demand_math::{moving_averages::trailing_mean, stats, SimpleMovingAverage};
use serde::{Deserialize, Serialize};

/// Simple Moving Average model
#[derive(Debug, Clone)]
pub struct MovingAverageFallback {
    /// Name of the model
    name: String,
    /// Window size
    window: usize,
}

/// Trained Simple Moving Average model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedMovingAverage {
    window: usize,
    /// Last calculated average
    last_average: f64,
    /// Spread of one-step errors over the training data
    residual_std: f64,
    /// Mean of the training data
    mean_demand: f64,
}

impl MovingAverageFallback {
    /// Create a new Simple Moving Average model
    pub fn new(window: usize) -> Result<Self> {
        if window == 0 {
            return Err(ForecastError::InvalidParameter(
                "Window size must be positive".to_string(),
            ));
        }

        Ok(Self {
            name: format!("Simple Moving Average (window={})", window),
            window,
        })
    }
}

impl TrainedMovingAverage {
    pub fn window(&self) -> usize {
        self.window
    }

    pub fn last_average(&self) -> f64 {
        self.last_average
    }

    pub fn residual_std(&self) -> f64 {
        self.residual_std
    }

    /// Coefficient-of-variation based confidence in [0, 1]
    pub fn confidence(&self) -> f64 {
        if self.mean_demand <= 0.0 {
            return 0.0;
        }
        1.0 / (1.0 + self.residual_std / self.mean_demand)
    }
}

impl ForecastModel for MovingAverageFallback {
    type Trained = TrainedMovingAverage;

    fn train(&self, data: &DemandSeries) -> Result<Self::Trained> {
        let values = data.values();
        if values.is_empty() {
            return Err(ForecastError::DataError(
                "Empty demand series".to_string(),
            ));
        }

        // One-step errors of the rolling average against the next day
        let mut sma = SimpleMovingAverage::new(self.window)?;
        let mut errors = Vec::with_capacity(values.len());
        for &value in values {
            if let Ok(average) = sma.value() {
                errors.push(value - average);
            }
            sma.update(value);
        }
        let residual_std = if errors.len() >= 2 {
            stats::std_dev(&errors)?
        } else {
            0.0
        };

        Ok(TrainedMovingAverage {
            window: self.window,
            last_average: sma.value()?,
            residual_std,
            mean_demand: stats::mean(values)?,
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl TrainedForecastModel for TrainedMovingAverage {
    fn predict_day(&self, ctx: &DayContext<'_>) -> Result<f64> {
        if ctx.history.is_empty() {
            return Ok(self.last_average);
        }
        Ok(trailing_mean(ctx.history, self.window)?)
    }

    fn name(&self) -> &str {
        "moving_average"
    }
}
