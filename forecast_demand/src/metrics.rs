//! Metrics for evaluating forecast performance

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Forecast accuracy metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastAccuracy {
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error, in percentage points
    pub mape: f64,
    /// Symmetric Mean Absolute Percentage Error
    pub smape: f64,
    /// Number of paired observations
    pub count: usize,
}

impl std::fmt::Display for ForecastAccuracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Forecast Accuracy Metrics ({} points):", self.count)?;
        writeln!(f, "  MAE:   {:.4}", self.mae)?;
        writeln!(f, "  MSE:   {:.4}", self.mse)?;
        writeln!(f, "  RMSE:  {:.4}", self.rmse)?;
        writeln!(f, "  MAPE:  {:.4}%", self.mape)?;
        writeln!(f, "  SMAPE: {:.4}%", self.smape)?;
        Ok(())
    }
}

fn check_lengths(forecast: &[f64], actual: &[f64]) -> Result<()> {
    if forecast.len() != actual.len() || forecast.is_empty() {
        return Err(ForecastError::ValidationError(
            "Forecast and actual values must have the same non-zero length".to_string(),
        ));
    }
    Ok(())
}

/// Calculate accuracy metrics for a forecast vs actual values
pub fn forecast_accuracy(forecast: &[f64], actual: &[f64]) -> Result<ForecastAccuracy> {
    check_lengths(forecast, actual)?;
    let n = forecast.len() as f64;

    let errors: Vec<f64> = forecast
        .iter()
        .zip(actual.iter())
        .map(|(&f, &a)| a - f)
        .collect();

    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let mse = errors.iter().map(|e| e.powi(2)).sum::<f64>() / n;

    let smape = actual
        .iter()
        .zip(forecast.iter())
        .map(|(&a, &f)| {
            let (abs_a, abs_f) = (a.abs(), f.abs());
            if abs_a + abs_f == 0.0 {
                0.0
            } else {
                200.0 * (a - f).abs() / (abs_a + abs_f)
            }
        })
        .sum::<f64>()
        / n;

    Ok(ForecastAccuracy {
        mae,
        mse,
        rmse: mse.sqrt(),
        mape: mape(forecast, actual)?,
        smape,
        count: forecast.len(),
    })
}

/// Mean absolute percentage error over the days with non-zero demand
///
/// Sparse series often have zero-demand days, which carry no percentage
/// error. When every actual is zero the result is 0 for an all-zero forecast
/// and 100 otherwise.
pub fn mape(forecast: &[f64], actual: &[f64]) -> Result<f64> {
    check_lengths(forecast, actual)?;
    let (sum, count) = forecast
        .iter()
        .zip(actual)
        .filter(|(_, a)| **a != 0.0)
        .fold((0.0, 0usize), |(sum, count), (f, a)| {
            (sum + ((a - f).abs() / a.abs()) * 100.0, count + 1)
        });
    if count == 0 {
        let any_demand_forecast = forecast.iter().any(|f| f.abs() > 1e-9);
        return Ok(if any_demand_forecast { 100.0 } else { 0.0 });
    }
    Ok(sum / count as f64)
}

/// Root mean squared error
pub fn rmse(forecast: &[f64], actual: &[f64]) -> Result<f64> {
    check_lengths(forecast, actual)?;
    let mse = forecast
        .iter()
        .zip(actual)
        .map(|(f, a)| (a - f).powi(2))
        .sum::<f64>()
        / forecast.len() as f64;
    Ok(mse.sqrt())
}
