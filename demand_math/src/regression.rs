//! Batch trend regression
//!
//! Fits `y = intercept + slope * t` by ordinary least squares over the whole
//! sample at once.

use crate::{MathError, Result};
use serde::{Deserialize, Serialize};

/// Fitted linear trend over an integer time index
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearTrend {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearTrend {
    /// Fit against the implicit index `t = 0, 1, 2, ...`
    pub fn fit(values: &[f64]) -> Result<Self> {
        let index: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
        Self::fit_xy(&index, values)
    }

    /// Fit against explicit x positions (gaps allowed)
    pub fn fit_xy(x: &[f64], y: &[f64]) -> Result<Self> {
        if x.len() != y.len() {
            return Err(MathError::InvalidInput(format!(
                "x length ({}) doesn't match y length ({})",
                x.len(),
                y.len()
            )));
        }
        if y.len() < 2 {
            return Err(MathError::InsufficientData(
                "Not enough data for a trend fit. Need at least 2 points.".to_string(),
            ));
        }

        let n = y.len() as f64;
        let x_mean = x.iter().sum::<f64>() / n;
        let y_mean = y.iter().sum::<f64>() / n;

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (xi, yi) in x.iter().zip(y) {
            numerator += (xi - x_mean) * (yi - y_mean);
            denominator += (xi - x_mean).powi(2);
        }

        if denominator.abs() < 1e-10 {
            return Err(MathError::CalculationError(
                "Cannot calculate slope: x values are too similar".to_string(),
            ));
        }

        let slope = numerator / denominator;
        Ok(Self {
            slope,
            intercept: y_mean - slope * x_mean,
        })
    }

    /// A flat trend at the given level
    pub fn flat(level: f64) -> Self {
        Self {
            slope: 0.0,
            intercept: level,
        }
    }

    /// Trend value at position `t`
    pub fn at(&self, t: f64) -> f64 {
        self.intercept + self.slope * t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn recovers_exact_line() {
        let values: Vec<f64> = (0..10).map(|t| 5.0 + 2.0 * t as f64).collect();
        let trend = LinearTrend::fit(&values).unwrap();
        assert_relative_eq!(trend.slope, 2.0, epsilon = 1e-10);
        assert_relative_eq!(trend.intercept, 5.0, epsilon = 1e-10);
        assert_relative_eq!(trend.at(12.0), 29.0, epsilon = 1e-10);
    }

    #[test]
    fn handles_gapped_positions() {
        let x = [0.0, 2.0, 7.0];
        let y = [1.0, 5.0, 15.0];
        let trend = LinearTrend::fit_xy(&x, &y).unwrap();
        assert_relative_eq!(trend.slope, 2.0, epsilon = 1e-10);
    }

    #[test]
    fn rejects_degenerate_input() {
        assert!(LinearTrend::fit(&[1.0]).is_err());
        assert!(LinearTrend::fit_xy(&[3.0, 3.0], &[1.0, 2.0]).is_err());
        assert!(LinearTrend::fit_xy(&[1.0, 2.0], &[1.0]).is_err());
    }
}
