//! Moving averages over daily demand
//!
//! - Simple Moving Average (SMA) with a fixed trailing window
//! - Exponential Moving Average (EMA) parameterised by its smoothing factor

use crate::{MathError, Result};
use std::collections::VecDeque;

/// Simple Moving Average (SMA) implementation
#[derive(Debug, Clone)]
pub struct SimpleMovingAverage {
    period: usize,
    values: VecDeque<f64>,
    sum: f64,
}

impl SimpleMovingAverage {
    /// Create a new Simple Moving Average with the specified period
    pub fn new(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(MathError::InvalidInput(
                "Period must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            period,
            values: VecDeque::with_capacity(period),
            sum: 0.0,
        })
    }

    /// Push a new observation, evicting the oldest once the window is full
    pub fn update(&mut self, value: f64) {
        self.values.push_back(value);
        self.sum += value;

        if self.values.len() > self.period {
            if let Some(old_value) = self.values.pop_front() {
                self.sum -= old_value;
            }
        }
    }

    /// Average of the observations currently in the window.
    ///
    /// A partially filled window averages what it has; only an empty window
    /// is an error.
    pub fn value(&self) -> Result<f64> {
        if self.values.is_empty() {
            return Err(MathError::InsufficientData(
                "No observations in the moving-average window".to_string(),
            ));
        }
        Ok(self.sum / self.values.len() as f64)
    }

    /// True once `period` observations have been seen
    pub fn is_full(&self) -> bool {
        self.values.len() == self.period
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Observations currently in the window, oldest first
    pub fn window(&self) -> impl Iterator<Item = &f64> {
        self.values.iter()
    }
}

/// Exponential Moving Average (EMA) implementation
#[derive(Debug, Clone)]
pub struct ExponentialMovingAverage {
    alpha: f64,
    current: Option<f64>,
}

impl ExponentialMovingAverage {
    /// Create a new EMA with smoothing factor `alpha` in (0, 1]
    pub fn new(alpha: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(MathError::InvalidInput(
                "Alpha must be in (0, 1]".to_string(),
            ));
        }
        Ok(Self {
            alpha,
            current: None,
        })
    }

    /// EMA whose smoothing factor matches an SMA of the given period
    pub fn with_period(period: usize) -> Result<Self> {
        if period == 0 {
            return Err(MathError::InvalidInput(
                "Period must be greater than zero".to_string(),
            ));
        }
        Self::new(2.0 / (period as f64 + 1.0))
    }

    /// Fold in a new observation; the first observation seeds the level
    pub fn update(&mut self, value: f64) {
        self.current = Some(match self.current {
            None => value,
            Some(current) => self.alpha * value + (1.0 - self.alpha) * current,
        });
    }

    pub fn value(&self) -> Result<f64> {
        self.current.ok_or_else(|| {
            MathError::InsufficientData("EMA has not seen any observations".to_string())
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

/// Mean of the last `window` values (fewer if the slice is shorter)
pub fn trailing_mean(values: &[f64], window: usize) -> Result<f64> {
    if window == 0 {
        return Err(MathError::InvalidInput(
            "Window must be greater than zero".to_string(),
        ));
    }
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot average an empty series".to_string(),
        ));
    }
    let start = values.len().saturating_sub(window);
    let tail = &values[start..];
    Ok(tail.iter().sum::<f64>() / tail.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn sma_slides_over_window() {
        let mut sma = SimpleMovingAverage::new(3).unwrap();
        for v in [1.0, 2.0, 3.0, 4.0] {
            sma.update(v);
        }
        assert!(sma.is_full());
        assert_relative_eq!(sma.value().unwrap(), 3.0);
        assert_eq!(sma.window().count(), 3);
    }

    #[test]
    fn sma_partial_window_averages_available() {
        let mut sma = SimpleMovingAverage::new(7).unwrap();
        assert!(sma.value().is_err());
        sma.update(4.0);
        sma.update(6.0);
        assert_relative_eq!(sma.value().unwrap(), 5.0);
    }

    #[test]
    fn ema_seeds_then_smooths() {
        let mut ema = ExponentialMovingAverage::new(0.5).unwrap();
        ema.update(10.0);
        assert_relative_eq!(ema.value().unwrap(), 10.0);
        ema.update(20.0);
        assert_relative_eq!(ema.value().unwrap(), 15.0);
    }

    #[test]
    fn invalid_parameters_rejected() {
        assert!(SimpleMovingAverage::new(0).is_err());
        assert!(ExponentialMovingAverage::new(0.0).is_err());
        assert!(ExponentialMovingAverage::new(1.5).is_err());
        assert!(ExponentialMovingAverage::with_period(0).is_err());
        assert!(trailing_mean(&[1.0], 0).is_err());
    }

    #[test]
    fn trailing_mean_uses_tail() {
        let values = [100.0, 1.0, 2.0, 3.0];
        assert_relative_eq!(trailing_mean(&values, 3).unwrap(), 2.0);
        assert_relative_eq!(trailing_mean(&values, 10).unwrap(), 26.5);
    }
}
