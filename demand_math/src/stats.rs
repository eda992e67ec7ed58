//! Descriptive statistics over demand samples
//!
//! All functions ignore nothing: NaN inputs are the caller's problem and are
//! rejected by the validating entry points of the forecasting crate.

use crate::{MathError, Result};
use std::cmp::Ordering;

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    v
}

/// Arithmetic mean
pub fn mean(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot take the mean of an empty sample".to_string(),
        ));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance
pub fn variance(values: &[f64]) -> Result<f64> {
    let m = mean(values)?;
    Ok(values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64)
}

/// Population standard deviation
pub fn std_dev(values: &[f64]) -> Result<f64> {
    Ok(variance(values)?.sqrt())
}

/// Median of a sample
pub fn median(values: &[f64]) -> Result<f64> {
    quantile(values, 0.5)
}

/// Quantile with linear interpolation between closest ranks
pub fn quantile(values: &[f64], q: f64) -> Result<f64> {
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot take a quantile of an empty sample".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&q) {
        return Err(MathError::InvalidInput(format!(
            "Quantile must be within [0, 1], got {}",
            q
        )));
    }

    let v = sorted(values);
    let pos = q * (v.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Ok(v[lo] + (v[hi] - v[lo]) * frac)
}

/// Interquartile range (Q3 - Q1)
pub fn iqr(values: &[f64]) -> Result<f64> {
    Ok(quantile(values, 0.75)? - quantile(values, 0.25)?)
}

/// Weighted median.
///
/// Returns the smallest value whose cumulative weight reaches half the total
/// weight; when the half-way point falls exactly on a boundary the two
/// neighbouring values are averaged, so equal weights reproduce [`median`].
pub fn weighted_median(values: &[f64], weights: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(MathError::InsufficientData(
            "Cannot take the weighted median of an empty sample".to_string(),
        ));
    }
    if values.len() != weights.len() {
        return Err(MathError::InvalidInput(format!(
            "Values length ({}) doesn't match weights length ({})",
            values.len(),
            weights.len()
        )));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(MathError::InvalidInput(
            "Weights must be finite and non-negative".to_string(),
        ));
    }

    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(MathError::InvalidInput(
            "Weights must not sum to zero".to_string(),
        ));
    }

    let mut pairs: Vec<(f64, f64)> = values.iter().copied().zip(weights.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    let half = total / 2.0;
    let mut cumulative = 0.0;
    for (i, (value, weight)) in pairs.iter().enumerate() {
        cumulative += weight;
        if (cumulative - half).abs() <= 1e-12 * total {
            let next = pairs
                .iter()
                .skip(i + 1)
                .find(|(_, w)| *w > 0.0)
                .map(|(v, _)| *v)
                .unwrap_or(*value);
            return Ok((value + next) / 2.0);
        }
        if cumulative > half {
            return Ok(*value);
        }
    }

    Ok(pairs[pairs.len() - 1].0)
}

/// Lag-1 autocorrelation, zero for constant or too-short samples
pub fn lag1_autocorrelation(values: &[f64]) -> f64 {
    if values.len() < 3 {
        return 0.0;
    }
    let m = values.iter().sum::<f64>() / values.len() as f64;
    let denom: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    if denom.abs() < 1e-12 {
        return 0.0;
    }
    let num: f64 = values.windows(2).map(|w| (w[0] - m) * (w[1] - m)).sum();
    num / denom
}
