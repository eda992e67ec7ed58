//! Synthetic demand drawn around a [`DemandPattern`]
//!
//! Used to warm-start stores without history and to build fixtures.

use crate::data::{DemandSeries, SkuId, Store, Transaction};
use crate::error::{ForecastError, Result};
use crate::features::{ContextFeatureBuilder, ContextFeatures};
use crate::prior::DemandPattern;
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};

/// `days` of Poisson demand from `start`, with calendar-neutral context
pub fn generate_history(pattern: &DemandPattern, start: NaiveDate, days: usize, seed: u64) -> Result<DemandSeries> {
    let features: Vec<ContextFeatures> = (0..days)
        .map(|i| ContextFeatures::neutral(start + Duration::days(i as i64)))
        .collect();
    sample(pattern, features, seed)
}

/// Like [`generate_history`], with festivals and monsoon taken from `builder`
pub fn generate_history_with(
    pattern: &DemandPattern,
    builder: &ContextFeatureBuilder,
    store: &Store,
    start: NaiveDate,
    days: usize,
    seed: u64,
) -> Result<DemandSeries> {
    let features: Vec<ContextFeatures> = (0..days)
        .map(|i| builder.build(store, start + Duration::days(i as i64)))
        .collect();
    sample(pattern, features, seed)
}

fn sample(pattern: &DemandPattern, features: Vec<ContextFeatures>, seed: u64) -> Result<DemandSeries> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut values = Vec::with_capacity(features.len());
    for f in &features {
        let lambda = pattern.expected_demand(f);
        if !lambda.is_finite() {
            return Err(ForecastError::DataError(format!(
                "expected demand on {} is not finite",
                f.date
            )));
        }
        let value = if lambda <= 0.0 {
            0.0
        } else {
            let poisson = Poisson::new(lambda)
                .map_err(|e| ForecastError::DataError(format!("poisson rate {}: {}", lambda, e)))?;
            poisson.sample(&mut rng)
        };
        values.push(value);
    }
    let dates = features.iter().map(|f| f.date).collect();
    DemandSeries::new(dates, values, features)
}

/// One transaction per day with positive demand
pub fn to_transactions(series: &DemandSeries, sku: impl Into<SkuId>, price: f64) -> Vec<Transaction> {
    let sku = sku.into();
    series
        .dates()
        .iter()
        .zip(series.values())
        .filter(|(_, q)| **q > 0.0)
        .map(|(date, quantity)| Transaction {
            date: *date,
            sku: sku.clone(),
            quantity: *quantity,
            price,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    #[test]
    fn same_seed_same_history() {
        let pattern = DemandPattern::flat(12.0);
        let a = generate_history(&pattern, start(), 60, 7).unwrap();
        let b = generate_history(&pattern, start(), 60, 7).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.values(), generate_history(&pattern, start(), 60, 8).unwrap().values());
    }

    #[test]
    fn mean_tracks_pattern() {
        let series = generate_history(&DemandPattern::flat(20.0), start(), 365, 1).unwrap();
        let mean = series.values().iter().sum::<f64>() / series.len() as f64;
        assert_relative_eq!(mean, 20.0, epsilon = 1.0);
        assert!(series.values().iter().all(|v| *v >= 0.0 && v.fract() == 0.0));
    }

    #[test]
    fn zero_rate_gives_zero_demand() {
        let series = generate_history(&DemandPattern::flat(0.0), start(), 10, 3).unwrap();
        assert!(series.values().iter().all(|v| *v == 0.0));
        assert!(to_transactions(&series, "x", 1.0).is_empty());
    }
}
