//! Regional demand priors
//!
//! A [`DemandPattern`] summarises a category's daily demand at one store.
//! The [`RegionalPriorEngine`] aggregates the patterns of comparable stores
//! into a [`RegionalPrior`], escalating from a local radius to the state and
//! finally to national scope, and [`PriorCache`] memoises the result per
//! regional cohort.

mod cache;
mod engine;

pub use cache::{PriorCache, PriorKey};
pub use engine::{RegionalPriorEngine, StorePopulation};

use crate::data::DemandSeries;
use crate::error::{ForecastError, Result};
use crate::features::ContextFeatures;
use demand_math::stats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Aggregated description of a category's daily demand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandPattern {
    pub mean_daily_demand: f64,
    /// Multiplicative index per weekday, Monday first
    pub day_of_week: [f64; 7],
    /// Multiplicative index per calendar month, January first
    pub month_of_year: [f64; 12],
    pub festival_multipliers: BTreeMap<String, f64>,
    /// Multiplier on wet monsoon days
    pub monsoon_multiplier: f64,
    /// Multiplier on salary-cycle days
    pub salary_cycle_multiplier: f64,
}

impl DemandPattern {
    /// A pattern with no seasonality around `mean_daily_demand`
    pub fn flat(mean_daily_demand: f64) -> Self {
        Self {
            mean_daily_demand,
            day_of_week: [1.0; 7],
            month_of_year: [1.0; 12],
            festival_multipliers: BTreeMap::new(),
            monsoon_multiplier: 1.0,
            salary_cycle_multiplier: 1.0,
        }
    }

    /// Estimate ratio indices from one daily series
    pub fn estimate(series: &DemandSeries) -> Result<Self> {
        if series.is_empty() {
            return Err(ForecastError::DataError(
                "Cannot estimate a demand pattern from an empty series".to_string(),
            ));
        }
        let values = series.values();
        let features = series.features();
        let overall = stats::mean(values)?;
        let mut pattern = Self::flat(overall);
        if overall <= 0.0 {
            return Ok(pattern);
        }

        let mean_where = |pred: &dyn Fn(&ContextFeatures) -> bool| -> Option<f64> {
            let selected: Vec<f64> = values
                .iter()
                .zip(features)
                .filter(|(_, f)| pred(f))
                .map(|(v, _)| *v)
                .collect();
            stats::mean(&selected).ok()
        };

        // Calendar indices are measured on ordinary days only.
        let ordinary = |f: &ContextFeatures| !f.festival_active();
        let baseline = mean_where(&ordinary).filter(|m| *m > 0.0).unwrap_or(overall);

        for (weekday, index) in pattern.day_of_week.iter_mut().enumerate() {
            if let Some(m) = mean_where(&|f| ordinary(f) && f.weekday_index() == weekday) {
                *index = m / baseline;
            }
        }
        for (month, index) in pattern.month_of_year.iter_mut().enumerate() {
            if let Some(m) = mean_where(&|f| ordinary(f) && f.month_index() == month) {
                *index = m / baseline;
            }
        }

        let mut festival_days: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        for (value, f) in values.iter().zip(features) {
            for name in &f.festivals {
                festival_days.entry(name.as_str()).or_default().push(*value);
            }
        }
        for (name, days) in festival_days {
            if let Ok(m) = stats::mean(&days) {
                pattern.festival_multipliers.insert(name.to_string(), m / baseline);
            }
        }

        pattern.monsoon_multiplier = ratio_of_means(
            mean_where(&|f| ordinary(f) && f.monsoon_phase.is_wet()),
            mean_where(&|f| ordinary(f) && !f.monsoon_phase.is_wet()),
        );
        pattern.salary_cycle_multiplier = ratio_of_means(
            mean_where(&|f| ordinary(f) && f.salary_cycle),
            mean_where(&|f| ordinary(f) && !f.salary_cycle),
        );

        Ok(pattern)
    }

    pub fn festival_multiplier(&self, festival: &str) -> Option<f64> {
        self.festival_multipliers.get(festival).copied()
    }

    /// Expected demand on a day with the given context
    pub fn expected_demand(&self, features: &ContextFeatures) -> f64 {
        let mut demand = self.mean_daily_demand
            * self.day_of_week[features.weekday_index()]
            * self.month_of_year[features.month_index()];
        for name in &features.festivals {
            demand *= self.festival_multiplier(name).unwrap_or(1.0);
        }
        if features.monsoon_phase.is_wet() {
            demand *= self.monsoon_multiplier;
        }
        if features.salary_cycle {
            demand *= self.salary_cycle_multiplier;
        }
        demand.max(0.0)
    }

    /// Same shape with the level multiplied by `share`
    pub fn scaled(&self, share: f64) -> Self {
        Self {
            mean_daily_demand: self.mean_daily_demand * share,
            ..self.clone()
        }
    }
}

fn ratio_of_means(numerator: Option<f64>, denominator: Option<f64>) -> f64 {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d > 0.0 => n / d,
        _ => 1.0,
    }
}

/// The scope a prior was resolved at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum PriorScope {
    Local { radius_km: f64 },
    State { state: String },
    National,
}

impl fmt::Display for PriorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorScope::Local { radius_km } => write!(f, "local({} km)", radius_km),
            PriorScope::State { state } => write!(f, "state({})", state),
            PriorScope::National => f.write_str("national"),
        }
    }
}

/// One step of scope resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeAttempt {
    pub scope: PriorScope,
    pub comparable_stores: usize,
}

/// A demand pattern tagged with the scope it was aggregated at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionalPrior {
    pub category: String,
    pub scope: PriorScope,
    pub pattern: DemandPattern,
    pub contributing_stores: usize,
    /// In [0, 1]; grows with contributors and shrinks with their dispersion
    pub confidence: f64,
    /// Every scope tried on the way, the resolved one last
    pub attempts: Vec<ScopeAttempt>,
}

impl RegionalPrior {
    pub fn is_local(&self) -> bool {
        matches!(self.scope, PriorScope::Local { .. })
    }
}
