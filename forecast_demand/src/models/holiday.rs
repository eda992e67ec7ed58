//! Holiday-aware multiplicative decomposition
//!
//! `demand = level * weekday index * festival effect * monsoon effect`.
//! Festival effects are keyed by festival name rather than calendar date, so
//! festivals that move between years still line up. Unseen festivals fall
//! back to the average effect of all festivals seen in training.

use crate::data::DemandSeries;
use crate::error::{ForecastError, Result};
use crate::features::ContextFeatures;
use crate::models::{DayContext, ForecastModel, TrainedForecastModel};
use chrono::{Datelike, Duration, NaiveDate};
use demand_math::ExponentialMovingAverage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pseudo-observations pulling each effect toward 1.0
const EFFECT_SHRINKAGE: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct HolidayDecomposition {
    alpha: f64,
}

impl HolidayDecomposition {
    pub fn new(alpha: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "Level smoothing factor must be in (0, 1], got {}",
                alpha
            )));
        }
        Ok(Self { alpha })
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct EffectStats {
    sum: f64,
    count: u32,
}

impl EffectStats {
    fn push(&mut self, ratio: f64) {
        self.sum += ratio;
        self.count += 1;
    }

    fn shrunk(&self) -> f64 {
        (self.sum + EFFECT_SHRINKAGE) / (self.count as f64 + EFFECT_SHRINKAGE)
    }
}

/// Trained holiday decomposition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedHolidayDecomposition {
    alpha: f64,
    level: f64,
    trained_through: NaiveDate,
    weekday_index: [f64; 7],
    festival_effects: BTreeMap<String, f64>,
    generic_festival_effect: f64,
    monsoon_effect: f64,
}

impl TrainedHolidayDecomposition {
    pub fn festival_effect(&self, festival: &str) -> f64 {
        self.festival_effects
            .get(festival)
            .copied()
            .unwrap_or(self.generic_festival_effect)
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    fn calendar_effect(&self, features: &ContextFeatures) -> f64 {
        let mut effect = 1.0;
        for name in &features.festivals {
            effect *= self.festival_effect(name);
        }
        if features.monsoon_phase.is_wet() {
            effect *= self.monsoon_effect;
        }
        effect
    }

    // Fold observations newer than training into the level.
    fn current_level(&self, ctx: &DayContext<'_>) -> f64 {
        let first_known = ctx.date - Duration::days(ctx.history.len() as i64);
        let skip = (self.trained_through - first_known).num_days() + 1;
        if skip >= ctx.history.len() as i64 {
            return self.level;
        }
        let start = skip.max(0) as usize;
        let mut level = self.level;
        for (offset, value) in ctx.history.iter().enumerate().skip(start) {
            let date = first_known + Duration::days(offset as i64);
            let index = self.weekday_index[date.weekday().num_days_from_monday() as usize];
            if index > 0.0 {
                level = self.alpha * (value / index) + (1.0 - self.alpha) * level;
            }
        }
        level
    }
}

impl ForecastModel for HolidayDecomposition {
    type Trained = TrainedHolidayDecomposition;

    fn train(&self, data: &DemandSeries) -> Result<Self::Trained> {
        let trained_through = data.last_date().ok_or_else(|| {
            ForecastError::TrainingError("Empty series for holiday decomposition".to_string())
        })?;
        if data.len() < 14 {
            return Err(ForecastError::TrainingError(format!(
                "Holiday decomposition needs at least 14 observations, got {}",
                data.len()
            )));
        }

        let ordinary: Vec<(&ContextFeatures, f64)> = data
            .features()
            .iter()
            .zip(data.values().iter().copied())
            .filter(|(f, _)| !f.festival_active())
            .collect();
        let ordinary_mean = if ordinary.is_empty() {
            0.0
        } else {
            ordinary.iter().map(|(_, v)| v).sum::<f64>() / ordinary.len() as f64
        };

        let mut weekday_index = [1.0; 7];
        if ordinary_mean > 0.0 {
            for (slot, index) in weekday_index.iter_mut().enumerate() {
                let same: Vec<f64> = ordinary
                    .iter()
                    .filter(|(f, _)| f.weekday_index() == slot)
                    .map(|(_, v)| *v)
                    .collect();
                if !same.is_empty() {
                    let m = same.iter().sum::<f64>() / same.len() as f64;
                    // Keep a floor so deseasonalising never divides by zero.
                    *index = (m / ordinary_mean).max(0.05);
                }
            }
        }

        let mut ema = ExponentialMovingAverage::new(self.alpha)?;
        let mut festivals: BTreeMap<String, EffectStats> = BTreeMap::new();
        let mut generic = EffectStats::default();
        let mut monsoon = EffectStats::default();

        for (features, value) in data.features().iter().zip(data.values()) {
            let index = weekday_index[features.weekday_index()];
            let expected = ema.value().unwrap_or(ordinary_mean) * index;
            if features.festival_active() {
                if expected > 0.0 {
                    let ratio = value / expected;
                    for name in &features.festivals {
                        festivals.entry(name.clone()).or_default().push(ratio);
                    }
                    generic.push(ratio);
                }
                continue;
            }
            if features.monsoon_phase.is_wet() && expected > 0.0 {
                monsoon.push(value / expected);
            }
            ema.update(value / index);
        }

        Ok(TrainedHolidayDecomposition {
            alpha: self.alpha,
            level: ema.value().unwrap_or(ordinary_mean),
            trained_through,
            weekday_index,
            festival_effects: festivals
                .into_iter()
                .map(|(name, stats)| (name, stats.shrunk()))
                .collect(),
            generic_festival_effect: generic.shrunk(),
            monsoon_effect: monsoon.shrunk(),
        })
    }

    fn name(&self) -> &str {
        "holiday_decomposition"
    }
}

impl TrainedForecastModel for TrainedHolidayDecomposition {
    fn predict_day(&self, ctx: &DayContext<'_>) -> Result<f64> {
        let weekday = self.weekday_index[ctx.features.weekday_index()];
        let prediction = self.current_level(ctx) * weekday * self.calendar_effect(ctx.features);
        Ok(prediction.max(0.0))
    }

    fn name(&self) -> &str {
        "holiday_decomposition"
    }
}
