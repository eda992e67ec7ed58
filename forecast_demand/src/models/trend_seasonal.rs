//! Linear trend with additive weekly seasonality and an AR(1) residual

use crate::data::DemandSeries;
use crate::error::{ForecastError, Result};
use crate::models::{DayContext, ForecastModel, TrainedForecastModel};
use chrono::{Datelike, Duration, NaiveDate};
use demand_math::{stats, LinearTrend};
use serde::{Deserialize, Serialize};

/// Largest absolute AR(1) coefficient kept after fitting
const MAX_AR: f64 = 0.9;

#[derive(Debug, Clone, Default)]
pub struct TrendSeasonal;

impl TrendSeasonal {
    pub fn new() -> Self {
        Self
    }
}

/// Trained trend/seasonal model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedTrendSeasonal {
    origin: NaiveDate,
    trend: LinearTrend,
    /// Additive weekday offsets, Monday first, summing to zero
    weekly: [f64; 7],
    ar_coefficient: f64,
}

impl TrainedTrendSeasonal {
    fn structural(&self, date: NaiveDate) -> f64 {
        let t = (date - self.origin).num_days() as f64;
        self.trend.at(t) + self.weekly[date.weekday().num_days_from_monday() as usize]
    }

    pub fn ar_coefficient(&self) -> f64 {
        self.ar_coefficient
    }

    pub fn trend(&self) -> &LinearTrend {
        &self.trend
    }
}

impl ForecastModel for TrendSeasonal {
    type Trained = TrainedTrendSeasonal;

    fn train(&self, data: &DemandSeries) -> Result<Self::Trained> {
        let origin = data.first_date().ok_or_else(|| {
            ForecastError::TrainingError("Empty series for trend/seasonal model".to_string())
        })?;
        let values = data.values();
        if values.len() < 14 {
            return Err(ForecastError::TrainingError(format!(
                "Trend/seasonal model needs at least 14 observations, got {}",
                values.len()
            )));
        }

        let trend = LinearTrend::fit(values)?;
        let detrended: Vec<f64> = values
            .iter()
            .enumerate()
            .map(|(i, v)| v - trend.at(i as f64))
            .collect();

        let mut weekly = [0.0; 7];
        for (slot, offset) in weekly.iter_mut().enumerate() {
            let same_day: Vec<f64> = data
                .dates()
                .iter()
                .zip(&detrended)
                .filter(|(d, _)| d.weekday().num_days_from_monday() as usize == slot)
                .map(|(_, r)| *r)
                .collect();
            *offset = stats::mean(&same_day).unwrap_or(0.0);
        }
        let centre = weekly.iter().sum::<f64>() / 7.0;
        weekly.iter_mut().for_each(|w| *w -= centre);

        let residuals: Vec<f64> = data
            .dates()
            .iter()
            .zip(&detrended)
            .map(|(d, r)| r - weekly[d.weekday().num_days_from_monday() as usize])
            .collect();
        let ar_coefficient = stats::lag1_autocorrelation(&residuals).clamp(-MAX_AR, MAX_AR);

        Ok(TrainedTrendSeasonal {
            origin,
            trend,
            weekly,
            ar_coefficient,
        })
    }

    fn name(&self) -> &str {
        "trend_seasonal"
    }
}

impl TrainedForecastModel for TrainedTrendSeasonal {
    fn predict_day(&self, ctx: &DayContext<'_>) -> Result<f64> {
        let mut prediction = self.structural(ctx.date);
        if let Some(last) = ctx.last() {
            let previous = ctx.date - Duration::days(1);
            prediction += self.ar_coefficient * (last - self.structural(previous));
        }
        Ok(prediction.max(0.0))
    }

    fn name(&self) -> &str {
        "trend_seasonal"
    }
}
