//! Forecasting model families
//!
//! The ensemble is a closed set of three members, listed in
//! [`ENSEMBLE_MEMBERS`]; [`moving_average`] is the fallback used before a
//! store has enough history to train them.

use crate::config::EnsembleConfig;
use crate::data::DemandSeries;
use crate::error::Result;
use crate::features::ContextFeatures;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

pub mod boosted;
pub mod holiday;
pub mod moving_average;
pub mod trend_seasonal;

pub use boosted::{GradientBoostedTrees, TrainedBoostedTrees};
pub use holiday::{HolidayDecomposition, TrainedHolidayDecomposition};
pub use moving_average::{MovingAverageFallback, TrainedMovingAverage};
pub use trend_seasonal::{TrainedTrendSeasonal, TrendSeasonal};

/// Everything a trained model may look at to predict one day
#[derive(Debug, Clone, Copy)]
pub struct DayContext<'a> {
    pub date: NaiveDate,
    pub features: &'a ContextFeatures,
    /// Daily demand up to the day before `date`, oldest first
    pub history: &'a [f64],
}

impl<'a> DayContext<'a> {
    pub fn new(date: NaiveDate, features: &'a ContextFeatures, history: &'a [f64]) -> Self {
        Self {
            date,
            features,
            history,
        }
    }

    pub fn last(&self) -> Option<f64> {
        self.history.last().copied()
    }
}

/// Trained forecast model
pub trait TrainedForecastModel: Debug {
    /// Point prediction for one day
    fn predict_day(&self, ctx: &DayContext<'_>) -> Result<f64>;

    /// Name of the model
    fn name(&self) -> &str;
}

/// Forecast model that can be trained on a demand series
pub trait ForecastModel: Debug + Clone {
    /// The type of trained model produced
    type Trained: TrainedForecastModel;

    /// Train the model on a demand series
    fn train(&self, data: &DemandSeries) -> Result<Self::Trained>;

    /// Get the name of the model
    fn name(&self) -> &str;
}

/// Ensemble member families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    TrendSeasonal,
    GradientBoosted,
    HolidayDecomposition,
}

impl ModelKind {
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::TrendSeasonal => "trend_seasonal",
            ModelKind::GradientBoosted => "gradient_boosted",
            ModelKind::HolidayDecomposition => "holiday_decomposition",
        };
        f.write_str(name)
    }
}

pub const MEMBER_COUNT: usize = 3;

pub const ENSEMBLE_MEMBERS: [ModelKind; MEMBER_COUNT] = [
    ModelKind::TrendSeasonal,
    ModelKind::GradientBoosted,
    ModelKind::HolidayDecomposition,
];

/// A trained ensemble member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemberModel {
    TrendSeasonal(TrainedTrendSeasonal),
    GradientBoosted(TrainedBoostedTrees),
    HolidayDecomposition(TrainedHolidayDecomposition),
}

impl MemberModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            MemberModel::TrendSeasonal(_) => ModelKind::TrendSeasonal,
            MemberModel::GradientBoosted(_) => ModelKind::GradientBoosted,
            MemberModel::HolidayDecomposition(_) => ModelKind::HolidayDecomposition,
        }
    }
}

impl TrainedForecastModel for MemberModel {
    fn predict_day(&self, ctx: &DayContext<'_>) -> Result<f64> {
        match self {
            MemberModel::TrendSeasonal(m) => m.predict_day(ctx),
            MemberModel::GradientBoosted(m) => m.predict_day(ctx),
            MemberModel::HolidayDecomposition(m) => m.predict_day(ctx),
        }
    }

    fn name(&self) -> &str {
        match self {
            MemberModel::TrendSeasonal(m) => m.name(),
            MemberModel::GradientBoosted(m) => m.name(),
            MemberModel::HolidayDecomposition(m) => m.name(),
        }
    }
}

/// Untrained configurations of every member, in [`ENSEMBLE_MEMBERS`] order
#[derive(Debug, Clone)]
pub struct MemberSpecs {
    pub trend_seasonal: TrendSeasonal,
    pub boosted: GradientBoostedTrees,
    pub holiday: HolidayDecomposition,
}

impl MemberSpecs {
    pub fn from_config(config: &EnsembleConfig) -> Result<Self> {
        Ok(Self {
            trend_seasonal: TrendSeasonal::new(),
            boosted: GradientBoostedTrees::new(config.boosting.clone())?,
            holiday: HolidayDecomposition::new(config.holiday_level_alpha)?,
        })
    }

    /// Train all three members on the same series
    pub fn train_all(&self, data: &DemandSeries) -> Result<Vec<MemberModel>> {
        Ok(vec![
            MemberModel::TrendSeasonal(self.trend_seasonal.train(data)?),
            MemberModel::GradientBoosted(self.boosted.train(data)?),
            MemberModel::HolidayDecomposition(self.holiday.train(data)?),
        ])
    }
}

/// One-step-ahead predictions over `eval`, feeding actuals back as history
pub fn walk_forward<M>(model: &M, prefix: &[f64], eval: &DemandSeries) -> Result<Vec<f64>>
where
    M: TrainedForecastModel + ?Sized,
{
    let mut history = prefix.to_vec();
    let mut predictions = Vec::with_capacity(eval.len());
    for ((date, features), actual) in eval.dates().iter().zip(eval.features()).zip(eval.values()) {
        let ctx = DayContext::new(*date, features, &history);
        predictions.push(model.predict_day(&ctx)?.max(0.0));
        history.push(*actual);
    }
    Ok(predictions)
}

/// Lag inputs shared by the member models: `[lag1, lag7, mean of last 7]`
pub(crate) fn lag_features(history: &[f64]) -> [f64; 3] {
    let lag1 = history.last().copied().unwrap_or(0.0);
    let lag7 = if history.len() >= 7 {
        history[history.len() - 7]
    } else {
        lag1
    };
    let tail = &history[history.len().saturating_sub(7)..];
    let mean7 = if tail.is_empty() {
        0.0
    } else {
        tail.iter().sum::<f64>() / tail.len() as f64
    };
    [lag1, lag7, mean7]
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::data::DemandSeries;
    use crate::features::ContextFeatures;
    use chrono::{Datelike, Duration, NaiveDate, Weekday};

    /// `days` of demand starting Monday 2024-01-01 with a weekend lift and
    /// a gentle upward trend
    pub fn weekly_series(days: usize) -> DemandSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..days).map(|i| start + Duration::days(i as i64)).collect();
        let values = dates
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let weekend = matches!(d.weekday(), Weekday::Sat | Weekday::Sun);
                10.0 + 0.05 * i as f64 + if weekend { 6.0 } else { 0.0 }
            })
            .collect();
        let features = dates.iter().map(|d| ContextFeatures::neutral(*d)).collect();
        DemandSeries::new(dates, values, features).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn lag_features_handle_short_histories() {
        assert_eq!(lag_features(&[]), [0.0, 0.0, 0.0]);
        assert_eq!(lag_features(&[2.0, 4.0]), [4.0, 4.0, 3.0]);
        let long: Vec<f64> = (1..=10).map(f64::from).collect();
        let [lag1, lag7, mean7] = lag_features(&long);
        assert_relative_eq!(lag1, 10.0);
        assert_relative_eq!(lag7, 4.0);
        assert_relative_eq!(mean7, 7.0);
    }

    #[test]
    fn members_train_and_walk_forward() {
        let series = test_support::weekly_series(56);
        let (train, eval) = series.split_tail(14).unwrap();
        let members = MemberSpecs::from_config(&EnsembleConfig::default())
            .unwrap()
            .train_all(&train)
            .unwrap();
        assert_eq!(members.iter().map(|m| m.kind()).collect::<Vec<_>>(), ENSEMBLE_MEMBERS.to_vec());
        for member in &members {
            let predictions = walk_forward(member, train.values(), &eval).unwrap();
            assert_eq!(predictions.len(), 14);
            let mape = crate::metrics::mape(&predictions, eval.values()).unwrap();
            assert!(mape < 25.0, "{} mape {}", member.name(), mape);
        }
    }
}
