//! The immutable per-SKU forecast record

use crate::data::{SkuId, StoreId};
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which evidence produced a forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    RegionalPrior,
    StoreSpecific,
    Blended,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            DataSource::RegionalPrior => "regional_prior",
            DataSource::StoreSpecific => "store_specific",
            DataSource::Blended => "blended",
        };
        f.write_str(tag)
    }
}

/// Demand forecast for one SKU on one day
///
/// Fields are private so that `lower <= predicted <= upper`, non-negativity and
/// the unit ranges of both scores hold for every value of this type. Derived
/// forecasts are produced with [`Forecast::scaled`] and [`Forecast::with_factors`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ForecastRecord")]
pub struct Forecast {
    store_id: StoreId,
    sku: SkuId,
    target_date: NaiveDate,
    predicted_demand: f64,
    confidence_lower: f64,
    confidence_upper: f64,
    confidence_score: f64,
    data_sufficiency_score: f64,
    data_source: DataSource,
    contributing_factors: BTreeMap<String, f64>,
}

/// Wire shape of [`Forecast`]; decoding goes through [`Forecast::new`]
#[derive(Deserialize)]
struct ForecastRecord {
    store_id: StoreId,
    sku: SkuId,
    target_date: NaiveDate,
    predicted_demand: f64,
    confidence_lower: f64,
    confidence_upper: f64,
    confidence_score: f64,
    data_sufficiency_score: f64,
    data_source: DataSource,
    #[serde(default)]
    contributing_factors: BTreeMap<String, f64>,
}

impl TryFrom<ForecastRecord> for Forecast {
    type Error = ForecastError;

    fn try_from(r: ForecastRecord) -> Result<Self> {
        Ok(Forecast::new(
            r.store_id,
            r.sku,
            r.target_date,
            r.predicted_demand,
            (r.confidence_lower, r.confidence_upper),
            r.confidence_score,
            r.data_sufficiency_score,
            r.data_source,
        )?
        .with_factors(r.contributing_factors))
    }
}

impl Forecast {
    /// Build a forecast, clamping the interval around the point estimate
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store_id: impl Into<StoreId>,
        sku: impl Into<SkuId>,
        target_date: NaiveDate,
        predicted_demand: f64,
        interval: (f64, f64),
        confidence_score: f64,
        data_sufficiency_score: f64,
        data_source: DataSource,
    ) -> Result<Self> {
        let (lower, upper) = interval;
        for (name, value) in [
            ("predicted demand", predicted_demand),
            ("confidence lower bound", lower),
            ("confidence upper bound", upper),
            ("confidence score", confidence_score),
            ("data sufficiency score", data_sufficiency_score),
        ] {
            if !value.is_finite() {
                return Err(ForecastError::ForecastingError(format!(
                    "{} is not finite: {}",
                    name, value
                )));
            }
        }

        let predicted = predicted_demand.max(0.0);
        Ok(Self {
            store_id: store_id.into(),
            sku: sku.into(),
            target_date,
            predicted_demand: predicted,
            confidence_lower: lower.min(predicted).max(0.0),
            confidence_upper: upper.max(predicted),
            confidence_score: confidence_score.clamp(0.0, 1.0),
            data_sufficiency_score: data_sufficiency_score.clamp(0.0, 1.0),
            data_source,
            contributing_factors: BTreeMap::new(),
        })
    }

    pub fn store_id(&self) -> &str {
        &self.store_id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn target_date(&self) -> NaiveDate {
        self.target_date
    }

    pub fn predicted_demand(&self) -> f64 {
        self.predicted_demand
    }

    pub fn confidence_lower(&self) -> f64 {
        self.confidence_lower
    }

    pub fn confidence_upper(&self) -> f64 {
        self.confidence_upper
    }

    pub fn interval(&self) -> (f64, f64) {
        (self.confidence_lower, self.confidence_upper)
    }

    pub fn interval_width(&self) -> f64 {
        self.confidence_upper - self.confidence_lower
    }

    pub fn confidence_score(&self) -> f64 {
        self.confidence_score
    }

    pub fn data_sufficiency_score(&self) -> f64 {
        self.data_sufficiency_score
    }

    pub fn data_source(&self) -> DataSource {
        self.data_source
    }

    pub fn contributing_factors(&self) -> &BTreeMap<String, f64> {
        &self.contributing_factors
    }

    /// Same forecast with the point estimate and bounds multiplied by `factor`
    pub fn scaled(&self, factor: f64) -> Self {
        let factor = if factor.is_finite() { factor.max(0.0) } else { 1.0 };
        Self {
            predicted_demand: self.predicted_demand * factor,
            confidence_lower: self.confidence_lower * factor,
            confidence_upper: self.confidence_upper * factor,
            ..self.clone()
        }
    }

    /// Same forecast with an extra contributing factor
    pub fn with_factor(mut self, name: impl Into<String>, effect: f64) -> Self {
        self.contributing_factors.insert(name.into(), effect);
        self
    }

    /// Same forecast with extra contributing factors, later entries winning
    pub fn with_factors<I, K>(mut self, factors: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        self.contributing_factors
            .extend(factors.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn interval_is_clamped_around_prediction() {
        let f = Forecast::new("s", "k", date(), 10.0, (12.0, 8.0), 1.4, -0.2, DataSource::Blended).unwrap();
        assert_eq!(f.interval(), (10.0, 10.0));
        assert_relative_eq!(f.confidence_score(), 1.0);
        assert_relative_eq!(f.data_sufficiency_score(), 0.0);

        let negative = Forecast::new("s", "k", date(), -3.0, (-5.0, 2.0), 0.5, 0.5, DataSource::Blended).unwrap();
        assert_relative_eq!(negative.predicted_demand(), 0.0);
        assert_relative_eq!(negative.confidence_lower(), 0.0);
        assert_relative_eq!(negative.confidence_upper(), 2.0);
    }

    #[test]
    fn non_finite_values_are_errors() {
        assert!(Forecast::new("s", "k", date(), f64::NAN, (0.0, 1.0), 0.5, 0.5, DataSource::Blended).is_err());
        assert!(Forecast::new("s", "k", date(), 1.0, (0.0, f64::INFINITY), 0.5, 0.5, DataSource::Blended).is_err());
    }

    #[test]
    fn scaling_preserves_ordering_and_factors() {
        let f = Forecast::new("s", "k", date(), 10.0, (8.0, 13.0), 0.6, 0.4, DataSource::StoreSpecific)
            .unwrap()
            .with_factor("trend", 1.0);
        let g = f.scaled(1.5);
        assert_relative_eq!(g.predicted_demand(), 15.0);
        assert_eq!(g.interval(), (12.0, 19.5));
        assert_eq!(g.contributing_factors(), f.contributing_factors());
        assert_eq!(f.predicted_demand(), 10.0);
    }

    #[test]
    fn decoding_applies_the_same_clamps() {
        let json = r#"{
            "store_id": "s", "sku": "k", "target_date": "2024-06-01",
            "predicted_demand": 10.0, "confidence_lower": 14.0, "confidence_upper": 6.0,
            "confidence_score": 3.0, "data_sufficiency_score": 0.5,
            "data_source": "blended", "contributing_factors": {"trend": 1.1}
        }"#;
        let f: Forecast = serde_json::from_str(json).unwrap();
        assert_eq!(f.interval(), (10.0, 10.0));
        assert_relative_eq!(f.confidence_score(), 1.0);
        assert_relative_eq!(f.contributing_factors()["trend"], 1.1);

        let ok = Forecast::new("s", "k", date(), 4.0, (3.0, 5.0), 0.5, 0.5, DataSource::StoreSpecific)
            .unwrap()
            .with_factor("trend", 1.0);
        let back: Forecast = serde_json::from_str(&serde_json::to_string(&ok).unwrap()).unwrap();
        assert_eq!(back, ok);
    }

    #[test]
    fn data_source_tags_match_wire_names() {
        assert_eq!(DataSource::RegionalPrior.to_string(), "regional_prior");
        assert_eq!(serde_json::to_string(&DataSource::Blended).unwrap(), "\"blended\"");
    }
}
