//! Low-data bootstrapping: blending regional and store-specific forecasts

use crate::config::BlendConfig;
use crate::error::{ForecastError, Result};
use crate::forecast::{DataSource, Forecast};
use tracing::debug;

/// Days of history at which own data is fully trusted
pub const FULL_SUFFICIENCY_DAYS: u32 = 90;
/// Days of history before any store-specific model is trusted
pub const TRANSITION_START_DAYS: u32 = 30;

/// `min(days / 90, 1)`
pub fn data_sufficiency_score(days_of_data: u32) -> f64 {
    sufficiency_over(days_of_data, FULL_SUFFICIENCY_DAYS)
}

/// Blend weight on the store model: 0 before 30 days, linear to 1 at 90
pub fn transition_weight(days_of_data: u32) -> f64 {
    weight_over(days_of_data, TRANSITION_START_DAYS, FULL_SUFFICIENCY_DAYS)
}

fn sufficiency_over(days: u32, full: u32) -> f64 {
    if full == 0 {
        return 1.0;
    }
    (f64::from(days) / f64::from(full)).min(1.0)
}

fn weight_over(days: u32, start: u32, full: u32) -> f64 {
    if days < start {
        return 0.0;
    }
    if full <= start {
        return 1.0;
    }
    (f64::from(days - start) / f64::from(full - start)).clamp(0.0, 1.0)
}

/// Combines the regional prior forecast with the store model's
#[derive(Debug, Clone, Default)]
pub struct Bootstrapper {
    config: BlendConfig,
}

impl Bootstrapper {
    pub fn new(config: BlendConfig) -> Self {
        Self { config }
    }

    pub fn sufficiency(&self, days_of_data: u32) -> f64 {
        sufficiency_over(days_of_data, self.config.full_trust_days)
    }

    pub fn weight(&self, days_of_data: u32) -> f64 {
        weight_over(
            days_of_data,
            self.config.transition_start_days,
            self.config.full_trust_days,
        )
    }

    /// Blend `regional` and `store_specific` by the transition weight
    ///
    /// Without a store-specific forecast the weight drops to 0. Interval gaps
    /// on either side of the blended point are widened by
    /// `1 + interval_widening * (1 - w)`.
    pub fn blend(&self, regional: &Forecast, store_specific: Option<&Forecast>, days_of_data: u32) -> Result<Forecast> {
        if let Some(own) = store_specific {
            if own.sku() != regional.sku() || own.target_date() != regional.target_date() {
                return Err(ForecastError::ForecastingError(format!(
                    "cannot blend forecasts for {}@{} and {}@{}",
                    regional.sku(),
                    regional.target_date(),
                    own.sku(),
                    own.target_date()
                )));
            }
        }

        let scheduled = self.weight(days_of_data);
        let (w, own) = match store_specific {
            Some(own) => (scheduled, own),
            None => {
                if scheduled > 0.0 {
                    debug!(
                        store_id = %regional.store_id(),
                        sku = %regional.sku(),
                        scheduled_weight = scheduled,
                        "no store-specific forecast, using regional prior only"
                    );
                }
                (0.0, regional)
            }
        };

        let mix = |r: f64, s: f64| (1.0 - w) * r + w * s;
        let predicted = mix(regional.predicted_demand(), own.predicted_demand());
        let lower_gap = predicted - mix(regional.confidence_lower(), own.confidence_lower());
        let upper_gap = mix(regional.confidence_upper(), own.confidence_upper()) - predicted;
        let widening = 1.0 + self.config.interval_widening * (1.0 - w);

        let source = if w <= 0.0 {
            DataSource::RegionalPrior
        } else if w >= 1.0 {
            DataSource::StoreSpecific
        } else {
            DataSource::Blended
        };

        let mut factors = regional.contributing_factors().clone();
        if w > 0.0 {
            factors.extend(
                own.contributing_factors()
                    .iter()
                    .map(|(k, v)| (k.clone(), *v)),
            );
            factors.insert("store_model_estimate".to_string(), own.predicted_demand());
        }
        factors.insert("regional_estimate".to_string(), regional.predicted_demand());
        factors.insert("transition_weight".to_string(), w);

        Ok(Forecast::new(
            regional.store_id(),
            regional.sku(),
            regional.target_date(),
            predicted,
            (
                predicted - lower_gap.max(0.0) * widening,
                predicted + upper_gap.max(0.0) * widening,
            ),
            mix(regional.confidence_score(), own.confidence_score()),
            self.sufficiency(days_of_data),
            source,
        )?
        .with_factors(factors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use rstest::rstest;

    fn forecast(predicted: f64, lower: f64, upper: f64, source: DataSource) -> Forecast {
        let date = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        Forecast::new("s1", "atta-5kg", date, predicted, (lower, upper), 0.5, 0.5, source).unwrap()
    }

    #[rstest]
    #[case(0, 0.0)]
    #[case(45, 0.5)]
    #[case(90, 1.0)]
    #[case(400, 1.0)]
    fn sufficiency_score(#[case] days: u32, #[case] expected: f64) {
        assert_relative_eq!(data_sufficiency_score(days), expected);
    }

    #[rstest]
    #[case(0, 0.0)]
    #[case(29, 0.0)]
    #[case(30, 0.0)]
    #[case(45, 0.25)]
    #[case(60, 0.5)]
    #[case(90, 1.0)]
    #[case(120, 1.0)]
    fn transition_window(#[case] days: u32, #[case] expected: f64) {
        assert_relative_eq!(transition_weight(days), expected);
    }

    #[test]
    fn forty_five_days_blend_uses_quarter_weight() {
        let regional = forecast(20.0, 10.0, 30.0, DataSource::RegionalPrior);
        let own = forecast(40.0, 36.0, 44.0, DataSource::StoreSpecific);
        let blended = Bootstrapper::default().blend(&regional, Some(&own), 45).unwrap();

        assert_relative_eq!(blended.predicted_demand(), 0.75 * 20.0 + 0.25 * 40.0);
        assert_eq!(blended.data_source(), DataSource::Blended);
        assert_relative_eq!(blended.contributing_factors()["transition_weight"], 0.25);
        assert_relative_eq!(blended.data_sufficiency_score(), 0.5);

        // Raw gaps of 8.5 on each side widened by 1 + 0.5 * 0.75.
        let gap = 8.5 * 1.375;
        assert_relative_eq!(blended.confidence_lower(), 25.0 - gap, epsilon = 1e-9);
        assert_relative_eq!(blended.confidence_upper(), 25.0 + gap, epsilon = 1e-9);
    }

    #[test]
    fn tags_follow_the_weight() {
        let regional = forecast(20.0, 10.0, 30.0, DataSource::RegionalPrior);
        let own = forecast(40.0, 36.0, 44.0, DataSource::StoreSpecific);
        let b = Bootstrapper::default();

        let early = b.blend(&regional, Some(&own), 10).unwrap();
        assert_eq!(early.data_source(), DataSource::RegionalPrior);
        assert_relative_eq!(early.predicted_demand(), 20.0);

        let mature = b.blend(&regional, Some(&own), 90).unwrap();
        assert_eq!(mature.data_source(), DataSource::StoreSpecific);
        assert_relative_eq!(mature.predicted_demand(), 40.0);
        assert_relative_eq!(mature.interval_width(), 8.0, epsilon = 1e-9);
    }

    #[test]
    fn missing_store_forecast_falls_back_to_regional() {
        let regional = forecast(20.0, 10.0, 30.0, DataSource::RegionalPrior);
        let blended = Bootstrapper::default().blend(&regional, None, 75).unwrap();
        assert_eq!(blended.data_source(), DataSource::RegionalPrior);
        assert_relative_eq!(blended.predicted_demand(), 20.0);
        assert_relative_eq!(blended.confidence_upper(), 35.0, epsilon = 1e-9);
    }

    #[test]
    fn mismatched_forecasts_are_rejected() {
        let regional = forecast(20.0, 10.0, 30.0, DataSource::RegionalPrior);
        let other_day = Forecast::new(
            "s1",
            "atta-5kg",
            NaiveDate::from_ymd_opt(2024, 7, 2).unwrap(),
            1.0,
            (0.0, 2.0),
            0.5,
            0.5,
            DataSource::StoreSpecific,
        )
        .unwrap();
        assert!(Bootstrapper::default().blend(&regional, Some(&other_day), 60).is_err());
    }
}
