//! Configuration for the forecasting core
//!
//! Every section deserializes with defaults, so a JSON file only needs to name
//! the values it overrides:
//!
//! ```rust
//! use forecast_demand::config::ForecastConfig;
//!
//! let config = ForecastConfig::from_json_str(r#"{ "events": { "impact_threshold": 0.7 } }"#).unwrap();
//! assert_eq!(config.events.impact_threshold, 0.7);
//! assert_eq!(config.prior.radius_km, 5.0);
//! ```

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub prior: PriorConfig,
    pub cache: CacheConfig,
    pub blend: BlendConfig,
    pub ensemble: EnsembleConfig,
    pub events: EventConfig,
    pub trainer: TrainerConfig,
    pub feeds: FeedConfig,
    pub runtime: RuntimeConfig,
}

/// Regional prior resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorConfig {
    /// Initial neighbourhood radius
    pub radius_km: f64,
    /// Radius used for the single expansion step
    pub expanded_radius_km: f64,
    /// Minimum contributing stores at any scope
    pub min_contributing_stores: usize,
    /// Floor on the median weight of a comparable store; never excludes one
    pub min_similarity: f64,
    /// Geographic weight of a store sitting exactly on the search radius
    pub edge_distance_weight: f64,
    /// Weight multiplier when urban/semi-urban/rural class differs
    pub locality_mismatch_factor: f64,
    /// Weight lost per size-category step of difference
    pub size_step_penalty: f64,
    /// Weight lost per income-bracket step of difference
    pub income_step_penalty: f64,
    /// Contributor count at which the count factor of confidence reaches 0.5
    pub confidence_half_count: f64,
    /// Days of own history a store needs before it contributes a pattern
    pub min_contributor_days: u32,
}

impl Default for PriorConfig {
    fn default() -> Self {
        Self {
            radius_km: 5.0,
            expanded_radius_km: 10.0,
            min_contributing_stores: 3,
            min_similarity: 0.2,
            edge_distance_weight: 0.5,
            locality_mismatch_factor: 0.4,
            size_step_penalty: 0.15,
            income_step_penalty: 0.1,
            confidence_half_count: 3.0,
            min_contributor_days: 14,
        }
    }
}

/// Regional prior cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 24 * 3600 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Low-data blending window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    /// Days below which only the regional prior is trusted
    pub transition_start_days: u32,
    /// Days at which the store model is fully trusted
    pub full_trust_days: u32,
    /// Band widening coefficient applied per unit of `(1 - w)`
    pub interval_widening: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            transition_start_days: 30,
            full_trust_days: 90,
            interval_widening: 0.5,
        }
    }
}

/// Gradient boosting hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 60,
            learning_rate: 0.1,
            max_depth: 2,
            min_samples_leaf: 5,
        }
    }
}

/// Hybrid ensemble behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// SKUs with fewer lifetime transactions fall back to the category prior
    pub min_sku_transactions: usize,
    /// Below this many days the moving average replaces the ensemble
    pub min_ensemble_days: u32,
    /// Days required before week-ahead forecasts are offered
    pub next_week_min_days: u32,
    /// Longest supported horizon
    pub max_horizon_days: u32,
    /// Held-out window used to weight ensemble members
    pub validation_days: usize,
    pub moving_average_window: usize,
    /// Two-sided coverage of the confidence band
    pub confidence_level: f64,
    /// Upper bound on horizon-driven band widening
    pub horizon_widening_cap: f64,
    /// Propagated lags are clamped to this multiple of the observed maximum
    pub lag_clamp_multiple: f64,
    /// Level smoothing factor of the holiday-aware decomposition
    pub holiday_level_alpha: f64,
    pub boosting: BoostingConfig,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            min_sku_transactions: 10,
            min_ensemble_days: 30,
            next_week_min_days: 90,
            max_horizon_days: 7,
            validation_days: 14,
            moving_average_window: 7,
            confidence_level: 0.9,
            horizon_widening_cap: 2.0,
            lag_clamp_multiple: 3.0,
            holiday_level_alpha: 0.2,
            boosting: BoostingConfig::default(),
        }
    }
}

/// Event-aware adjustment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Events farther than this from a store are never scored
    pub max_distance_km: f64,
    /// Only impact scores strictly above this alter a forecast
    pub impact_threshold: f64,
    /// Pseudo-observation count given to the default prior table
    pub prior_strength: f64,
    /// Multiplier mapped to an uplift score of 1.0
    pub max_uplift_multiplier: f64,
    /// Days before a bandh during which staples see stockpiling
    pub bandh_lead_days: u32,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            max_distance_km: 2.0,
            impact_threshold: 0.6,
            prior_strength: 3.0,
            max_uplift_multiplier: 2.0,
            bandh_lead_days: 2,
        }
    }
}

/// Retraining cadence and promotion policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    pub test_days: usize,
    /// A candidate may be at most this many MAPE points worse than live
    pub mape_tolerance_points: f64,
    pub retained_cycles: usize,
    pub cadence_days: i64,
    pub retry_delay_hours: i64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            test_days: 14,
            mape_tolerance_points: 5.0,
            retained_cycles: 12,
            cadence_days: 7,
            retry_delay_hours: 6,
        }
    }
}

/// External reference-data feeds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub fetch_timeout_ms: u64,
    pub event_feed_max_age_secs: u64,
    pub calendar_max_age_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 2_000,
            event_feed_max_age_secs: 6 * 3600,
            calendar_max_age_secs: 24 * 3600,
        }
    }
}

impl FeedConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Worker pool sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Threads in the batch forecasting pool; 0 lets rayon decide
    pub worker_threads: usize,
    /// Per-store latency budget; slower stores are logged
    pub store_budget_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            store_budget_ms: 5_000,
        }
    }
}

impl ForecastConfig {
    /// Parse a JSON document, filling unspecified values with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ForecastConfig =
            serde_json::from_str(json).map_err(|e| ForecastError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Set the batch worker pool size
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.runtime.worker_threads = threads;
        self
    }

    /// Set the prior cache time-to-live
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache.ttl_secs = ttl.as_secs();
        self
    }

    /// Set the event impact gate
    pub fn with_impact_threshold(mut self, threshold: f64) -> Self {
        self.events.impact_threshold = threshold;
        self
    }

    /// Reject internally inconsistent settings
    pub fn validate(&self) -> Result<()> {
        let p = &self.prior;
        if !(p.radius_km > 0.0) {
            return Err(ForecastError::ConfigError("prior.radius_km must be positive".into()));
        }
        if p.expanded_radius_km < p.radius_km {
            return Err(ForecastError::ConfigError(
                "prior.expanded_radius_km must not be smaller than prior.radius_km".into(),
            ));
        }
        if p.min_contributing_stores == 0 {
            return Err(ForecastError::ConfigError(
                "prior.min_contributing_stores must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&p.min_similarity)
            || !(0.0..=1.0).contains(&p.locality_mismatch_factor)
            || !(0.0..=1.0).contains(&p.edge_distance_weight)
        {
            return Err(ForecastError::ConfigError(
                "prior similarity factors must lie within [0, 1]".into(),
            ));
        }

        let b = &self.blend;
        if b.transition_start_days >= b.full_trust_days {
            return Err(ForecastError::ConfigError(
                "blend.transition_start_days must be below blend.full_trust_days".into(),
            ));
        }
        if b.interval_widening < 0.0 {
            return Err(ForecastError::ConfigError(
                "blend.interval_widening must be non-negative".into(),
            ));
        }

        let e = &self.ensemble;
        if !(e.confidence_level > 0.0 && e.confidence_level < 1.0) {
            return Err(ForecastError::ConfigError(
                "ensemble.confidence_level must be between 0 and 1".into(),
            ));
        }
        if e.moving_average_window == 0 || e.validation_days == 0 || e.max_horizon_days == 0 {
            return Err(ForecastError::ConfigError(
                "ensemble windows and horizon must be positive".into(),
            ));
        }
        if e.horizon_widening_cap < 1.0 {
            return Err(ForecastError::ConfigError(
                "ensemble.horizon_widening_cap must be at least 1".into(),
            ));
        }
        if e.boosting.n_estimators == 0 || !(e.boosting.learning_rate > 0.0) {
            return Err(ForecastError::ConfigError(
                "ensemble.boosting needs at least one estimator and a positive learning rate".into(),
            ));
        }

        let ev = &self.events;
        if !(ev.max_distance_km > 0.0) || !(0.0..1.0).contains(&ev.impact_threshold) {
            return Err(ForecastError::ConfigError(
                "events.max_distance_km must be positive and impact_threshold within [0, 1)".into(),
            ));
        }
        if ev.max_uplift_multiplier <= 1.0 {
            return Err(ForecastError::ConfigError(
                "events.max_uplift_multiplier must exceed 1".into(),
            ));
        }

        let t = &self.trainer;
        if t.test_days == 0 || t.retained_cycles == 0 || t.cadence_days <= 0 {
            return Err(ForecastError::ConfigError(
                "trainer windows and cadence must be positive".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_valid() {
        ForecastConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_document_yields_defaults() {
        let config = ForecastConfig::from_json_str("{}").unwrap();
        assert_eq!(config, ForecastConfig::default());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config =
            ForecastConfig::from_json_str(r#"{"prior": {"radius_km": 3.0}, "runtime": {"worker_threads": 8}}"#)
                .unwrap();
        assert_eq!(config.prior.radius_km, 3.0);
        assert_eq!(config.prior.expanded_radius_km, 10.0);
        assert_eq!(config.runtime.worker_threads, 8);
    }

    #[test]
    fn inconsistent_radius_rejected() {
        let err = ForecastConfig::from_json_str(r#"{"prior": {"radius_km": 12.0}}"#).unwrap_err();
        assert!(matches!(err, ForecastError::ConfigError(_)));
    }

    #[test]
    fn inverted_blend_window_rejected() {
        let mut config = ForecastConfig::default();
        config.blend.transition_start_days = 90;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_is_config_error() {
        let err = ForecastConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, ForecastError::ConfigError(_)));
    }

    #[test]
    fn builder_setters() {
        let config = ForecastConfig::default()
            .with_worker_threads(4)
            .with_cache_ttl(Duration::from_secs(60))
            .with_impact_threshold(0.5);
        assert_eq!(config.runtime.worker_threads, 4);
        assert_eq!(config.cache.ttl(), Duration::from_secs(60));
        assert_eq!(config.events.impact_threshold, 0.5);
    }
}
