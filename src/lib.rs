//! # Kirana Workspace
//!
//! Umbrella crate for the demand forecasting workspace.
//!
//! - [`demand_math`]: statistics, regression and geo helpers
//! - [`forecast_demand`]: regional priors, the per-SKU ensemble, event
//!   adjustment and weekly retraining
//!
//! ## Example
//!
//! ```
//! use kirana_workspace::forecast_demand::{data_sufficiency_score, transition_weight};
//!
//! assert_eq!(data_sufficiency_score(45), 0.5);
//! assert_eq!(transition_weight(45), 0.25);
//! ```

pub use demand_math;
pub use forecast_demand;

/// Workspace version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports_are_wired() {
        let a = demand_math::GeoPoint::new(18.5204, 73.8567);
        let b = a.offset_km(3.0, 4.0);
        assert!((a.distance_km(&b) - 5.0).abs() < 0.05);
        assert_eq!(forecast_demand::NAME, "forecast_demand");
    }
}
