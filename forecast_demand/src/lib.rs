//! # Forecast Demand
//!
//! Per-SKU demand forecasting for small retail stores with sparse, noisy
//! transaction histories.
//!
//! ## Features
//!
//! - Regional priors borrowed from comparable nearby stores, escalating from
//!   local to state to national scope
//! - A 30 to 90 day hand-over from the regional prior to the store's own model
//! - A per-SKU ensemble (trend/seasonal, gradient-boosted trees, holiday
//!   decomposition) weighted by held-out MAPE per category
//! - Festival, monsoon, salary-cycle and cricket context features
//! - Local event adjustment (matches, bandhs, rallies, weddings, exams)
//! - Weekly retraining with a held-out acceptance test and atomic promotion
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use forecast_demand::data::{AdminRegion, IncomeBracket, Locality, ProductCatalog, SizeCategory, Store};
//! use forecast_demand::feeds::{ReferenceFeeds, ReferenceSnapshot};
//! use forecast_demand::prior::DemandPattern;
//! use forecast_demand::{DataSource, ForecastConfig, ForecastPipeline, GeoPoint};
//!
//! # fn main() -> forecast_demand::Result<()> {
//! let config = ForecastConfig::default();
//! let catalog = ProductCatalog::new().with("parle-g-100g", "snacks");
//! let feeds = ReferenceFeeds::from_snapshot(config.feeds.clone(), ReferenceSnapshot::default());
//! let pipeline = ForecastPipeline::new(config, catalog, feeds)?;
//! pipeline.set_national_pattern("snacks", DemandPattern::flat(12.0));
//!
//! let store = Store::new(
//!     "pune-0042",
//!     GeoPoint::new(18.5204, 73.8567),
//!     AdminRegion::new("Maharashtra", "Pune", "411001"),
//!     Locality::Urban,
//!     SizeCategory::Small,
//!     IncomeBracket::LowerMiddle,
//! );
//! pipeline.register_store(store)?;
//!
//! // A brand-new store still gets a forecast from the regional prior.
//! let as_of = NaiveDate::from_ymd_opt(2024, 10, 1).unwrap();
//! let forecast = pipeline.forecast_next_day("pune-0042", "parle-g-100g", as_of)?;
//! assert_eq!(forecast.data_source(), DataSource::RegionalPrior);
//! assert!(forecast.confidence_lower() <= forecast.predicted_demand());
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod boundary;
pub mod config;
pub mod data;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod events;
pub mod features;
pub mod feeds;
pub mod forecast;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod prior;
pub mod reference;
pub mod synthetic;
pub mod trainer;

// Re-export commonly used types
pub use crate::bootstrap::{data_sufficiency_score, transition_weight, Bootstrapper};
pub use crate::boundary::{requires_zero_restock, AlertSnapshot, ForecastLedger};
pub use crate::config::ForecastConfig;
pub use crate::data::{ProductCatalog, SalesHistory, Store, Transaction};
pub use crate::engine::{HybridForecastEngine, ModelState, ModelStore};
pub use crate::error::{ForecastError, Result};
pub use crate::events::{Event, EventAdjuster, EventFeed, EventType, ImpactModel};
pub use crate::features::{ContextFeatureBuilder, ContextFeatures};
pub use crate::forecast::{DataSource, Forecast};
pub use crate::models::{ForecastModel, TrainedForecastModel};
pub use crate::pipeline::{ForecastPipeline, ForecastRequest};
pub use crate::prior::{DemandPattern, PriorScope, RegionalPrior, RegionalPriorEngine};
pub use crate::trainer::{CycleOutcome, RetrainingScheduler};
pub use demand_math::GeoPoint;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
