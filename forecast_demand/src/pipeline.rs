//! End-to-end forecast generation
//!
//! `regional prior -> store model -> blend -> event adjustment -> ledger`.
//! Stores are independent: every request reads its own store record, the
//! shared population snapshot and one reference snapshot, and never holds a
//! lock across stores.

use crate::boundary::{moving_average_30, AlertSnapshot, ForecastLedger};
use crate::bootstrap::Bootstrapper;
use crate::config::ForecastConfig;
use crate::data::{ProductCatalog, SalesHistory, SkuId, Store, StoreId, Transaction};
use crate::engine::{HybridForecastEngine, ModelStore, PredictionInput, TrainingSet};
use crate::error::{ForecastError, Result};
use crate::events::{EventAdjuster, EventPhase, EventType, ImpactModel};
use crate::features::{ContextFeatureBuilder, ContextFeatures};
use crate::feeds::ReferenceFeeds;
use crate::forecast::{DataSource, Forecast};
use crate::prior::{DemandPattern, PriorCache, PriorKey, RegionalPrior, RegionalPriorEngine, StorePopulation};
use crate::trainer::{CycleOutcome, RetrainingScheduler};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Base relative half-width of a regional-prior interval
const PRIOR_SPREAD_BASE: f64 = 0.25;
/// Extra relative half-width at zero prior confidence
const PRIOR_SPREAD_RANGE: f64 = 0.5;

/// A forecast request for one SKU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastRequest {
    pub store_id: StoreId,
    pub sku: SkuId,
    /// Last day of known history; forecasts start the day after
    pub as_of: NaiveDate,
    pub horizon_days: u32,
}

impl ForecastRequest {
    pub fn next_day(store_id: impl Into<StoreId>, sku: impl Into<SkuId>, as_of: NaiveDate) -> Self {
        Self {
            store_id: store_id.into(),
            sku: sku.into(),
            as_of,
            horizon_days: 1,
        }
    }

    pub fn next_week(store_id: impl Into<StoreId>, sku: impl Into<SkuId>, as_of: NaiveDate) -> Self {
        Self {
            horizon_days: 7,
            ..Self::next_day(store_id, sku, as_of)
        }
    }
}

#[derive(Debug, Clone)]
struct StoreRecord {
    store: Store,
    history: Arc<SalesHistory>,
}

/// Owns every component of the forecasting core
pub struct ForecastPipeline {
    config: ForecastConfig,
    catalog: RwLock<Arc<ProductCatalog>>,
    feeds: ReferenceFeeds,
    population: RwLock<Arc<StorePopulation>>,
    priors: RegionalPriorEngine,
    prior_cache: PriorCache,
    bootstrapper: Bootstrapper,
    stores: DashMap<StoreId, Arc<RwLock<StoreRecord>>>,
    engines: DashMap<StoreId, Arc<HybridForecastEngine>>,
    schedulers: DashMap<StoreId, Arc<Mutex<RetrainingScheduler>>>,
    impact: ImpactModel,
    adjuster: EventAdjuster,
    ledger: ForecastLedger,
    model_store: Option<ModelStore>,
    pool: ThreadPool,
}

impl ForecastPipeline {
    pub fn new(config: ForecastConfig, catalog: ProductCatalog, feeds: ReferenceFeeds) -> Result<Self> {
        config.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.runtime.worker_threads)
            .thread_name(|i| format!("forecast-worker-{}", i))
            .build()
            .map_err(|e| ForecastError::ConfigError(format!("worker pool: {}", e)))?;
        Ok(Self {
            catalog: RwLock::new(Arc::new(catalog)),
            feeds,
            population: RwLock::new(Arc::new(StorePopulation::new())),
            priors: RegionalPriorEngine::new(config.prior.clone()),
            prior_cache: PriorCache::new(config.cache.ttl()),
            bootstrapper: Bootstrapper::new(config.blend.clone()),
            stores: DashMap::new(),
            engines: DashMap::new(),
            schedulers: DashMap::new(),
            impact: ImpactModel::new(config.events.clone()),
            adjuster: EventAdjuster::new(config.events.clone()),
            ledger: ForecastLedger::new(),
            model_store: None,
            pool,
            config,
        })
    }

    /// Persist promoted model states and restore them on registration
    pub fn with_model_store(mut self, store: ModelStore) -> Self {
        self.model_store = Some(store);
        self
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn feeds(&self) -> &ReferenceFeeds {
        &self.feeds
    }

    pub fn ledger(&self) -> &ForecastLedger {
        &self.ledger
    }

    pub fn impact_model(&self) -> &ImpactModel {
        &self.impact
    }

    pub fn prior_cache(&self) -> &PriorCache {
        &self.prior_cache
    }

    pub fn catalog(&self) -> Arc<ProductCatalog> {
        Arc::clone(&self.catalog.read())
    }

    pub fn update_catalog(&self, catalog: ProductCatalog) {
        *self.catalog.write() = Arc::new(catalog);
    }

    pub fn population(&self) -> Arc<StorePopulation> {
        Arc::clone(&self.population.read())
    }

    pub fn engine(&self, store_id: &str) -> Option<Arc<HybridForecastEngine>> {
        self.engines.get(store_id).map(|e| Arc::clone(e.value()))
    }

    pub fn store(&self, store_id: &str) -> Option<Store> {
        self.stores.get(store_id).map(|r| r.read().store.clone())
    }

    /// Add a store to the roster and to the comparison population
    ///
    /// Registering a known id updates its attributes and keeps its history,
    /// trained model and retraining schedule.
    pub fn register_store(&self, store: Store) -> Result<()> {
        store.validate()?;
        if let Ok(existing) = self.record(&store.id) {
            return self.update_registration(&existing, store);
        }
        let state = match &self.model_store {
            Some(models) => models.load(&store.id)?,
            None => None,
        };
        let engine = match state {
            Some(state) => HybridForecastEngine::with_state(self.config.ensemble.clone(), state)?,
            None => HybridForecastEngine::new(self.config.ensemble.clone(), store.id.clone())?,
        };
        self.engines.insert(store.id.clone(), Arc::new(engine));
        self.schedulers.insert(
            store.id.clone(),
            Arc::new(Mutex::new(RetrainingScheduler::new(self.config.trainer.clone()))),
        );
        self.update_population(|p| p.upsert_store(store.clone(), Default::default()));
        debug!(store_id = %store.id, state = %store.region.state, "registered store");
        self.stores.insert(
            store.id.clone(),
            Arc::new(RwLock::new(StoreRecord {
                store,
                history: Arc::new(SalesHistory::new()),
            })),
        );
        Ok(())
    }

    fn update_registration(&self, shared: &RwLock<StoreRecord>, mut store: Store) -> Result<()> {
        {
            let mut record = shared.write();
            store.active_skus.extend(record.store.active_skus.iter().cloned());
            store.observe_history_days(record.store.days_of_data().max(record.history.days_of_data()));
            record.store = store.clone();
        }
        debug!(
            store_id = %store.id,
            days_of_data = store.days_of_data(),
            "updated registered store"
        );
        self.update_population(|p| p.update_store(store));
        Ok(())
    }

    /// Seed the national fallback pattern of a category
    pub fn set_national_pattern(&self, category: &str, pattern: DemandPattern) {
        self.update_population(|p| p.set_national_pattern(category, pattern));
    }

    fn update_population<F: FnOnce(&mut StorePopulation)>(&self, mutate: F) {
        let mut guard = self.population.write();
        let mut next = (**guard).clone();
        mutate(&mut next);
        *guard = Arc::new(next);
    }

    /// Append transactions to one store; all rows are validated first
    ///
    /// Returns the store's days of data afterwards.
    pub fn record_transactions(&self, store_id: &str, transactions: &[Transaction]) -> Result<u32> {
        for tx in transactions {
            tx.validate()?;
        }
        let shared = self.record(store_id)?;
        let mut guard = shared.write();
        let record = &mut *guard;
        let history = Arc::make_mut(&mut record.history);
        for tx in transactions {
            history.record(tx)?;
            if !record.store.active_skus.contains(&tx.sku) {
                record.store.active_skus.insert(tx.sku.clone());
            }
        }
        let days = record.history.days_of_data();
        record.store.observe_history_days(days);
        Ok(record.store.days_of_data())
    }

    fn record(&self, store_id: &str) -> Result<Arc<RwLock<StoreRecord>>> {
        self.stores
            .get(store_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| ForecastError::UnknownStore(store_id.to_string()))
    }

    fn read_record(&self, store_id: &str) -> Result<(Store, Arc<SalesHistory>)> {
        let record = self.record(store_id)?;
        let record = record.read();
        Ok((record.store.clone(), Arc::clone(&record.history)))
    }

    /// Re-estimate every store's category patterns and publish a new population
    ///
    /// Cached priors computed against the previous population are recomputed on
    /// next use. Returns the new generation.
    pub fn refresh_population(&self) -> Result<u64> {
        let builder = ContextFeatureBuilder::new(self.feeds.snapshot());
        let catalog = self.catalog();
        let records: Vec<(Store, Arc<SalesHistory>)> = self
            .stores
            .iter()
            .map(|r| {
                let record = r.value().read();
                (record.store.clone(), Arc::clone(&record.history))
            })
            .collect();
        let min_days = self.config.prior.min_contributor_days;

        let mut next = (*self.population()).clone();
        for (store, history) in records {
            next.observe_store(store, &history, &catalog, &builder, min_days)?;
        }
        let generation = next.generation();
        *self.population.write() = Arc::new(next);
        debug!(generation, stores = self.stores.len(), "published store population");
        Ok(generation)
    }

    /// Resolve (or reuse) the regional prior for a store and category
    pub fn regional_prior(&self, store: &Store, category: &str) -> Result<Arc<RegionalPrior>> {
        let population = self.population();
        let radius = self.config.prior.radius_km;
        let key = PriorKey::for_store(store, category, radius, &population);
        self.prior_cache.get_or_compute(&key, population.generation(), || {
            self.priors
                .calculate_regional_prior(&population, &key.anchor(store), category, radius)
        })
    }

    /// Run a retraining cycle for every store that is due at `now`
    pub fn run_retraining(&self, now: DateTime<Utc>) -> Vec<(StoreId, CycleOutcome)> {
        let due: Vec<StoreId> = self
            .schedulers
            .iter()
            .filter(|s| s.value().lock().is_due(now))
            .map(|s| s.key().clone())
            .collect();
        self.pool.install(|| {
            due.par_iter()
                .filter_map(|id| self.retrain_store(id, now).map(|outcome| (id.clone(), outcome)))
                .collect()
        })
    }

    fn retrain_store(&self, store_id: &str, now: DateTime<Utc>) -> Option<CycleOutcome> {
        let engine = self.engine(store_id)?;
        let scheduler = self.schedulers.get(store_id).map(|s| Arc::clone(s.value()))?;
        let (store, history) = self.read_record(store_id).ok()?;
        let builder = ContextFeatureBuilder::new(self.feeds.snapshot());
        let end = history.last_date().unwrap_or_else(|| now.date_naive());
        let mut scheduler = scheduler.lock();
        let data = match TrainingSet::from_history(&store, &history, &self.catalog(), &builder, end) {
            Ok(data) => data,
            Err(e) => {
                warn!(store_id = %store_id, error = %e, "could not assemble training data");
                TrainingSet {
                    store_id: store.id.clone(),
                    days_of_data: store.days_of_data(),
                    skus: Vec::new(),
                }
            }
        };
        let outcome = scheduler.run_cycle(&engine, &data, now);
        if let (CycleOutcome::Promoted { .. }, Some(models)) = (&outcome, &self.model_store) {
            if let Err(e) = models.save(&engine.snapshot()) {
                warn!(store_id = %store_id, error = %e, "could not persist promoted model state");
            }
        }
        Some(outcome)
    }

    pub fn forecast_next_day(&self, store_id: &str, sku: &str, as_of: NaiveDate) -> Result<Forecast> {
        let mut days = self.forecast(&ForecastRequest::next_day(store_id, sku, as_of))?;
        days.pop()
            .ok_or_else(|| ForecastError::ForecastingError("empty next-day forecast".to_string()))
    }

    pub fn forecast_next_week(&self, store_id: &str, sku: &str, as_of: NaiveDate) -> Result<Vec<Forecast>> {
        self.forecast(&ForecastRequest::next_week(store_id, sku, as_of))
    }

    /// Produce one forecast per target day of `request`
    pub fn forecast(&self, request: &ForecastRequest) -> Result<Vec<Forecast>> {
        let started = Instant::now();
        let max = self.config.ensemble.max_horizon_days;
        if request.horizon_days == 0 || request.horizon_days > max {
            return Err(ForecastError::validation(format!(
                "horizon must be between 1 and {} days, got {}",
                max, request.horizon_days
            )));
        }
        let (store, history) = self.read_record(&request.store_id)?;
        let catalog = self.catalog();
        let category = catalog
            .category_of(&request.sku)
            .ok_or_else(|| ForecastError::UnknownSku(request.sku.clone()))?
            .to_string();
        let days_of_data = store.days_of_data();
        if request.horizon_days > 1 && days_of_data < self.config.ensemble.next_week_min_days {
            return Err(ForecastError::HorizonNotSupported {
                requested: request.horizon_days,
                days_of_data,
                required: self.config.ensemble.next_week_min_days,
            });
        }

        let snapshot = self.feeds.snapshot();
        let builder = ContextFeatureBuilder::new(snapshot.clone());
        let horizon: Vec<ContextFeatures> = (1..=i64::from(request.horizon_days))
            .map(|i| builder.build(&store, request.as_of + Duration::days(i)))
            .collect();

        let prior = self.regional_prior(&store, &category)?;
        let share = self.sku_share(&store, &history, &catalog, &request.sku, &category);
        let pattern = prior.pattern.scaled(share);

        let observed: Vec<f64> = match history.first_date() {
            Some(first) if first <= request.as_of => history
                .sku_daily(&request.sku, first, request.as_of)
                .into_iter()
                .map(|(_, v)| v)
                .collect(),
            _ => Vec::new(),
        };
        let own = self.store_forecasts(&request.store_id, &request.sku, days_of_data, &observed, &horizon, request.horizon_days)?;

        let mut out = Vec::with_capacity(horizon.len());
        for (i, features) in horizon.iter().enumerate() {
            let regional = self.regional_forecast(&store, &request.sku, features, &pattern, &prior, share, days_of_data)?;
            let blended = self
                .bootstrapper
                .blend(&regional, own.as_ref().and_then(|o| o.get(i)), days_of_data)?;
            let adjusted = match &snapshot.events {
                Some(feed) => {
                    let scored = self.adjuster.score_day(
                        feed,
                        &store,
                        &category,
                        features,
                        Some(&prior.pattern),
                        &self.impact,
                    );
                    self.adjuster.adjust_forecast(&blended, &scored)
                }
                None => {
                    debug!(store_id = %store.id, "no event feed, skipping event adjustment");
                    blended
                }
            };
            self.ledger.record(adjusted.clone());
            out.push(adjusted);
        }

        let elapsed = started.elapsed();
        if elapsed.as_millis() as u64 > self.config.runtime.store_budget_ms {
            warn!(
                store_id = %store.id,
                sku = %request.sku,
                elapsed_ms = elapsed.as_millis() as u64,
                "forecast exceeded latency budget"
            );
        }
        Ok(out)
    }

    fn store_forecasts(
        &self,
        store_id: &str,
        sku: &str,
        days_of_data: u32,
        observed: &[f64],
        horizon: &[ContextFeatures],
        days: u32,
    ) -> Result<Option<Vec<Forecast>>> {
        let Some(engine) = self.engine(store_id) else {
            return Ok(None);
        };
        let input = PredictionInput {
            store_id,
            sku,
            days_of_data,
            history: observed,
            horizon,
        };
        match engine.predict_horizon(&input, days) {
            Ok(forecasts) => Ok(forecasts),
            Err(e) if e.is_validation() => Err(e),
            Err(e) => {
                warn!(store_id = %store_id, sku = %sku, error = %e, "store model failed, using regional prior");
                Ok(None)
            }
        }
    }

    /// The SKU's share of its category at this store
    ///
    /// Falls back to an even split across the category's active SKUs.
    fn sku_share(&self, store: &Store, history: &SalesHistory, catalog: &ProductCatalog, sku: &str, category: &str) -> f64 {
        if let Some(share) = history.category_share(catalog, sku) {
            return share;
        }
        let mut skus: Vec<&SkuId> = store.active_skus.iter().chain(history.skus()).collect();
        skus.sort();
        skus.dedup();
        let peers = catalog.skus_in(category, skus).len().max(1);
        1.0 / peers as f64
    }

    #[allow(clippy::too_many_arguments)]
    fn regional_forecast(
        &self,
        store: &Store,
        sku: &str,
        features: &ContextFeatures,
        pattern: &DemandPattern,
        prior: &RegionalPrior,
        share: f64,
        days_of_data: u32,
    ) -> Result<Forecast> {
        let expected = pattern.expected_demand(features);
        let spread = PRIOR_SPREAD_BASE + PRIOR_SPREAD_RANGE * (1.0 - prior.confidence);
        Ok(Forecast::new(
            store.id.clone(),
            sku,
            features.date,
            expected,
            (expected * (1.0 - spread), expected * (1.0 + spread)),
            prior.confidence,
            self.bootstrapper.sufficiency(days_of_data),
            DataSource::RegionalPrior,
        )?
        .with_factor("prior_contributors", prior.contributing_stores as f64)
        .with_factor("prior_confidence", prior.confidence)
        .with_factor("sku_share", share))
    }

    /// Next-day forecasts for every active SKU of one store
    ///
    /// SKUs that cannot be forecast (e.g. missing from the catalog) are skipped.
    pub fn forecast_store(&self, store_id: &str, as_of: NaiveDate) -> Result<Vec<Forecast>> {
        let store = self.store(store_id).ok_or_else(|| ForecastError::UnknownStore(store_id.to_string()))?;
        let mut out = Vec::with_capacity(store.active_skus.len());
        for sku in &store.active_skus {
            match self.forecast_next_day(store_id, sku, as_of) {
                Ok(f) => out.push(f),
                Err(ForecastError::UnknownSku(_)) => {
                    debug!(store_id = %store_id, sku = %sku, "SKU not in catalog");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Forecast many requests in parallel on the worker pool, in input order
    pub fn forecast_batch(&self, requests: &[ForecastRequest]) -> Vec<Result<Vec<Forecast>>> {
        self.pool
            .install(|| requests.par_iter().map(|r| self.forecast(r)).collect())
    }

    /// Next-day forecasts of every store, in parallel
    pub fn forecast_all_stores(&self, as_of: NaiveDate) -> Vec<(StoreId, Result<Vec<Forecast>>)> {
        let mut ids: Vec<StoreId> = self.stores.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        self.pool.install(|| {
            ids.into_par_iter()
                .map(|id| {
                    let result = self.forecast_store(&id, as_of);
                    (id, result)
                })
                .collect()
        })
    }

    /// Next-day forecast plus the 30-day moving average, for spike alerts
    pub fn alert_snapshot(&self, store_id: &str, sku: &str, as_of: NaiveDate) -> Result<AlertSnapshot> {
        let forecast = self.forecast_next_day(store_id, sku, as_of)?;
        let (_, history) = self.read_record(store_id)?;
        Ok(AlertSnapshot {
            store_id: store_id.to_string(),
            sku: sku.to_string(),
            moving_average_30: moving_average_30(&history, sku, forecast.target_date()),
            forecast,
        })
    }

    /// Feed a realised event outcome back into the impact model
    pub fn record_event_outcome(
        &self,
        event_type: EventType,
        phase: EventPhase,
        category: &str,
        distance_km: f64,
        observed_multiplier: f64,
    ) -> Result<()> {
        self.impact
            .record_outcome(event_type, phase, category, distance_km, observed_multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::test_support::store_at;
    use crate::feeds::ReferenceSnapshot;
    use crate::synthetic::{generate_history, to_transactions};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn pipeline() -> ForecastPipeline {
        let catalog = ProductCatalog::new().with("chips", "snacks").with("namkeen", "snacks");
        let feeds = ReferenceFeeds::from_snapshot(Default::default(), ReferenceSnapshot::default());
        let config = ForecastConfig::default().with_worker_threads(2);
        let p = ForecastPipeline::new(config, catalog, feeds).unwrap();
        p.set_national_pattern("snacks", DemandPattern::flat(20.0));
        p
    }

    #[test]
    fn new_store_gets_a_prior_forecast() {
        let p = pipeline();
        p.register_store(store_at("s1", 19.07, 72.87).with_skus(["chips", "namkeen"])).unwrap();
        let f = p.forecast_next_day("s1", "chips", day(2024, 3, 1)).unwrap();
        assert_eq!(f.data_source(), DataSource::RegionalPrior);
        assert_eq!(f.target_date(), day(2024, 3, 2));
        // Even split of the national level across two snack SKUs.
        assert!((f.predicted_demand() - 10.0).abs() < 1e-9);
        assert_eq!(p.ledger().len(), 1);
    }

    #[test]
    fn unknown_inputs_are_rejected() {
        let p = pipeline();
        p.register_store(store_at("s1", 19.07, 72.87)).unwrap();
        let d = day(2024, 3, 1);
        assert!(matches!(p.forecast_next_day("nope", "chips", d), Err(ForecastError::UnknownStore(_))));
        assert!(matches!(p.forecast_next_day("s1", "soap", d), Err(ForecastError::UnknownSku(_))));
        let err = p.forecast_next_week("s1", "chips", d).unwrap_err();
        assert!(matches!(err, ForecastError::HorizonNotSupported { .. }));
        let mut request = ForecastRequest::next_day("s1", "chips", d);
        request.horizon_days = 8;
        assert!(p.forecast(&request).unwrap_err().is_validation());
    }

    #[test]
    fn trained_store_blends_toward_its_model() {
        let p = pipeline();
        p.register_store(store_at("s1", 19.07, 72.87)).unwrap();
        let series = generate_history(&DemandPattern::flat(30.0), day(2024, 1, 1), 60, 11).unwrap();
        let days = p.record_transactions("s1", &to_transactions(&series, "chips", 10.0)).unwrap();
        assert_eq!(days, 60);

        let now = Utc::now();
        let outcomes = p.run_retraining(now);
        assert!(matches!(outcomes[0].1, CycleOutcome::Promoted { .. }));

        let f = p.forecast_next_day("s1", "chips", series.last_date().unwrap()).unwrap();
        assert_eq!(f.data_source(), DataSource::Blended);
        assert!((f.contributing_factors()["transition_weight"] - 0.5).abs() < 1e-12);
    }
}
