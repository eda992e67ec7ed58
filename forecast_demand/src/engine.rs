//! Hybrid forecasting engine
//!
//! Owns the live [`ModelState`] of one store behind a swappable `Arc`.
//! Candidates are trained off to the side by [`HybridForecastEngine::train_candidate`]
//! and only replace the live state through [`HybridForecastEngine::promote`].

use crate::bootstrap::data_sufficiency_score;
use crate::config::EnsembleConfig;
use crate::data::{DemandSeries, ProductCatalog, SalesHistory, SkuId, Store, StoreId};
use crate::ensemble::{combine, EnsembleModel, ResidualProfile, WeightTable};
use crate::error::{ForecastError, Result};
use crate::features::{ContextFeatureBuilder, ContextFeatures};
use crate::forecast::{DataSource, Forecast};
use crate::metrics::forecast_accuracy;
use crate::models::{
    walk_forward, DayContext, ForecastModel, MemberModel, MemberSpecs, MovingAverageFallback,
    TrainedForecastModel, TrainedMovingAverage, ENSEMBLE_MEMBERS, MEMBER_COUNT,
};
use chrono::NaiveDate;
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Smallest validation window used when choosing combination weights
const MIN_VALIDATION_DAYS: usize = 3;

/// Held-out accuracy of a model state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub mape: f64,
    pub rmse: f64,
    /// Number of SKU-days scored
    pub evaluated_days: usize,
}

/// The trained model of one SKU
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SkuModel {
    /// Full three-member ensemble
    Ensemble { category: String, model: EnsembleModel },
    /// Short store history
    MovingAverage { category: String, model: TrainedMovingAverage },
    /// Too few transactions; the category's regional prior stands in
    CategoryPrior { category: String },
}

impl SkuModel {
    pub fn category(&self) -> &str {
        match self {
            SkuModel::Ensemble { category, .. }
            | SkuModel::MovingAverage { category, .. }
            | SkuModel::CategoryPrior { category } => category,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SkuModel::Ensemble { .. } => "ensemble",
            SkuModel::MovingAverage { .. } => "moving_average",
            SkuModel::CategoryPrior { .. } => "category_prior",
        }
    }
}

/// Every trained parameter of one store, replaced as a whole
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub version: u64,
    pub store_id: StoreId,
    pub trained_through: Option<NaiveDate>,
    pub skus: BTreeMap<SkuId, SkuModel>,
    pub weights: WeightTable,
    pub metrics: Option<ModelMetrics>,
}

impl ModelState {
    /// State of a store that has never been trained
    pub fn untrained(store_id: impl Into<StoreId>) -> Self {
        Self {
            version: 0,
            store_id: store_id.into(),
            trained_through: None,
            skus: BTreeMap::new(),
            weights: WeightTable::default(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ModelMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn is_trained(&self) -> bool {
        self.trained_through.is_some()
    }

    pub fn sku(&self, sku: &str) -> Option<&SkuModel> {
        self.skus.get(sku)
    }
}

/// Training inputs for one SKU
#[derive(Debug, Clone, PartialEq)]
pub struct SkuTrainingData {
    pub sku: SkuId,
    pub category: String,
    pub series: DemandSeries,
    /// Lifetime transaction count
    pub transactions: usize,
}

/// Training inputs for one store
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSet {
    pub store_id: StoreId,
    pub days_of_data: u32,
    pub skus: Vec<SkuTrainingData>,
}

impl TrainingSet {
    /// Zero-filled series for every catalogued SKU of `store`, through `end`
    pub fn from_history(
        store: &Store,
        history: &SalesHistory,
        catalog: &ProductCatalog,
        builder: &ContextFeatureBuilder,
        end: NaiveDate,
    ) -> Result<Self> {
        let mut skus = Vec::new();
        if let Some(start) = history.first_date().filter(|s| *s <= end) {
            let mut ids: Vec<&SkuId> = store.active_skus.iter().chain(history.skus()).collect();
            ids.sort();
            ids.dedup();
            for sku in ids {
                let Some(category) = catalog.category_of(sku) else {
                    debug!(store_id = %store.id, sku = %sku, "SKU has no category, skipping");
                    continue;
                };
                let rows = history.sku_daily(sku, start, end);
                skus.push(SkuTrainingData {
                    sku: sku.clone(),
                    category: category.to_string(),
                    series: DemandSeries::from_daily(&rows, builder, store)?,
                    transactions: history.transaction_count(sku),
                });
            }
        }
        Ok(Self {
            store_id: store.id.clone(),
            days_of_data: store.days_of_data().max(history.days_of_data()),
            skus,
        })
    }

    /// The same set with the final `days` rows of every series removed
    ///
    /// SKUs with no more than `days` rows are dropped.
    pub fn without_tail(&self, days: usize) -> Result<Self> {
        let mut skus = Vec::with_capacity(self.skus.len());
        for data in &self.skus {
            if data.series.len() <= days {
                continue;
            }
            let (head, _) = data.series.split_tail(days)?;
            skus.push(SkuTrainingData {
                series: head,
                ..data.clone()
            });
        }
        Ok(Self {
            store_id: self.store_id.clone(),
            days_of_data: self.days_of_data.saturating_sub(days as u32),
            skus,
        })
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.skus.iter().filter_map(|s| s.series.last_date()).max()
    }
}

/// What the engine needs to forecast one SKU forward
#[derive(Debug, Clone, Copy)]
pub struct PredictionInput<'a> {
    pub store_id: &'a str,
    pub sku: &'a str,
    pub days_of_data: u32,
    /// Observed daily demand before the first target day, oldest first
    pub history: &'a [f64],
    /// Context of each target day, in order
    pub horizon: &'a [ContextFeatures],
}

/// Validation evidence for one ensemble SKU, gathered before weights exist
struct Evidence {
    category: String,
    member_predictions: [Vec<f64>; MEMBER_COUNT],
    member_mape: [f64; MEMBER_COUNT],
    actual: Vec<f64>,
    members: Vec<MemberModel>,
}

enum Plan {
    Prior { category: String },
    Average { category: String, model: TrainedMovingAverage },
    Ensemble(Box<Evidence>),
}

/// Maintains, trains and evaluates the per-SKU models of one store
#[derive(Debug)]
pub struct HybridForecastEngine {
    config: EnsembleConfig,
    specs: MemberSpecs,
    z: f64,
    live: RwLock<Arc<ModelState>>,
}

impl HybridForecastEngine {
    pub fn new(config: EnsembleConfig, store_id: impl Into<StoreId>) -> Result<Self> {
        Self::with_state(config, ModelState::untrained(store_id))
    }

    /// Engine whose live state is `state`, e.g. one loaded from a [`ModelStore`]
    pub fn with_state(config: EnsembleConfig, state: ModelState) -> Result<Self> {
        if !(config.confidence_level > 0.0 && config.confidence_level < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "Confidence level must be in (0, 1), got {}",
                config.confidence_level
            )));
        }
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| ForecastError::InvalidParameter(e.to_string()))?;
        let z = normal.inverse_cdf(0.5 + config.confidence_level / 2.0);
        Ok(Self {
            specs: MemberSpecs::from_config(&config)?,
            config,
            z,
            live: RwLock::new(Arc::new(state)),
        })
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Two-sided normal quantile for the configured confidence level
    pub fn z_value(&self) -> f64 {
        self.z
    }

    /// The live state; holding it keeps that version alive across a promotion
    pub fn snapshot(&self) -> Arc<ModelState> {
        Arc::clone(&self.live.read())
    }

    /// Atomically replace the live state, returning the previous one
    pub fn promote(&self, state: ModelState) -> Arc<ModelState> {
        let next = Arc::new(state);
        let mut live = self.live.write();
        info!(
            store_id = %next.store_id,
            from_version = live.version,
            to_version = next.version,
            "Promoting model state"
        );
        std::mem::replace(&mut *live, next)
    }

    /// Train a complete candidate state without touching the live one
    pub fn train_candidate(&self, data: &TrainingSet) -> Result<ModelState> {
        let trained_through = data.last_date().ok_or_else(|| {
            ForecastError::TrainingError(format!("store '{}' has no history to train on", data.store_id))
        })?;

        let plans: Vec<(SkuId, Plan)> = data
            .skus
            .par_iter()
            .map(|sku| Ok((sku.sku.clone(), self.plan_sku(sku, data.days_of_data)?)))
            .collect::<Result<_>>()?;

        let mut errors: BTreeMap<String, Vec<[f64; MEMBER_COUNT]>> = BTreeMap::new();
        for (_, plan) in &plans {
            if let Plan::Ensemble(evidence) = plan {
                errors
                    .entry(evidence.category.clone())
                    .or_default()
                    .push(evidence.member_mape);
            }
        }
        let weights = WeightTable::from_member_errors(&errors);

        let mut skus = BTreeMap::new();
        for (sku, plan) in plans {
            let model = match plan {
                Plan::Prior { category } => SkuModel::CategoryPrior { category },
                Plan::Average { category, model } => SkuModel::MovingAverage { category, model },
                Plan::Ensemble(evidence) => {
                    let Evidence {
                        category,
                        member_predictions,
                        member_mape,
                        actual,
                        members,
                    } = *evidence;
                    let w = weights.weights_for(&category);
                    let combined: Vec<f64> = (0..actual.len())
                        .map(|i| combine(&member_predictions.each_ref().map(|p| p[i]), &w))
                        .collect();
                    let residuals = ResidualProfile::from_pairs(&combined, &actual)?;
                    SkuModel::Ensemble {
                        category,
                        model: EnsembleModel::new(members, member_mape, residuals)?,
                    }
                }
            };
            skus.insert(sku, model);
        }

        let version = self.live.read().version + 1;
        debug!(
            store_id = %data.store_id,
            version,
            skus = skus.len(),
            "Trained candidate model state"
        );
        Ok(ModelState {
            version,
            store_id: data.store_id.clone(),
            trained_through: Some(trained_through),
            skus,
            weights,
            metrics: None,
        })
    }

    fn plan_sku(&self, data: &SkuTrainingData, days_of_data: u32) -> Result<Plan> {
        let category = data.category.clone();
        if data.transactions < self.config.min_sku_transactions || data.series.is_empty() {
            return Ok(Plan::Prior { category });
        }
        let average = || -> Result<Plan> {
            let model = MovingAverageFallback::new(self.config.moving_average_window)?.train(&data.series)?;
            Ok(Plan::Average {
                category: category.clone(),
                model,
            })
        };
        if days_of_data < self.config.min_ensemble_days {
            return average();
        }

        let validation = self
            .config
            .validation_days
            .min(data.series.len() / 4)
            .max(MIN_VALIDATION_DAYS);
        let evidence = data
            .series
            .split_tail(validation)
            .and_then(|(fit, holdout)| self.gather_evidence(&category, &data.series, &fit, &holdout));
        match evidence {
            Ok(evidence) => Ok(Plan::Ensemble(Box::new(evidence))),
            Err(e) => {
                debug!(sku = %data.sku, error = %e, "Ensemble not trainable, using moving average");
                average()
            }
        }
    }

    fn gather_evidence(
        &self,
        category: &str,
        full: &DemandSeries,
        fit: &DemandSeries,
        holdout: &DemandSeries,
    ) -> Result<Evidence> {
        let fitted = self.specs.train_all(fit)?;
        let mut member_predictions: [Vec<f64>; MEMBER_COUNT] = Default::default();
        let mut member_mape = [0.0; MEMBER_COUNT];
        for (i, member) in fitted.iter().enumerate() {
            let predictions = walk_forward(member, fit.values(), holdout)?;
            member_mape[i] = crate::metrics::mape(&predictions, holdout.values())?;
            member_predictions[i] = predictions;
        }
        Ok(Evidence {
            category: category.to_string(),
            member_predictions,
            member_mape,
            actual: holdout.values().to_vec(),
            members: self.specs.train_all(full)?,
        })
    }

    /// Walk-forward accuracy of `state` over the final `test_days` of `data`
    ///
    /// SKUs that fall back to the category prior are not scored.
    pub fn evaluate(&self, state: &ModelState, data: &TrainingSet, test_days: usize) -> Result<ModelMetrics> {
        let mut predicted = Vec::new();
        let mut actual = Vec::new();
        for sku in &data.skus {
            if sku.series.len() <= test_days {
                continue;
            }
            let (head, tail) = sku.series.split_tail(test_days)?;
            let predictions = match state.sku(&sku.sku) {
                Some(SkuModel::Ensemble { category, model }) => {
                    let weights = state.weights.weights_for(category);
                    let mut history = head.values().to_vec();
                    let mut out = Vec::with_capacity(tail.len());
                    for ((date, features), value) in tail.dates().iter().zip(tail.features()).zip(tail.values()) {
                        let ctx = DayContext::new(*date, features, &history);
                        out.push(model.predict_day(&ctx, &weights)?);
                        history.push(*value);
                    }
                    out
                }
                Some(SkuModel::MovingAverage { model, .. }) => walk_forward(model, head.values(), &tail)?,
                _ => continue,
            };
            predicted.extend(predictions);
            actual.extend_from_slice(tail.values());
        }

        if predicted.is_empty() {
            return Ok(ModelMetrics {
                mape: 0.0,
                rmse: 0.0,
                evaluated_days: 0,
            });
        }
        let accuracy = forecast_accuracy(&predicted, &actual)?;
        Ok(ModelMetrics {
            mape: accuracy.mape,
            rmse: accuracy.rmse,
            evaluated_days: accuracy.count,
        })
    }

    /// One-day-ahead forecast; `None` when the category prior stands in
    pub fn predict_next_day(&self, input: &PredictionInput<'_>) -> Result<Option<Forecast>> {
        Ok(self.predict_horizon(input, 1)?.and_then(|mut days| days.pop()))
    }

    /// Seven-day forecast fed forward on its own predictions
    pub fn predict_next_week(&self, input: &PredictionInput<'_>) -> Result<Option<Vec<Forecast>>> {
        self.predict_horizon(input, self.config.max_horizon_days)
    }

    /// Forecasts for the first `days` entries of `input.horizon`
    pub fn predict_horizon(&self, input: &PredictionInput<'_>, days: u32) -> Result<Option<Vec<Forecast>>> {
        if days == 0 || days > self.config.max_horizon_days {
            return Err(ForecastError::validation(format!(
                "horizon must be between 1 and {} days, got {}",
                self.config.max_horizon_days, days
            )));
        }
        if days > 1 && input.days_of_data < self.config.next_week_min_days {
            return Err(ForecastError::HorizonNotSupported {
                requested: days,
                days_of_data: input.days_of_data,
                required: self.config.next_week_min_days,
            });
        }
        if input.horizon.len() < days as usize {
            return Err(ForecastError::validation(format!(
                "{} target days requested but context for {} supplied",
                days,
                input.horizon.len()
            )));
        }

        let state = self.snapshot();
        let Some(model) = state.sku(input.sku) else {
            return Ok(None);
        };
        if matches!(model, SkuModel::CategoryPrior { .. }) {
            return Ok(None);
        }

        let sufficiency = data_sufficiency_score(input.days_of_data);
        let observed_max = input.history.iter().copied().fold(0.0, f64::max);
        let lag_cap = if observed_max > 0.0 {
            observed_max * self.config.lag_clamp_multiple
        } else {
            f64::INFINITY
        };

        let mut history = input.history.to_vec();
        let mut out = Vec::with_capacity(days as usize);
        for (step, features) in input.horizon.iter().take(days as usize).enumerate() {
            let k = step + 1;
            let widening = (k as f64).sqrt().min(self.config.horizon_widening_cap);
            let ctx = DayContext::new(features.date, features, &history);

            let (predicted, sigma, base_confidence, factors) = match model {
                SkuModel::Ensemble { category, model } => {
                    let weights = state.weights.weights_for(category);
                    let members = model.predict_members(&ctx)?;
                    let factors: Vec<(String, f64)> = ENSEMBLE_MEMBERS
                        .iter()
                        .zip(members)
                        .map(|(kind, p)| (format!("member:{}", kind), p))
                        .collect();
                    let residuals = model.residuals();
                    (
                        combine(&members, &weights),
                        residuals.std_dev,
                        1.0 / (1.0 + residuals.mape / 100.0),
                        factors,
                    )
                }
                SkuModel::MovingAverage { model, .. } => (
                    model.predict_day(&ctx)?.max(0.0),
                    model.residual_std(),
                    model.confidence(),
                    vec![("member:moving_average".to_string(), model.last_average())],
                ),
                SkuModel::CategoryPrior { .. } => return Ok(None),
            };

            let half_width = self.z * sigma * (1.0 + (1.0 - sufficiency)) * widening;
            let forecast = Forecast::new(
                input.store_id,
                input.sku,
                features.date,
                predicted,
                (predicted - half_width, predicted + half_width),
                base_confidence / widening,
                sufficiency,
                DataSource::StoreSpecific,
            )?
            .with_factors(factors)
            .with_factor("horizon_step", k as f64);
            out.push(forecast);
            history.push(predicted.min(lag_cap));
        }
        Ok(Some(out))
    }
}

/// Durable JSON storage of model states, one file per store
#[derive(Debug, Clone)]
pub struct ModelStore {
    root: PathBuf,
}

impl ModelStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    fn path_for(&self, store_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", store_id))
    }

    /// Write to a temporary file, then rename over the previous state
    pub fn save(&self, state: &ModelState) -> Result<PathBuf> {
        let path = self.path_for(&state.store_id);
        let tmp = self.root.join(format!(".{}.json.tmp", state.store_id));
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, &path)?;
        debug!(store_id = %state.store_id, version = state.version, path = %path.display(), "Saved model state");
        Ok(path)
    }

    pub fn load(&self, store_id: &str) -> Result<Option<ModelState>> {
        let path = self.path_for(store_id);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_support::weekly_series;
    use approx::assert_relative_eq;

    fn training_set(days: usize, transactions: usize) -> TrainingSet {
        TrainingSet {
            store_id: "s1".to_string(),
            days_of_data: days as u32,
            skus: vec![SkuTrainingData {
                sku: "chips".to_string(),
                category: "snacks".to_string(),
                series: weekly_series(days),
                transactions,
            }],
        }
    }

    fn next_days(series: &DemandSeries, n: usize) -> Vec<ContextFeatures> {
        let last = series.last_date().unwrap();
        (1..=n as i64)
            .map(|i| ContextFeatures::neutral(last + chrono::Duration::days(i)))
            .collect()
    }

    fn input<'a>(days: u32, history: &'a [f64], horizon: &'a [ContextFeatures]) -> PredictionInput<'a> {
        PredictionInput {
            store_id: "s1",
            sku: "chips",
            days_of_data: days,
            history,
            horizon,
        }
    }

    #[test]
    fn model_choice_follows_history() {
        let engine = HybridForecastEngine::new(EnsembleConfig::default(), "s1").unwrap();
        let sparse = engine.train_candidate(&training_set(100, 5)).unwrap();
        assert_eq!(sparse.sku("chips").unwrap().label(), "category_prior");

        let short = engine.train_candidate(&training_set(20, 20)).unwrap();
        assert_eq!(short.sku("chips").unwrap().label(), "moving_average");

        let long = engine.train_candidate(&training_set(100, 100)).unwrap();
        assert_eq!(long.sku("chips").unwrap().label(), "ensemble");
        assert_relative_eq!(long.weights.weights_for("snacks").iter().sum::<f64>(), 1.0);
        assert_eq!(long.version, 1);
    }

    #[test]
    fn candidate_training_leaves_live_state_alone() {
        let engine = HybridForecastEngine::new(EnsembleConfig::default(), "s1").unwrap();
        let before = engine.snapshot();
        let candidate = engine.train_candidate(&training_set(60, 60)).unwrap();
        assert!(Arc::ptr_eq(&before, &engine.snapshot()));

        let previous = engine.promote(candidate.clone());
        assert!(Arc::ptr_eq(&before, &previous));
        assert_eq!(*engine.snapshot(), candidate);
    }

    #[test]
    fn week_ahead_bands_widen_with_horizon() {
        let engine = HybridForecastEngine::new(EnsembleConfig::default(), "s1").unwrap();
        let data = training_set(120, 120);
        engine.promote(engine.train_candidate(&data).unwrap());

        let series = &data.skus[0].series;
        let horizon = next_days(series, 7);
        let week = engine
            .predict_next_week(&input(120, series.values(), &horizon))
            .unwrap()
            .unwrap();
        assert_eq!(week.len(), 7);
        assert!(week[6].interval_width() >= week[0].interval_width());
        assert!(week[6].confidence_score() <= week[0].confidence_score());
        for f in &week {
            assert!(f.confidence_lower() <= f.predicted_demand());
            assert!(f.predicted_demand() <= f.confidence_upper());
            assert_eq!(f.data_source(), DataSource::StoreSpecific);
            assert!(f.contributing_factors().contains_key("member:gradient_boosted"));
        }
    }

    #[test]
    fn next_week_needs_ninety_days() {
        let engine = HybridForecastEngine::new(EnsembleConfig::default(), "s1").unwrap();
        let data = training_set(60, 60);
        engine.promote(engine.train_candidate(&data).unwrap());
        let series = &data.skus[0].series;
        let horizon = next_days(series, 7);

        let err = engine
            .predict_next_week(&input(60, series.values(), &horizon))
            .unwrap_err();
        assert!(matches!(
            err,
            ForecastError::HorizonNotSupported { requested: 7, days_of_data: 60, required: 90 }
        ));
        assert!(engine
            .predict_next_day(&input(60, series.values(), &horizon))
            .unwrap()
            .is_some());
    }

    #[test]
    fn category_prior_skus_yield_no_store_forecast() {
        let engine = HybridForecastEngine::new(EnsembleConfig::default(), "s1").unwrap();
        let data = training_set(40, 3);
        engine.promote(engine.train_candidate(&data).unwrap());
        let series = &data.skus[0].series;
        let horizon = next_days(series, 1);
        assert!(engine
            .predict_next_day(&input(40, series.values(), &horizon))
            .unwrap()
            .is_none());
    }

    #[test]
    fn evaluation_scores_the_tail() {
        let engine = HybridForecastEngine::new(EnsembleConfig::default(), "s1").unwrap();
        let data = training_set(90, 90);
        let candidate = engine.train_candidate(&data.without_tail(14).unwrap()).unwrap();
        let metrics = engine.evaluate(&candidate, &data, 14).unwrap();
        assert_eq!(metrics.evaluated_days, 14);
        assert!(metrics.mape < 25.0, "mape {}", metrics.mape);
    }

    #[test]
    fn model_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path()).unwrap();
        assert!(store.load("s1").unwrap().is_none());

        let engine = HybridForecastEngine::new(EnsembleConfig::default(), "s1").unwrap();
        let state = engine.train_candidate(&training_set(40, 40)).unwrap();
        store.save(&state).unwrap();
        let loaded = store.load("s1").unwrap().unwrap();
        assert_eq!(loaded.version, state.version);
        assert_eq!(loaded.trained_through, state.trained_through);
        assert_eq!(loaded.skus.keys().collect::<Vec<_>>(), state.skus.keys().collect::<Vec<_>>());
    }
}
