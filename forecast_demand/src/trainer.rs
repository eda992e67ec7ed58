//! Periodic retraining with a held-out acceptance test

use crate::config::TrainerConfig;
use crate::engine::{HybridForecastEngine, ModelMetrics, TrainingSet};
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{error, info, warn};

/// Metrics of one completed retraining cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleMetrics {
    pub run_at: DateTime<Utc>,
    pub candidate_version: u64,
    pub candidate: ModelMetrics,
    pub live_mape: Option<f64>,
    pub promoted: bool,
}

/// Record emitted whenever a candidate is rejected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionWarning {
    pub store_id: String,
    pub run_at: DateTime<Utc>,
    pub candidate_mape: f64,
    pub live_mape: f64,
    pub tolerance_points: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Promoted { version: u64, metrics: ModelMetrics },
    Retained { warning: PromotionWarning },
    Failed { error: String, retry_at: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromotionDecision {
    Promote,
    Retain,
}

/// Accept a candidate unless it is more than `tolerance_points` worse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromotionPolicy {
    pub tolerance_points: f64,
}

impl PromotionPolicy {
    pub fn new(tolerance_points: f64) -> Self {
        Self { tolerance_points }
    }

    pub fn decide(&self, candidate_mape: f64, live_mape: Option<f64>) -> PromotionDecision {
        match live_mape {
            Some(live) if candidate_mape > live + self.tolerance_points => PromotionDecision::Retain,
            _ => PromotionDecision::Promote,
        }
    }
}

/// Weekly retraining for one store's engine
#[derive(Debug, Clone)]
pub struct RetrainingScheduler {
    config: TrainerConfig,
    policy: PromotionPolicy,
    cycles: VecDeque<CycleMetrics>,
    warnings: Vec<PromotionWarning>,
    last_run: Option<DateTime<Utc>>,
    retry_at: Option<DateTime<Utc>>,
}

impl RetrainingScheduler {
    pub fn new(config: TrainerConfig) -> Self {
        Self {
            policy: PromotionPolicy::new(config.mape_tolerance_points),
            cycles: VecDeque::with_capacity(config.retained_cycles),
            warnings: Vec::new(),
            last_run: None,
            retry_at: None,
            config,
        }
    }

    /// Whether a cycle should run at `now`; a pending retry takes precedence
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if let Some(retry_at) = self.retry_at {
            return now >= retry_at;
        }
        match self.last_run {
            None => true,
            Some(last) => now - last >= Duration::days(self.config.cadence_days),
        }
    }

    /// Metrics of the most recent cycles, oldest first
    pub fn cycles(&self) -> &VecDeque<CycleMetrics> {
        &self.cycles
    }

    pub fn warnings(&self) -> &[PromotionWarning] {
        &self.warnings
    }

    pub fn last_run(&self) -> Option<DateTime<Utc>> {
        self.last_run
    }

    pub fn retry_at(&self) -> Option<DateTime<Utc>> {
        self.retry_at
    }

    /// Train, evaluate on the last `test_days` and promote or retain
    ///
    /// A failed cycle leaves the live state in place and schedules a retry.
    pub fn run_cycle(&mut self, engine: &HybridForecastEngine, data: &TrainingSet, now: DateTime<Utc>) -> CycleOutcome {
        self.last_run = Some(now);
        let evaluated = self.train_and_evaluate(engine, data);
        let (candidate, metrics) = match evaluated {
            Ok(v) => v,
            Err(e) => {
                let retry_at = now + Duration::hours(self.config.retry_delay_hours);
                error!(
                    store_id = %data.store_id,
                    error = %e,
                    retry_at = %retry_at,
                    "Retraining failed, keeping live model"
                );
                self.retry_at = Some(retry_at);
                return CycleOutcome::Failed {
                    error: e.to_string(),
                    retry_at,
                };
            }
        };
        self.retry_at = None;

        let live_mape = self.live_mape(engine, data);
        let decision = self.policy.decide(metrics.mape, live_mape);
        self.push_cycle(CycleMetrics {
            run_at: now,
            candidate_version: candidate.version,
            candidate: metrics,
            live_mape,
            promoted: decision == PromotionDecision::Promote,
        });

        match (decision, live_mape) {
            (PromotionDecision::Retain, Some(live)) => {
                let message = format!(
                    "candidate MAPE {:.2} exceeds live MAPE {:.2} by more than {:.1} points",
                    metrics.mape, live, self.policy.tolerance_points
                );
                warn!(
                    store_id = %data.store_id,
                    candidate_mape = metrics.mape,
                    live_mape = live,
                    "Rejected retrained model"
                );
                let warning = PromotionWarning {
                    store_id: data.store_id.clone(),
                    run_at: now,
                    candidate_mape: metrics.mape,
                    live_mape: live,
                    tolerance_points: self.policy.tolerance_points,
                    message,
                };
                self.warnings.push(warning.clone());
                CycleOutcome::Retained { warning }
            }
            _ => {
                let version = candidate.version;
                info!(
                    store_id = %data.store_id,
                    version,
                    candidate_mape = metrics.mape,
                    live_mape = ?live_mape,
                    "Retrained model accepted"
                );
                engine.promote(candidate);
                CycleOutcome::Promoted { version, metrics }
            }
        }
    }

    fn train_and_evaluate(
        &self,
        engine: &HybridForecastEngine,
        data: &TrainingSet,
    ) -> Result<(crate::engine::ModelState, ModelMetrics)> {
        let test_days = self.config.test_days;
        let longest = data.skus.iter().map(|s| s.series.len()).max().unwrap_or(0);
        if longest <= test_days {
            return Err(ForecastError::TrainingError(format!(
                "store '{}' has {} days of series, need more than the {}-day test window",
                data.store_id, longest, test_days
            )));
        }
        let candidate = engine.train_candidate(&data.without_tail(test_days)?)?;
        let metrics = engine.evaluate(&candidate, data, test_days)?;
        Ok((candidate.with_metrics(metrics), metrics))
    }

    /// MAPE of the live state on this cycle's test window
    ///
    /// Falls back to the metric recorded at promotion when the live state
    /// cannot be scored on the current data.
    fn live_mape(&self, engine: &HybridForecastEngine, data: &TrainingSet) -> Option<f64> {
        let live = engine.snapshot();
        if !live.is_trained() {
            return None;
        }
        let recorded = live.metrics.map(|m| m.mape);
        match engine.evaluate(&live, data, self.config.test_days) {
            Ok(metrics) if metrics.evaluated_days > 0 => Some(metrics.mape),
            Ok(_) => recorded,
            Err(e) => {
                warn!(
                    store_id = %data.store_id,
                    version = live.version,
                    error = %e,
                    "Could not score live model on the test window, using its recorded MAPE"
                );
                recorded
            }
        }
    }

    fn push_cycle(&mut self, cycle: CycleMetrics) {
        if self.cycles.len() == self.config.retained_cycles {
            self.cycles.pop_front();
        }
        self.cycles.push_back(cycle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnsembleConfig;
    use crate::engine::SkuTrainingData;
    use crate::models::test_support::weekly_series;
    use chrono::TimeZone;
    use rstest::rstest;
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 2, 0, 0).unwrap()
    }

    fn data(days: usize) -> TrainingSet {
        TrainingSet {
            store_id: "s1".to_string(),
            days_of_data: days as u32,
            skus: vec![SkuTrainingData {
                sku: "chips".to_string(),
                category: "snacks".to_string(),
                series: weekly_series(days),
                transactions: days,
            }],
        }
    }

    #[rstest]
    #[case(10.0, None, PromotionDecision::Promote)]
    #[case(15.0, Some(10.0), PromotionDecision::Promote)]
    #[case(15.1, Some(10.0), PromotionDecision::Retain)]
    #[case(16.0, Some(10.0), PromotionDecision::Retain)]
    #[case(4.0, Some(10.0), PromotionDecision::Promote)]
    fn policy_tolerates_five_points(
        #[case] candidate: f64,
        #[case] live: Option<f64>,
        #[case] expected: PromotionDecision,
    ) {
        assert_eq!(PromotionPolicy::new(5.0).decide(candidate, live), expected);
    }

    #[test]
    fn first_cycle_promotes() {
        let engine = HybridForecastEngine::new(EnsembleConfig::default(), "s1").unwrap();
        let mut scheduler = RetrainingScheduler::new(TrainerConfig::default());
        assert!(scheduler.is_due(now()));
        let outcome = scheduler.run_cycle(&engine, &data(80), now());
        assert!(matches!(outcome, CycleOutcome::Promoted { version: 1, .. }));
        assert!(engine.snapshot().metrics.is_some());
        assert!(!scheduler.is_due(now() + Duration::days(3)));
        assert!(scheduler.is_due(now() + Duration::days(7)));
    }

    #[test]
    fn failed_cycle_schedules_retry() {
        let engine = HybridForecastEngine::new(EnsembleConfig::default(), "s1").unwrap();
        let before = engine.snapshot();
        let mut scheduler = RetrainingScheduler::new(TrainerConfig::default());
        let outcome = scheduler.run_cycle(&engine, &data(10), now());
        let CycleOutcome::Failed { retry_at, .. } = outcome else {
            panic!("expected failure, got {:?}", outcome);
        };
        assert_eq!(retry_at, now() + Duration::hours(6));
        assert!(Arc::ptr_eq(&before, &engine.snapshot()));
        assert!(!scheduler.is_due(now() + Duration::hours(5)));
        assert!(scheduler.is_due(now() + Duration::hours(6)));
        assert!(scheduler.cycles().is_empty());
    }

    #[test]
    fn keeps_only_recent_cycles() {
        let engine = HybridForecastEngine::new(EnsembleConfig::default(), "s1").unwrap();
        let config = TrainerConfig {
            retained_cycles: 2,
            ..TrainerConfig::default()
        };
        let mut scheduler = RetrainingScheduler::new(config);
        let set = data(40);
        for week in 0..3 {
            scheduler.run_cycle(&engine, &set, now() + Duration::days(7 * week));
        }
        assert_eq!(scheduler.cycles().len(), 2);
        assert_eq!(scheduler.cycles()[0].run_at, now() + Duration::days(7));
    }
}
