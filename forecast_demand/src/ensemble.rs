//! Weighted combination of the ensemble members

use crate::error::{ForecastError, Result};
use crate::models::{DayContext, MemberModel, ModelKind, TrainedForecastModel, ENSEMBLE_MEMBERS, MEMBER_COUNT};
use demand_math::stats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Error floor in percentage points, so a perfect member cannot take all weight
const MAPE_FLOOR: f64 = 1.0;

/// Combination weights per product category
///
/// Weights are inverse held-out MAPE of each member on the category,
/// renormalised to sum to 1. Categories without evidence use equal weights.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    weights: BTreeMap<String, [f64; MEMBER_COUNT]>,
}

impl WeightTable {
    pub fn equal() -> [f64; MEMBER_COUNT] {
        [1.0 / MEMBER_COUNT as f64; MEMBER_COUNT]
    }

    /// Build from per-category lists of member MAPEs (one entry per SKU)
    pub fn from_member_errors(errors: &BTreeMap<String, Vec<[f64; MEMBER_COUNT]>>) -> Self {
        let weights = errors
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(category, rows)| {
                let mut avg = [0.0; MEMBER_COUNT];
                for row in rows {
                    for (a, e) in avg.iter_mut().zip(row) {
                        *a += e / rows.len() as f64;
                    }
                }
                (category.clone(), inverse_error_weights(&avg))
            })
            .collect();
        Self { weights }
    }

    pub fn weights_for(&self, category: &str) -> [f64; MEMBER_COUNT] {
        self.weights.get(category).copied().unwrap_or_else(Self::equal)
    }

    pub fn weight_of(&self, category: &str, kind: ModelKind) -> f64 {
        self.weights_for(category)[kind.index()]
    }

    pub fn categories(&self) -> impl Iterator<Item = &String> {
        self.weights.keys()
    }
}

/// Normalised inverse-error weights; non-finite errors get no weight
pub fn inverse_error_weights(mapes: &[f64; MEMBER_COUNT]) -> [f64; MEMBER_COUNT] {
    let mut raw = [0.0; MEMBER_COUNT];
    for (w, e) in raw.iter_mut().zip(mapes) {
        if e.is_finite() {
            *w = 1.0 / e.max(MAPE_FLOOR);
        }
    }
    let total: f64 = raw.iter().sum();
    if total <= 0.0 {
        return WeightTable::equal();
    }
    raw.map(|w| w / total)
}

/// Residual distribution of the combined prediction on the validation window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResidualProfile {
    pub std_dev: f64,
    pub mape: f64,
    pub count: usize,
}

impl ResidualProfile {
    pub fn from_pairs(predicted: &[f64], actual: &[f64]) -> Result<Self> {
        if predicted.len() != actual.len() || predicted.is_empty() {
            return Err(ForecastError::ValidationError(
                "Residuals need equal, non-empty prediction and actual series".to_string(),
            ));
        }
        let residuals: Vec<f64> = actual.iter().zip(predicted).map(|(a, p)| a - p).collect();
        let std_dev = if residuals.len() >= 2 {
            stats::std_dev(&residuals)?
        } else {
            residuals[0].abs()
        };
        Ok(Self {
            std_dev,
            mape: crate::metrics::mape(predicted, actual)?,
            count: residuals.len(),
        })
    }
}

/// The trained members of one SKU plus their validation evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleModel {
    members: Vec<MemberModel>,
    member_mape: [f64; MEMBER_COUNT],
    residuals: ResidualProfile,
}

impl EnsembleModel {
    pub fn new(members: Vec<MemberModel>, member_mape: [f64; MEMBER_COUNT], residuals: ResidualProfile) -> Result<Self> {
        let kinds: Vec<ModelKind> = members.iter().map(|m| m.kind()).collect();
        if kinds != ENSEMBLE_MEMBERS {
            return Err(ForecastError::TrainingError(format!(
                "Ensemble members must be {:?}, got {:?}",
                ENSEMBLE_MEMBERS, kinds
            )));
        }
        Ok(Self {
            members,
            member_mape,
            residuals,
        })
    }

    pub fn members(&self) -> &[MemberModel] {
        &self.members
    }

    pub fn member_mape(&self) -> &[f64; MEMBER_COUNT] {
        &self.member_mape
    }

    pub fn residuals(&self) -> &ResidualProfile {
        &self.residuals
    }

    /// Each member's prediction, in [`ENSEMBLE_MEMBERS`] order
    pub fn predict_members(&self, ctx: &DayContext<'_>) -> Result<[f64; MEMBER_COUNT]> {
        let mut out = [0.0; MEMBER_COUNT];
        for (slot, member) in out.iter_mut().zip(&self.members) {
            *slot = member.predict_day(ctx)?.max(0.0);
        }
        Ok(out)
    }

    /// Weighted prediction, clamped to be non-negative
    pub fn predict_day(&self, ctx: &DayContext<'_>, weights: &[f64; MEMBER_COUNT]) -> Result<f64> {
        Ok(combine(&self.predict_members(ctx)?, weights))
    }
}

pub fn combine(predictions: &[f64; MEMBER_COUNT], weights: &[f64; MEMBER_COUNT]) -> f64 {
    predictions
        .iter()
        .zip(weights)
        .map(|(p, w)| p * w)
        .sum::<f64>()
        .max(0.0)
}
