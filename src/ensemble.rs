//! Ensemble combination and prediction summary.
//!
//! The temporal model is trained on the residual of the static regressor,
//! so elementwise summation is the default and the only combination
//! consistent with training. The weighted variant exists for post-hoc
//! calibration: its two scalars are fit once by least squares at training
//! time, persisted, and never refit at inference.

use serde::{Deserialize, Serialize};

/// Population standard deviation below which a prediction is labelled
/// high-confidence.
pub const CONFIDENCE_STD_THRESHOLD: f32 = 0.2;

/// Combination and summary errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EnsembleError {
    #[error("prediction length mismatch: static {static_len} vs temporal {temporal_len}")]
    LengthMismatch {
        static_len: usize,
        temporal_len: usize,
    },

    #[error("non-finite prediction at step {index}")]
    NonFinite { index: usize },

    #[error("degenerate least-squares system while fitting ensemble weights")]
    DegenerateWeights,

    #[error("cannot summarize an empty prediction")]
    Empty,
}

/// How the two sub-model outputs merge into the final prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum CombinePolicy {
    /// Elementwise sum (residual-learning contract).
    Sum,
    /// Fixed post-hoc weights, normalized to sum to 1.
    Weighted { w_static: f32, w_temporal: f32 },
}

impl Default for CombinePolicy {
    fn default() -> Self {
        Self::Sum
    }
}

impl CombinePolicy {
    /// Combine per-step predictions elementwise.
    pub fn combine(
        &self,
        static_pred: &[f32],
        temporal_pred: &[f32],
    ) -> Result<Vec<f32>, EnsembleError> {
        if static_pred.len() != temporal_pred.len() {
            return Err(EnsembleError::LengthMismatch {
                static_len: static_pred.len(),
                temporal_len: temporal_pred.len(),
            });
        }

        let combined = match *self {
            CombinePolicy::Sum => static_pred
                .iter()
                .zip(temporal_pred)
                .map(|(s, t)| s + t)
                .collect(),
            CombinePolicy::Weighted {
                w_static,
                w_temporal,
            } => static_pred
                .iter()
                .zip(temporal_pred)
                .map(|(s, t)| w_static * s + w_temporal * t)
                .collect(),
        };

        Ok(combined)
    }

    /// Fit the weighted variant by least squares of
    /// `[static_pred, temporal_pred]` against `targets`, normalizing the two
    /// weights to sum to 1.
    pub fn fit_weighted(
        static_pred: &[f32],
        temporal_pred: &[f32],
        targets: &[f32],
    ) -> Result<Self, EnsembleError> {
        if static_pred.len() != temporal_pred.len() || static_pred.len() != targets.len() {
            return Err(EnsembleError::LengthMismatch {
                static_len: static_pred.len(),
                temporal_len: temporal_pred.len(),
            });
        }

        // Normal equations of the 2-column system.
        let mut saa = 0f64;
        let mut sab = 0f64;
        let mut sbb = 0f64;
        let mut say = 0f64;
        let mut sby = 0f64;
        for ((&a, &b), &y) in static_pred.iter().zip(temporal_pred).zip(targets) {
            let (a, b, y) = (a as f64, b as f64, y as f64);
            saa += a * a;
            sab += a * b;
            sbb += b * b;
            say += a * y;
            sby += b * y;
        }

        let det = saa * sbb - sab * sab;
        if det.abs() < 1e-12 {
            return Err(EnsembleError::DegenerateWeights);
        }

        let w_static = (sbb * say - sab * sby) / det;
        let w_temporal = (saa * sby - sab * say) / det;
        let total = w_static + w_temporal;
        if total.abs() < 1e-12 {
            return Err(EnsembleError::DegenerateWeights);
        }

        Ok(CombinePolicy::Weighted {
            w_static: (w_static / total) as f32,
            w_temporal: (w_temporal / total) as f32,
        })
    }
}

/// Coarse confidence qualifier derived from output dispersion. Not a
/// calibrated probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
}

/// Final per-request prediction with derived statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionSummary {
    pub predictions: Vec<f32>,
    pub average_rise: f32,
    pub max_rise: f32,
    pub confidence: Confidence,
}

/// Derive the summary statistics for a combined prediction.
///
/// Any non-finite value is a hard failure; partial or substituted results
/// are never produced.
pub fn summarize(predictions: Vec<f32>) -> Result<PredictionSummary, EnsembleError> {
    if predictions.is_empty() {
        return Err(EnsembleError::Empty);
    }
    if let Some(index) = predictions.iter().position(|value| !value.is_finite()) {
        return Err(EnsembleError::NonFinite { index });
    }

    let n = predictions.len() as f64;
    let mean = predictions.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = predictions
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    let max = predictions.iter().copied().fold(f32::NEG_INFINITY, f32::max);

    let confidence = if (variance.sqrt() as f32) < CONFIDENCE_STD_THRESHOLD {
        Confidence::High
    } else {
        Confidence::Medium
    };

    Ok(PredictionSummary {
        predictions,
        average_rise: mean as f32,
        max_rise: max,
        confidence,
    })
}
