//! Hybrid model: static forest plus temporal residual model.
//!
//! Owns both trained sub-models, the fitted scaling state, and the combine
//! policy, and is the single place where training-time and inference-time
//! semantics meet. The static vector is broadcast into per-timestep rows by
//! one shared, shape-checked helper so the two paths cannot diverge.

use candle_nn::VarMap;

use crate::data::{ObservationTable, RobustScaler, ScaleError, ScalingState, WindowSet};
use crate::ensemble::{self, CombinePolicy, EnsembleError, PredictionSummary};
use crate::forest::{BaggedForest, BaggedForestTrainer, ForestError};
use crate::serve::ValidatedRequest;
use crate::temporal::{AttentionLstm, TemporalError, TemporalTrainer};
use crate::{N_STATIC_FEATURES, SEQ_LEN};

/// Training pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("training table produced no windows")]
    NoWindows,

    #[error(transparent)]
    Scale(#[from] ScaleError),

    #[error(transparent)]
    Forest(#[from] ForestError),

    #[error(transparent)]
    Temporal(#[from] TemporalError),

    #[error("ensemble weight fit failed: {0}")]
    Weights(EnsembleError),

    #[error("temporal prediction failed during weight fitting: {0}")]
    WeightFitPrediction(#[from] candle_core::Error),
}

/// Inference errors. Validation has already happened by the time these can
/// occur, so every variant maps to an internal (500) failure.
#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("shape mismatch: expected {expected} values, got {got}")]
    Shape { expected: usize, got: usize },

    #[error("non-finite prediction at step {index}")]
    NonFinite { index: usize },

    #[error("temporal model failure: {0}")]
    Temporal(#[from] candle_core::Error),
}

impl From<ForestError> for PredictError {
    fn from(err: ForestError) -> Self {
        match err {
            ForestError::ShapeMismatch { expected, got } => Self::Shape { expected, got },
            ForestError::TargetLenMismatch { rows, targets } => Self::Shape {
                expected: rows,
                got: targets,
            },
            ForestError::EmptyTraining => Self::Shape {
                expected: 1,
                got: 0,
            },
        }
    }
}

impl From<ScaleError> for PredictError {
    fn from(err: ScaleError) -> Self {
        match err {
            ScaleError::WidthMismatch { expected, got } => Self::Shape { expected, got },
            ScaleError::EmptyBlock => Self::Shape {
                expected: 1,
                got: 0,
            },
        }
    }
}

impl From<EnsembleError> for PredictError {
    fn from(err: EnsembleError) -> Self {
        match err {
            EnsembleError::LengthMismatch {
                static_len,
                temporal_len,
            } => Self::Shape {
                expected: static_len,
                got: temporal_len,
            },
            EnsembleError::NonFinite { index } => Self::NonFinite { index },
            EnsembleError::DegenerateWeights | EnsembleError::Empty => Self::Shape {
                expected: SEQ_LEN,
                got: 0,
            },
        }
    }
}

/// Broadcast a static feature row into `seq_len` identical per-timestep
/// rows. This is the only static-to-temporal broadcast in the crate; both
/// the training and the serving path go through it.
pub fn repeat_static(static_row: &[f32], seq_len: usize) -> Result<Vec<f32>, ForestError> {
    if static_row.len() != N_STATIC_FEATURES {
        return Err(ForestError::ShapeMismatch {
            expected: N_STATIC_FEATURES,
            got: static_row.len(),
        });
    }

    let mut repeated = Vec::with_capacity(seq_len * N_STATIC_FEATURES);
    for _ in 0..seq_len {
        repeated.extend_from_slice(static_row);
    }
    Ok(repeated)
}

/// Configuration for the full training pipeline.
#[derive(Debug, Clone, Default)]
pub struct HybridTrainParams {
    pub forest: BaggedForestTrainer,
    pub temporal: TemporalTrainer,
    /// Fit post-hoc least-squares mixing weights instead of summing.
    pub weighted_ensemble: bool,
}

/// The trained hybrid predictor.
///
/// Immutable after construction; all prediction entry points take `&self`,
/// so a loaded model can be shared across concurrent requests without
/// locking.
pub struct HybridModel {
    pub(crate) forest: BaggedForest,
    pub(crate) temporal: AttentionLstm,
    pub(crate) varmap: VarMap,
    pub(crate) scaling: ScalingState,
    pub(crate) policy: CombinePolicy,
    pub(crate) seq_len: usize,
}

impl std::fmt::Debug for HybridModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridModel")
            .field("forest", &self.forest)
            .field("temporal", &self.temporal)
            .field("scaling", &self.scaling)
            .field("policy", &self.policy)
            .field("seq_len", &self.seq_len)
            .finish_non_exhaustive()
    }
}

impl HybridModel {
    /// Train the full pipeline on an observation table.
    ///
    /// Pipeline: window, fit global scalers, fit the forest on repeated
    /// static rows against flattened per-step targets, compute per-step
    /// residuals, train the temporal model on them, then optionally fit
    /// mixing weights.
    pub fn train(table: &ObservationTable, params: &HybridTrainParams) -> Result<Self, TrainError> {
        let windows = WindowSet::from_table(table, SEQ_LEN);
        if windows.is_empty() {
            return Err(TrainError::NoWindows);
        }
        let n_windows = windows.len();
        tracing::info!(n_windows, rows = table.len(), "windowed training table");

        // Global scaler fit, reused verbatim at inference.
        let mut statics = windows.statics_flat().to_vec();
        let static_scaler = RobustScaler::fit(&statics, N_STATIC_FEATURES)?;
        static_scaler.transform(&mut statics)?;

        let mut temporal = windows.temporal_flat().to_vec();
        let temporal_scaler = RobustScaler::fit(&temporal, crate::N_TEMPORAL_FEATURES)?;
        temporal_scaler.transform(&mut temporal)?;

        // Static design matrix: each window's scaled static row repeated
        // once per timestep, against the flattened per-step targets.
        let mut repeated = Vec::with_capacity(n_windows * SEQ_LEN * N_STATIC_FEATURES);
        for w in 0..n_windows {
            let row = &statics[w * N_STATIC_FEATURES..(w + 1) * N_STATIC_FEATURES];
            repeated.extend(repeat_static(row, SEQ_LEN)?);
        }
        let step_targets = windows.step_targets_flat();

        let forest = params.forest.fit(&repeated, N_STATIC_FEATURES, step_targets)?;
        tracing::info!(n_trees = forest.n_trees(), "fitted static forest");

        // The temporal model never sees the raw target, only the residual.
        let baseline = forest.predict_batch(&repeated, n_windows * SEQ_LEN)?;
        let residuals: Vec<f32> = step_targets
            .iter()
            .zip(&baseline)
            .map(|(y, base)| y - base)
            .collect();

        let trained = params
            .temporal
            .train(&temporal, &residuals, n_windows, SEQ_LEN)?;
        tracing::info!("trained temporal residual model");

        let policy = if params.weighted_ensemble {
            let temporal_pred =
                trained
                    .model
                    .predict_batch(&temporal, n_windows, &candle_core::Device::Cpu)?;
            let combined = CombinePolicy::fit_weighted(&baseline, &temporal_pred, step_targets)
                .map_err(TrainError::Weights)?;
            tracing::info!(?combined, "fitted ensemble weights");
            combined
        } else {
            CombinePolicy::Sum
        };

        Ok(Self {
            forest,
            temporal: trained.model,
            varmap: trained.varmap,
            scaling: ScalingState {
                static_scaler,
                temporal_scaler,
            },
            policy,
            seq_len: SEQ_LEN,
        })
    }

    /// Reassemble a model from persisted parts.
    pub(crate) fn from_parts(
        forest: BaggedForest,
        temporal: AttentionLstm,
        varmap: VarMap,
        scaling: ScalingState,
        policy: CombinePolicy,
        seq_len: usize,
    ) -> Self {
        Self {
            forest,
            temporal,
            varmap,
            scaling,
            policy,
            seq_len,
        }
    }

    /// The static forest.
    pub fn forest(&self) -> &BaggedForest {
        &self.forest
    }

    /// The combine policy in force.
    pub fn policy(&self) -> CombinePolicy {
        self.policy
    }

    /// Fixed sequence length.
    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Predict per-step rise for one validated request.
    ///
    /// Mirrors the training path exactly: whole-sequence window assembly,
    /// the persisted global scaling, the shared static broadcast, forest
    /// baseline plus temporal residual, policy combination, and a single
    /// finiteness check over the combined output.
    pub fn predict(&self, request: &ValidatedRequest) -> Result<PredictionSummary, PredictError> {
        let windows = WindowSet::whole_sequence(
            request.static_features,
            request.temporal_block().to_vec(),
            self.seq_len,
        );

        let mut static_row = windows.static_row(0).to_vec();
        self.scaling.static_scaler.transform(&mut static_row)?;
        let mut temporal = windows.temporal_block(0).to_vec();
        self.scaling.temporal_scaler.transform(&mut temporal)?;

        let repeated = repeat_static(&static_row, self.seq_len)?;
        let static_pred = self.forest.predict_batch(&repeated, self.seq_len)?;
        let temporal_pred = self.temporal.predict_sequence(&temporal)?;

        let combined = self.policy.combine(&static_pred, &temporal_pred)?;
        Ok(ensemble::summarize(combined)?)
    }
}
