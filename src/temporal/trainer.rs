//! Residual training loop for the attention model.
//!
//! The model only ever sees what the static regressor failed to explain:
//! its targets are `per-step rise - static baseline`. Residuals are checked
//! finite before any tensor work so a diverged baseline fails training fast
//! instead of propagating NaNs through the optimizer.

use candle_core::{DType, Device, Tensor};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use derive_builder::Builder;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::model::{AttentionLstm, TemporalConfig};
use crate::N_TEMPORAL_FEATURES;

/// Temporal training errors.
#[derive(Debug, thiserror::Error)]
pub enum TemporalError {
    #[error("non-finite residual at index {index}: {value}")]
    NonFiniteResidual { index: usize, value: f32 },

    #[error("cannot train the temporal model on zero windows")]
    EmptyTraining,

    #[error("residual count {residuals} does not match {windows} windows of length {seq_len}")]
    ResidualLenMismatch {
        windows: usize,
        seq_len: usize,
        residuals: usize,
    },

    #[error("tensor error: {0}")]
    Candle(#[from] candle_core::Error),
}

/// A trained temporal model together with its variable store.
///
/// The [`VarMap`] owns the weights and is what gets persisted; the model is
/// the graph reading from it.
pub struct TrainedTemporal {
    pub model: AttentionLstm,
    pub varmap: VarMap,
}

impl std::fmt::Debug for TrainedTemporal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedTemporal")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Temporal residual trainer.
///
/// The validation tail is evaluated every epoch purely for monitoring; it
/// never feeds back into optimization or model selection.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into), default)]
pub struct TemporalTrainer {
    /// LSTM hidden width.
    #[builder(default = "64")]
    pub hidden_dim: usize,

    /// Optimization epochs.
    #[builder(default = "30")]
    pub epochs: usize,

    /// Mini-batch size.
    #[builder(default = "64")]
    pub batch_size: usize,

    /// AdamW learning rate.
    #[builder(default = "1e-3")]
    pub learning_rate: f64,

    /// Fraction of windows held out from the tail for monitoring.
    #[builder(default = "0.2")]
    pub validation_fraction: f32,

    /// Shuffle seed.
    #[builder(default = "42")]
    pub seed: u64,
}

impl Default for TemporalTrainer {
    fn default() -> Self {
        Self {
            hidden_dim: 64,
            epochs: 30,
            batch_size: 64,
            learning_rate: 1e-3,
            validation_fraction: 0.2,
            seed: 42,
        }
    }
}

impl TemporalTrainer {
    /// Create a builder for configuring the trainer.
    pub fn builder() -> TemporalTrainerBuilder {
        TemporalTrainerBuilder::default()
    }

    /// Train on `n_windows` timestep-major temporal blocks against flat
    /// per-step residuals (`n_windows * seq_len` values).
    pub fn train(
        &self,
        temporal: &[f32],
        residuals: &[f32],
        n_windows: usize,
        seq_len: usize,
    ) -> Result<TrainedTemporal, TemporalError> {
        if n_windows == 0 {
            return Err(TemporalError::EmptyTraining);
        }
        if residuals.len() != n_windows * seq_len {
            return Err(TemporalError::ResidualLenMismatch {
                windows: n_windows,
                seq_len,
                residuals: residuals.len(),
            });
        }
        for (index, &value) in residuals.iter().enumerate() {
            if !value.is_finite() {
                return Err(TemporalError::NonFiniteResidual { index, value });
            }
        }

        let device = Device::Cpu;
        let config = TemporalConfig {
            input_dim: N_TEMPORAL_FEATURES,
            hidden_dim: self.hidden_dim,
            seq_len,
        };

        let inputs = Tensor::from_vec(
            temporal.to_vec(),
            (n_windows, seq_len, N_TEMPORAL_FEATURES),
            &device,
        )?;
        let targets = Tensor::from_vec(residuals.to_vec(), (n_windows, seq_len), &device)?;

        // Monitoring split: the tail of the window stream, never shuffled in.
        let n_val = ((n_windows as f32 * self.validation_fraction) as usize)
            .min(n_windows.saturating_sub(1));
        let n_train = n_windows - n_val;
        let train_inputs = inputs.narrow(0, 0, n_train)?;
        let train_targets = targets.narrow(0, 0, n_train)?;

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = AttentionLstm::new(config, vb)?;
        let mut optimizer = AdamW::new(
            varmap.all_vars(),
            ParamsAdamW {
                lr: self.learning_rate,
                ..Default::default()
            },
        )?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut order: Vec<u32> = (0..n_train as u32).collect();

        tracing::debug!(
            n_train,
            n_val,
            epochs = self.epochs,
            hidden_dim = self.hidden_dim,
            "training temporal residual model"
        );

        for epoch in 0..self.epochs {
            order.shuffle(&mut rng);

            let mut summed_loss = 0f64;
            for chunk in order.chunks(self.batch_size.max(1)) {
                let idx = Tensor::from_vec(chunk.to_vec(), (chunk.len(),), &device)?;
                let batch_inputs = train_inputs.index_select(&idx, 0)?;
                let batch_targets = train_targets.index_select(&idx, 0)?;

                let predictions = model.forward(&batch_inputs)?;
                let loss = candle_nn::loss::mse(&predictions, &batch_targets)?;
                optimizer.backward_step(&loss)?;

                summed_loss += loss.to_scalar::<f32>()? as f64 * chunk.len() as f64;
            }
            let train_mse = summed_loss / n_train as f64;

            if n_val > 0 {
                let val_inputs = inputs.narrow(0, n_train, n_val)?;
                let val_targets = targets.narrow(0, n_train, n_val)?;
                let val_predictions = model.forward(&val_inputs)?;
                let val_mse =
                    candle_nn::loss::mse(&val_predictions, &val_targets)?.to_scalar::<f32>()?;
                tracing::debug!(epoch, train_mse, val_mse, "epoch complete");
            } else {
                tracing::debug!(epoch, train_mse, "epoch complete");
            }
        }

        Ok(TrainedTemporal { model, varmap })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SEQ_LEN;

    fn synthetic_blocks(n_windows: usize) -> (Vec<f32>, Vec<f32>) {
        // Residual depends linearly on the first driver so a few epochs can
        // reduce the loss meaningfully.
        let mut temporal = Vec::new();
        let mut residuals = Vec::new();
        for w in 0..n_windows {
            for t in 0..SEQ_LEN {
                let driver = ((w + t) % 7) as f32 / 7.0;
                temporal.push(driver);
                temporal.extend_from_slice(&[0.1, 0.2, 0.3, 0.4]);
                residuals.push(0.5 * driver - 0.1);
            }
        }
        (temporal, residuals)
    }

    fn quick_trainer() -> TemporalTrainer {
        TemporalTrainer::builder()
            .hidden_dim(8usize)
            .epochs(3usize)
            .batch_size(16usize)
            .build()
            .unwrap()
    }

    #[test]
    fn training_produces_finite_predictions() {
        let (temporal, residuals) = synthetic_blocks(32);
        let trained = quick_trainer()
            .train(&temporal, &residuals, 32, SEQ_LEN)
            .unwrap();

        let predictions = trained
            .model
            .predict_sequence(&temporal[..SEQ_LEN * N_TEMPORAL_FEATURES])
            .unwrap();
        assert_eq!(predictions.len(), SEQ_LEN);
        assert!(predictions.iter().all(|value| value.is_finite()));
    }

    #[test]
    fn non_finite_residuals_fail_fast() {
        let (temporal, mut residuals) = synthetic_blocks(8);
        residuals[11] = f32::NAN;

        let err = quick_trainer()
            .train(&temporal, &residuals, 8, SEQ_LEN)
            .unwrap_err();
        assert!(matches!(
            err,
            TemporalError::NonFiniteResidual { index: 11, .. }
        ));
    }

    #[test]
    fn residual_length_mismatch_is_rejected() {
        let (temporal, residuals) = synthetic_blocks(8);
        let err = quick_trainer()
            .train(&temporal, &residuals[..30], 8, SEQ_LEN)
            .unwrap_err();
        assert!(matches!(err, TemporalError::ResidualLenMismatch { .. }));
    }

    #[test]
    fn zero_windows_is_rejected() {
        let err = quick_trainer().train(&[], &[], 0, SEQ_LEN).unwrap_err();
        assert!(matches!(err, TemporalError::EmptyTraining));
    }
}
