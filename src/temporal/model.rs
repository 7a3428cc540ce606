//! Recurrent attention model over the temporal driver block.
//!
//! An LSTM produces one hidden state per timestep; a learned projection
//! scores each timestep and a softmax across the time axis turns the scores
//! into attention weights. The hidden states are scaled by the weights,
//! concatenated with the unweighted states, and projected per timestep to a
//! single value. The model is trained on the residual left unexplained by
//! the static regressor, never on the raw target.

use candle_core::{DType, Device, Tensor, D};
use candle_nn::{linear, lstm, Linear, Module, VarBuilder, LSTM, LSTMConfig, RNN};
use serde::{Deserialize, Serialize};

/// Model hyperparameters, persisted in the artifact manifest so the graph
/// can be rebuilt before its weights are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalConfig {
    /// Input channels per timestep.
    pub input_dim: usize,
    /// LSTM hidden width.
    pub hidden_dim: usize,
    /// Fixed sequence length.
    pub seq_len: usize,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            input_dim: crate::N_TEMPORAL_FEATURES,
            hidden_dim: 64,
            seq_len: crate::SEQ_LEN,
        }
    }
}

/// LSTM + per-timestep attention + output projection.
#[derive(Debug)]
pub struct AttentionLstm {
    lstm: LSTM,
    attention: Linear,
    projection: Linear,
    config: TemporalConfig,
}

impl AttentionLstm {
    /// Build the graph under `vb`. Variable names are stable so persisted
    /// weights can be reloaded into a freshly built model.
    pub fn new(config: TemporalConfig, vb: VarBuilder) -> candle_core::Result<Self> {
        let lstm = lstm(
            config.input_dim,
            config.hidden_dim,
            LSTMConfig::default(),
            vb.pp("lstm"),
        )?;
        let attention = linear(config.hidden_dim, 1, vb.pp("attention"))?;
        let projection = linear(2 * config.hidden_dim, 1, vb.pp("projection"))?;

        Ok(Self {
            lstm,
            attention,
            projection,
            config,
        })
    }

    /// Model hyperparameters.
    pub fn config(&self) -> TemporalConfig {
        self.config
    }

    /// Forward pass.
    ///
    /// `input` has shape `(batch, seq_len, input_dim)`; the output has shape
    /// `(batch, seq_len)`, one residual prediction per timestep.
    pub fn forward(&self, input: &Tensor) -> candle_core::Result<Tensor> {
        let (_batch, seq_len, input_dim) = input.dims3()?;
        if seq_len != self.config.seq_len || input_dim != self.config.input_dim {
            candle_core::bail!(
                "temporal input must be (batch, {}, {}), got (batch, {}, {})",
                self.config.seq_len,
                self.config.input_dim,
                seq_len,
                input_dim
            );
        }

        // Per-timestep hidden representation: (batch, seq, hidden).
        let states = self.lstm.seq(input)?;
        let hidden = self.lstm.states_to_tensor(&states)?;

        // Scalar score per timestep, normalized across the time axis.
        let scores = self.attention.forward(&hidden)?;
        let weights = candle_nn::ops::softmax(&scores, 1)?;

        // Weighted states rejoin the unweighted ones before projection.
        let weighted = hidden.broadcast_mul(&weights)?;
        let merged = Tensor::cat(&[&weighted, &hidden], D::Minus1)?;

        self.projection.forward(&merged)?.squeeze(D::Minus1)
    }

    /// Predict residuals for a flat batch of temporal blocks.
    ///
    /// `temporal` holds `n_windows` timestep-major blocks; the result is
    /// flat `(n_windows * seq_len)` in window order.
    pub fn predict_batch(
        &self,
        temporal: &[f32],
        n_windows: usize,
        device: &Device,
    ) -> candle_core::Result<Vec<f32>> {
        let input = Tensor::from_vec(
            temporal.to_vec(),
            (n_windows, self.config.seq_len, self.config.input_dim),
            device,
        )?;
        let output = self.forward(&input)?;
        Ok(output.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?)
    }

    /// Predict the per-step residuals of a single sequence.
    pub fn predict_sequence(&self, temporal: &[f32]) -> candle_core::Result<Vec<f32>> {
        self.predict_batch(temporal, 1, &Device::Cpu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::VarMap;

    fn build_model(config: TemporalConfig) -> (AttentionLstm, VarMap) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = AttentionLstm::new(config, vb).unwrap();
        (model, varmap)
    }

    #[test]
    fn forward_output_shape_is_batch_by_seq() {
        let config = TemporalConfig {
            input_dim: 5,
            hidden_dim: 8,
            seq_len: 5,
        };
        let (model, _varmap) = build_model(config);

        let input = Tensor::zeros((3, 5, 5), DType::F32, &Device::Cpu).unwrap();
        let output = model.forward(&input).unwrap();
        assert_eq!(output.dims(), &[3, 5]);
    }

    #[test]
    fn predict_sequence_returns_seq_len_values() {
        let (model, _varmap) = build_model(TemporalConfig {
            input_dim: 5,
            hidden_dim: 8,
            seq_len: 5,
        });

        let block = vec![0.25f32; 25];
        let residuals = model.predict_sequence(&block).unwrap();
        assert_eq!(residuals.len(), 5);
        assert!(residuals.iter().all(|value| value.is_finite()));
    }

    #[test]
    fn wrong_sequence_length_is_rejected() {
        let (model, _varmap) = build_model(TemporalConfig {
            input_dim: 5,
            hidden_dim: 8,
            seq_len: 5,
        });

        let input = Tensor::zeros((1, 4, 5), DType::F32, &Device::Cpu).unwrap();
        assert!(model.forward(&input).is_err());
    }

    #[test]
    fn reloaded_weights_reproduce_predictions() {
        let config = TemporalConfig {
            input_dim: 5,
            hidden_dim: 8,
            seq_len: 5,
        };
        let (model, varmap) = build_model(config);
        let block: Vec<f32> = (0..25).map(|i| i as f32 / 25.0).collect();
        let expected = model.predict_sequence(&block).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("temporal.safetensors");
        varmap.save(&path).unwrap();

        let (restored, mut restored_map) = build_model(config);
        restored_map.load(&path).unwrap();
        let actual = restored.predict_sequence(&block).unwrap();

        for (a, e) in actual.iter().zip(&expected) {
            assert!((a - e).abs() < 1e-6);
        }
    }
}
