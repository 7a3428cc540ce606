//! Temporal residual model: recurrent attention over the driver sequence.

mod model;
mod trainer;

pub use model::{AttentionLstm, TemporalConfig};
pub use trainer::{TemporalError, TemporalTrainer, TemporalTrainerBuilder, TrainedTemporal};
