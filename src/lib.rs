//! floodcast: hybrid water-level rise prediction.
//!
//! This crate implements the training and serving pipeline for short-horizon
//! water-level rise prediction at a monitoring point. A bagged ensemble of
//! regression trees captures the level contributed by fixed site
//! characteristics, and a recurrent attention model learns the per-timestep
//! residual driven by the hydrological time series. The two predictions are
//! recombined at inference time under the same semantics used in training.

pub mod artifacts;
pub mod data;
pub mod ensemble;
pub mod forest;
pub mod model;
pub mod serve;
pub mod temporal;
pub mod testing;

/// Fixed temporal window length, in timesteps.
pub const SEQ_LEN: usize = 5;

/// Number of static site features: elevation, impervious fraction,
/// drainage capacity, average slope.
pub const N_STATIC_FEATURES: usize = 4;

/// Number of per-timestep hydrological drivers: rainfall, temperature,
/// antecedent precipitation, river level, groundwater depth.
pub const N_TEMPORAL_FEATURES: usize = 5;
