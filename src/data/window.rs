//! Sequence windowing.
//!
//! Turns the raw observation table into fixed-length training windows:
//! rows are grouped by sequence identifier, sorted by date, and every
//! in-sequence offset yields one window. Windows never cross a sequence
//! boundary, and groups too short to fill a window contribute nothing.

use std::collections::BTreeMap;

use crate::data::table::ObservationTable;
use crate::{N_STATIC_FEATURES, N_TEMPORAL_FEATURES};

/// Fixed-length windows in flat row-major blocks.
///
/// Per window `w`:
/// - a static row of [`N_STATIC_FEATURES`] values (the group's first row),
/// - a temporal block of `seq_len` timesteps by [`N_TEMPORAL_FEATURES`]
///   drivers, timestep-major,
/// - the per-step target slice (rise at each of the window's timesteps),
/// - the next-step label (rise at offset `w_start + seq_len`).
///
/// The whole-sequence variant built by [`WindowSet::whole_sequence`] carries
/// a single label-free window and is used by the serving path so feature
/// assembly cannot diverge from training.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSet {
    seq_len: usize,
    n_windows: usize,
    statics: Vec<f32>,
    temporal: Vec<f32>,
    step_targets: Vec<f32>,
    next_targets: Vec<f32>,
}

impl WindowSet {
    /// Build sliding windows over every sequence group of `table`.
    ///
    /// Groups are visited in sequence-id order and rows within a group in
    /// date order (ties keep input order), so repeated runs over the same
    /// table produce identical windows. Groups with `len <= seq_len` rows
    /// are skipped silently.
    pub fn from_table(table: &ObservationTable, seq_len: usize) -> Self {
        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (idx, row) in table.rows().iter().enumerate() {
            groups.entry(row.sequence_id.as_str()).or_default().push(idx);
        }

        let rows = table.rows();
        let mut out = Self::empty(seq_len);

        for indices in groups.values() {
            let mut ordered = indices.clone();
            ordered.sort_by_key(|&i| rows[i].date);

            let n_windows = ordered.len().saturating_sub(seq_len);
            for start in 0..n_windows {
                let window = &ordered[start..start + seq_len];

                out.statics
                    .extend_from_slice(&rows[ordered[0]].static_features());
                for &row_idx in window {
                    out.temporal
                        .extend_from_slice(&rows[row_idx].temporal_features());
                    out.step_targets.push(rows[row_idx].rise);
                }
                out.next_targets.push(rows[ordered[start + seq_len]].rise);
                out.n_windows += 1;
            }
        }

        out
    }

    /// Build the single label-free window used at inference time.
    ///
    /// `temporal` is a timestep-major block of exactly
    /// `seq_len * N_TEMPORAL_FEATURES` values.
    ///
    /// # Panics
    ///
    /// Panics if `temporal` has the wrong length. Serving code only reaches
    /// this through a validated request, so a mismatch is a programming
    /// error, not an input error.
    pub fn whole_sequence(
        static_row: [f32; N_STATIC_FEATURES],
        temporal: Vec<f32>,
        seq_len: usize,
    ) -> Self {
        assert_eq!(
            temporal.len(),
            seq_len * N_TEMPORAL_FEATURES,
            "temporal block must be seq_len x n_drivers"
        );

        Self {
            seq_len,
            n_windows: 1,
            statics: static_row.to_vec(),
            temporal,
            step_targets: Vec::new(),
            next_targets: Vec::new(),
        }
    }

    fn empty(seq_len: usize) -> Self {
        Self {
            seq_len,
            n_windows: 0,
            statics: Vec::new(),
            temporal: Vec::new(),
            step_targets: Vec::new(),
            next_targets: Vec::new(),
        }
    }

    /// Number of windows.
    pub fn len(&self) -> usize {
        self.n_windows
    }

    /// Returns true if no window was produced.
    pub fn is_empty(&self) -> bool {
        self.n_windows == 0
    }

    /// Window length in timesteps.
    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Returns true if the windows carry targets (sliding mode).
    pub fn has_targets(&self) -> bool {
        !self.step_targets.is_empty()
    }

    /// Static row of window `w`.
    pub fn static_row(&self, w: usize) -> &[f32] {
        &self.statics[w * N_STATIC_FEATURES..(w + 1) * N_STATIC_FEATURES]
    }

    /// Temporal block of window `w`, timestep-major.
    pub fn temporal_block(&self, w: usize) -> &[f32] {
        let stride = self.seq_len * N_TEMPORAL_FEATURES;
        &self.temporal[w * stride..(w + 1) * stride]
    }

    /// Per-step targets of window `w`.
    pub fn step_target_row(&self, w: usize) -> &[f32] {
        &self.step_targets[w * self.seq_len..(w + 1) * self.seq_len]
    }

    /// Next-step label of window `w`.
    pub fn next_target(&self, w: usize) -> f32 {
        self.next_targets[w]
    }

    /// All static rows, flat row-major (`n_windows x N_STATIC_FEATURES`).
    pub fn statics_flat(&self) -> &[f32] {
        &self.statics
    }

    /// All temporal blocks, flat (`n_windows * seq_len` timestep rows of
    /// [`N_TEMPORAL_FEATURES`] values each).
    pub fn temporal_flat(&self) -> &[f32] {
        &self.temporal
    }

    /// All per-step targets, flat (`n_windows * seq_len`).
    pub fn step_targets_flat(&self) -> &[f32] {
        &self.step_targets
    }

    /// All next-step labels (`n_windows`).
    pub fn next_targets_flat(&self) -> &[f32] {
        &self.next_targets
    }
}
