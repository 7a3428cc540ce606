//! Testing utilities for floodcast.
//!
//! Assertion helpers and a synthetic observation-table generator shared by
//! unit tests and the integration suites under `tests/`.

use approx::AbsDiffEq;
use chrono::NaiveDate;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::data::{ObservationRow, ObservationTable};

/// Default tolerance for floating point comparisons.
pub const DEFAULT_TOLERANCE: f32 = 1e-5;

/// Assert that two f32 values are approximately equal.
///
/// # Panics
///
/// Panics if the absolute difference exceeds tolerance.
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $tolerance:expr) => {{
        let left_val = $left;
        let right_val = $right;
        let tol = $tolerance;
        let diff = (left_val - right_val).abs();
        if diff > tol {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`\n right: `{:?}`\n  diff: `{:?}` > tolerance `{:?}`",
                left_val, right_val, diff, tol
            );
        }
    }};
}

/// Assert that two slices of f32 values are approximately equal element-wise.
///
/// # Panics
///
/// Panics if lengths differ or any element differs by more than tolerance.
pub fn assert_slice_approx_eq(actual: &[f32], expected: &[f32], tolerance: f32, context: &str) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{context}: length mismatch - got {}, expected {}",
        actual.len(),
        expected.len()
    );

    for (i, (a, e)) in actual.iter().zip(expected.iter()).enumerate() {
        assert!(
            a.abs_diff_eq(e, tolerance),
            "{context}[{i}]: {a} ≠ {e} (tolerance={tolerance})"
        );
    }
}

/// Generate a synthetic observation table with a learnable signal.
///
/// Each sequence gets its own static site profile; rainfall and river level
/// carry most of the rise signal, with the site's imperviousness scaling
/// the response and a small seeded noise term on top.
pub fn synthetic_table(n_sequences: usize, rows_per_sequence: usize, seed: u64) -> ObservationTable {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let base_date = NaiveDate::from_ymd_opt(2023, 6, 1).unwrap();
    let mut rows = Vec::with_capacity(n_sequences * rows_per_sequence);

    for seq in 0..n_sequences {
        let elevation = rng.gen_range(2.0..60.0f32);
        let impervious_pct = rng.gen_range(5.0..95.0f32);
        let drainage_capacity = rng.gen_range(0.1..1.0f32);
        let avg_slope = rng.gen_range(0.5..8.0f32);

        let mut antecedent = 0.0f32;
        for day in 0..rows_per_sequence {
            let rainfall = rng.gen_range(0.0..25.0f32);
            let temperature = 12.0 + 8.0 * ((day as f32 / 9.0).sin()) + rng.gen_range(-2.0..2.0);
            antecedent = 0.7 * antecedent + 0.3 * rainfall;
            let river_level = 1.5 + 0.04 * rainfall + rng.gen_range(-0.1..0.1);
            let groundwater_depth = 5.0 - 0.02 * antecedent + rng.gen_range(-0.2..0.2);

            let rise = 0.01 * rainfall * (impervious_pct / 100.0)
                + 0.12 * (river_level - 1.5)
                + 0.05 * antecedent / 10.0
                - 0.002 * elevation / 10.0
                + rng.gen_range(-0.01..0.01);

            rows.push(ObservationRow {
                sequence_id: format!("site-{seq:03}"),
                date: base_date + chrono::Days::new(day as u64),
                elevation,
                impervious_pct,
                drainage_capacity,
                avg_slope,
                rainfall,
                temperature,
                antecedent_precipitation: antecedent,
                river_level,
                groundwater_depth,
                rise,
            });
        }
    }

    ObservationTable::from_rows(rows)
}
