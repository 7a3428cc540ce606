//! Windowing and scaling properties over realistic tables.

use floodcast::data::{ObservationRow, ObservationTable, RobustScaler, WindowSet};
use floodcast::testing::{assert_slice_approx_eq, synthetic_table};
use floodcast::{N_TEMPORAL_FEATURES, SEQ_LEN};

#[test]
fn windowing_is_idempotent_on_a_realistic_table() {
    let table = synthetic_table(4, 15, 11);
    let first = WindowSet::from_table(&table, SEQ_LEN);
    let second = WindowSet::from_table(&table, SEQ_LEN);

    assert_eq!(first, second);
    // 4 sequences of 15 rows: 10 windows each.
    assert_eq!(first.len(), 40);
}

#[test]
fn identical_sequences_under_different_ids_never_mix() {
    // Two sequences differing only in identifier: windows must be emitted
    // per sequence and carry identical content, with no cross-boundary
    // window appearing.
    let base = synthetic_table(1, 12, 5);
    let mut rows: Vec<ObservationRow> = base.rows().to_vec();
    for row in base.rows() {
        let mut twin = row.clone();
        twin.sequence_id = "site-twin".to_string();
        rows.push(twin);
    }
    let table = ObservationTable::from_rows(rows);

    let combined = WindowSet::from_table(&table, SEQ_LEN);
    let alone = WindowSet::from_table(&base, SEQ_LEN);

    assert_eq!(combined.len(), 2 * alone.len());
    for w in 0..alone.len() {
        // Group order is lexicographic: site-000 windows come first.
        assert_eq!(combined.temporal_block(w), alone.temporal_block(w));
        assert_eq!(
            combined.temporal_block(alone.len() + w),
            alone.temporal_block(w)
        );
        assert_eq!(combined.next_target(w), alone.next_target(w));
        assert_eq!(combined.next_target(alone.len() + w), alone.next_target(w));
    }
}

#[test]
fn groups_below_window_length_contribute_nothing() {
    let mut rows = synthetic_table(1, 9, 3).rows().to_vec();
    // A second group too short to produce a window.
    for row in synthetic_table(1, 4, 8).rows() {
        let mut short = row.clone();
        short.sequence_id = "site-short".to_string();
        rows.push(short);
    }
    let table = ObservationTable::from_rows(rows);

    let windows = WindowSet::from_table(&table, SEQ_LEN);
    assert_eq!(windows.len(), 9 - SEQ_LEN);
}

#[test]
fn globally_fitted_scaler_applies_unchanged_to_single_sequences() {
    let table = synthetic_table(5, 12, 21);
    let windows = WindowSet::from_table(&table, SEQ_LEN);

    let scaler = RobustScaler::fit(windows.temporal_flat(), N_TEMPORAL_FEATURES).unwrap();

    // Scaling one window alone must equal that window's slice of the
    // globally scaled block: the fitted state carries no per-request terms.
    let mut all = windows.temporal_flat().to_vec();
    scaler.transform(&mut all).unwrap();

    let w = windows.len() / 2;
    let mut single = windows.temporal_block(w).to_vec();
    scaler.transform(&mut single).unwrap();

    let stride = SEQ_LEN * N_TEMPORAL_FEATURES;
    assert_slice_approx_eq(
        &single,
        &all[w * stride..(w + 1) * stride],
        1e-6,
        "single-window scaling",
    );
}

#[test]
fn step_targets_align_with_window_rows() {
    let table = synthetic_table(2, 10, 17);
    let windows = WindowSet::from_table(&table, SEQ_LEN);

    // Per-step target rows overlap between consecutive windows of the same
    // sequence: window w+1 drops the first step of window w and appends one.
    for w in 0..(10 - SEQ_LEN - 1) {
        let current = windows.step_target_row(w);
        let next = windows.step_target_row(w + 1);
        assert_eq!(&current[1..], &next[..SEQ_LEN - 1]);
    }
}
