// crates/evolvedb-core/tests/proptest_counter.rs
// ============================================================================
// Module: Counter Normalizer Property-Based Tests
// Description: Property tests for running-total monotonicity across resets.
// Purpose: Detect panics and invariant violations across wide input ranges.
// ============================================================================

//! Property-based tests for cumulative counter invariants.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use evolvedb_core::FieldName;
use evolvedb_core::Record;
use evolvedb_core::Value;
use evolvedb_core::normalize;
use proptest::prelude::*;

fn field(raw: &str) -> FieldName {
    FieldName::parse(raw).unwrap()
}

/// Replays a reading sequence the way the write path persists it.
fn replay(readings: &[(i64, i64)]) -> Vec<(i64, i64, bool)> {
    let mut offsets = Record::new();
    let mut last = Record::new();
    let mut persisted = Vec::with_capacity(readings.len());
    for (rx, tx) in readings {
        let current = Record::new().with("rx", *rx).unwrap().with("tx", *tx).unwrap();
        let normalized = normalize(&current, &offsets, &last, None, None).unwrap();
        if normalized.reset_detected {
            offsets = normalized.offsets.clone();
        }
        let rx_total = normalized.totals.get("rx").and_then(Value::as_i64).unwrap();
        let tx_total = normalized.totals.get("tx").and_then(Value::as_i64).unwrap();
        persisted.push((rx_total, tx_total, normalized.reset_detected));
        last = normalized.totals;
    }
    persisted
}

proptest! {
    #[test]
    fn totals_never_decrease_for_non_negative_readings(
        readings in prop::collection::vec((0_i64 .. 1_000_000, 0_i64 .. 1_000_000), 1 .. 64)
    ) {
        let persisted = replay(&readings);
        for window in persisted.windows(2) {
            prop_assert!(window[1].0 >= window[0].0, "rx total decreased: {window:?}");
            prop_assert!(window[1].1 >= window[0].1, "tx total decreased: {window:?}");
        }
    }

    #[test]
    fn first_sample_is_persisted_verbatim(
        rx in 0_i64 .. i64::MAX / 2,
        tx in 0_i64 .. i64::MAX / 2,
    ) {
        let persisted = replay(&[(rx, tx)]);
        prop_assert_eq!(persisted, vec![(rx, tx, false)]);
    }

    #[test]
    fn monotonic_readings_never_reset(
        mut readings in prop::collection::vec(0_i64 .. 1_000_000, 1 .. 64)
    ) {
        readings.sort_unstable();
        let pairs: Vec<(i64, i64)> = readings.iter().map(|value| (*value, *value)).collect();
        let persisted = replay(&pairs);
        for ((rx, tx), (rx_total, tx_total, reset)) in pairs.iter().zip(persisted) {
            prop_assert!(!reset);
            prop_assert_eq!(*rx, rx_total);
            prop_assert_eq!(*tx, tx_total);
        }
    }

    #[test]
    fn tracked_subset_leaves_other_fields_out_of_totals(
        rx in 0_i64 .. 1_000,
        label in "[a-z]{1,8}",
    ) {
        let current = Record::new().with("rx", rx).unwrap().with("label", label).unwrap();
        let tracked = [field("rx")];
        let normalized =
            normalize(&current, &Record::new(), &Record::new(), Some(&tracked), None).unwrap();
        prop_assert_eq!(normalized.totals.len(), 1);
        prop_assert_eq!(normalized.totals.get("rx"), Some(&Value::Integer(rx)));
    }
}
