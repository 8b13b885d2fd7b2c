// crates/evolvedb-core/src/runtime/counter.rs
// ============================================================================
// Module: Cumulative Counter Normalizer
// Description: Reset detection and running-total computation for counters.
// Purpose: Turn resettable counter readings into monotonic running totals.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! A counter reading plus its field offset forms the running total that is
//! persisted. When any tracked reading plus offset falls below the last
//! persisted total, the counter is considered reset and every tracked offset
//! with a prior total is rebased onto that total. Reset detection is
//! all-or-nothing across tracked fields.
//!
//! With non-negative readings the persisted totals never decrease.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::cmp::Ordering;

use crate::core::FieldName;
use crate::core::Record;
use crate::core::Value;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result of normalizing one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// Running totals to persist, one entry per tracked field.
    pub totals: Record,
    /// A reset was detected in at least one tracked field.
    pub reset_detected: bool,
    /// Offsets in effect for this sample, one entry per tracked field.
    pub offsets: Record,
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Normalizes a counter sample against the last persisted totals.
///
/// `tracked` of `None` tracks every field of `current`. Tracked fields that
/// are absent or null in `current` are skipped, and `timestamp_field` is
/// never tracked. Missing offsets count as zero.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when a tracked reading, offset, or prior
/// total is not numeric, or when integer addition overflows.
pub fn normalize(
    current: &Record,
    offsets: &Record,
    last_totals: &Record,
    tracked: Option<&[FieldName]>,
    timestamp_field: Option<&FieldName>,
) -> Result<Normalized, StoreError> {
    let fields = tracked_fields(current, tracked, timestamp_field);

    let mut samples = Vec::with_capacity(fields.len());
    for field in fields {
        let Some(reading) = current.get_non_null(field.as_str()) else {
            continue;
        };
        let reading = numeric(field, "reading", reading)?;
        let offset = match offsets.get_non_null(field.as_str()) {
            Some(offset) => numeric(field, "offset", offset)?,
            None => Value::Integer(0),
        };
        let last = match last_totals.get_non_null(field.as_str()) {
            Some(last) => Some(numeric(field, "running total", last)?),
            None => None,
        };
        samples.push(Sample { field, reading, offset, last });
    }

    let mut reset_detected = false;
    for sample in &samples {
        if let Some(last) = &sample.last
            && compare(&add(sample.field, &sample.reading, &sample.offset)?, last)
                == Ordering::Less
        {
            reset_detected = true;
            break;
        }
    }

    let mut totals = Record::new();
    let mut new_offsets = Record::new();
    for sample in samples {
        let offset = match (reset_detected, sample.last) {
            (true, Some(last)) => last,
            (_, _) => sample.offset,
        };
        totals.insert(sample.field.clone(), add(sample.field, &sample.reading, &offset)?);
        new_offsets.insert(sample.field.clone(), offset);
    }

    Ok(Normalized { totals, reset_detected, offsets: new_offsets })
}

/// Per-field inputs gathered before reset detection.
struct Sample<'a> {
    /// Tracked field.
    field: &'a FieldName,
    /// Raw reading.
    reading: Value,
    /// Offset currently in effect.
    offset: Value,
    /// Last persisted running total, if any.
    last: Option<Value>,
}

/// Resolves the tracked field list.
fn tracked_fields<'a>(
    current: &'a Record,
    tracked: Option<&'a [FieldName]>,
    timestamp_field: Option<&FieldName>,
) -> Vec<&'a FieldName> {
    let candidates: Vec<&FieldName> = match tracked {
        Some(fields) => fields.iter().collect(),
        None => current.keys().collect(),
    };
    candidates
        .into_iter()
        .filter(|field| timestamp_field.is_none_or(|stamp| !stamp.matches(field.as_str())))
        .collect()
}

/// Ensures a counter input is numeric.
fn numeric(field: &FieldName, role: &str, value: &Value) -> Result<Value, StoreError> {
    match value {
        Value::Integer(_) | Value::Float(_) => Ok(value.clone()),
        Value::Null | Value::Text(_) => Err(StoreError::Invalid(format!(
            "cumulative field {field} has non-numeric {role} ({})",
            value.kind()
        ))),
    }
}

/// Adds two numeric values; integers stay integers.
fn add(field: &FieldName, left: &Value, right: &Value) -> Result<Value, StoreError> {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => a
            .checked_add(*b)
            .map(Value::Integer)
            .ok_or_else(|| StoreError::Invalid(format!("cumulative field {field} overflowed"))),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float(a + b)),
            _ => Err(StoreError::Invalid(format!("cumulative field {field} is not numeric"))),
        },
    }
}

/// Compares two numeric values; NaN compares equal so it never signals a reset.
fn compare(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    fn name(raw: &str) -> FieldName {
        FieldName::parse(raw).unwrap()
    }

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs.iter().map(|(field, value)| (name(field), value.clone())).collect()
    }

    #[test]
    fn reset_sequence_produces_monotonic_totals() {
        let mut offsets = Record::new();
        let mut last = Record::new();
        let mut totals = Vec::new();
        for raw in [10, 20, 5, 15] {
            let current = record(&[("bytes", Value::Integer(raw))]);
            let normalized = normalize(&current, &offsets, &last, None, None).unwrap();
            if normalized.reset_detected {
                offsets = normalized.offsets.clone();
            }
            totals.push(normalized.totals.get("bytes").cloned().unwrap());
            last = normalized.totals;
        }
        assert_eq!(
            totals,
            vec![Value::Integer(10), Value::Integer(20), Value::Integer(25), Value::Integer(35)]
        );
    }

    #[test]
    fn first_sample_has_no_reset_and_zero_offsets() {
        let current = record(&[("rx", Value::Integer(7)), ("tx", Value::Float(1.5))]);
        let normalized = normalize(&current, &Record::new(), &Record::new(), None, None).unwrap();
        assert!(!normalized.reset_detected);
        assert_eq!(normalized.totals, current);
        assert_eq!(
            normalized.offsets,
            record(&[("rx", Value::Integer(0)), ("tx", Value::Integer(0))])
        );
    }

    #[test]
    fn reset_in_one_field_rebases_every_tracked_field() {
        let current = record(&[("rx", Value::Integer(1)), ("tx", Value::Integer(500))]);
        let last = record(&[("rx", Value::Integer(100)), ("tx", Value::Integer(200))]);
        let normalized = normalize(&current, &Record::new(), &last, None, None).unwrap();
        assert!(normalized.reset_detected);
        assert_eq!(normalized.offsets, last);
        assert_eq!(
            normalized.totals,
            record(&[("rx", Value::Integer(101)), ("tx", Value::Integer(700))])
        );
    }

    #[test]
    fn untracked_and_timestamp_fields_are_left_alone() {
        let current = record(&[
            ("rx", Value::Integer(5)),
            ("label", Value::Text("eth0".to_string())),
            ("ts", Value::Integer(1_700_000_000)),
        ]);
        let tracked = [name("rx"), name("ts")];
        let stamp = name("ts");
        let normalized =
            normalize(&current, &Record::new(), &Record::new(), Some(&tracked), Some(&stamp))
                .unwrap();
        assert_eq!(normalized.totals, record(&[("rx", Value::Integer(5))]));
    }

    #[test]
    fn timestamp_field_never_triggers_a_reset_even_when_listed() {
        let current = record(&[("rx", Value::Integer(50)), ("ts", Value::Integer(10))]);
        let last = record(&[("rx", Value::Integer(40)), ("ts", Value::Integer(1_700_000_000))]);
        let tracked = [name("rx"), name("ts")];
        let stamp = name("ts");
        let normalized =
            normalize(&current, &Record::new(), &last, Some(&tracked), Some(&stamp)).unwrap();
        assert!(!normalized.reset_detected);
        assert!(normalized.offsets.get("ts").is_none());
        assert_eq!(normalized.totals, record(&[("rx", Value::Integer(50))]));
    }

    #[test]
    fn tracked_fields_missing_from_sample_are_skipped() {
        let current = record(&[("rx", Value::Integer(5))]);
        let tracked = [name("rx"), name("tx")];
        let last = record(&[("tx", Value::Integer(900))]);
        let normalized =
            normalize(&current, &Record::new(), &last, Some(&tracked), None).unwrap();
        assert!(!normalized.reset_detected);
        assert!(normalized.totals.get("tx").is_none());
    }

    #[test]
    fn null_prior_total_cannot_signal_reset() {
        let current = record(&[("rx", Value::Integer(1))]);
        let last = record(&[("rx", Value::Null)]);
        let normalized = normalize(&current, &Record::new(), &last, None, None).unwrap();
        assert!(!normalized.reset_detected);
    }

    #[test]
    fn mixed_integer_and_float_totals_become_float() {
        let current = record(&[("energy", Value::Integer(2))]);
        let offsets = record(&[("energy", Value::Float(0.5))]);
        let normalized = normalize(&current, &offsets, &Record::new(), None, None).unwrap();
        assert_eq!(normalized.totals.get("energy"), Some(&Value::Float(2.5)));
    }

    #[test]
    fn text_reading_is_rejected() {
        let current = record(&[("rx", Value::Text("n/a".to_string()))]);
        let result = normalize(&current, &Record::new(), &Record::new(), None, None);
        assert!(matches!(result, Err(StoreError::Invalid(_))));
    }

    #[test]
    fn integer_overflow_is_rejected() {
        let current = record(&[("rx", Value::Integer(i64::MAX))]);
        let offsets = record(&[("rx", Value::Integer(1))]);
        let result = normalize(&current, &offsets, &Record::new(), None, None);
        assert!(matches!(result, Err(StoreError::Invalid(_))));
    }
}
