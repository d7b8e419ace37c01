//! Pending-Key Reconciliation
//!
//! The two runs may emit the same logical row at different positions (a row
//! inserted or dropped on one side shifts everything after it). When the
//! primary keys of a positional pair disagree, both records are parked in
//! the stream's pending maps and matched by key as counterparts arrive.
//!
//! Invariant: after every call into this module no key is present in both
//! `pending_left` and `pending_right`. Whatever is left at the end of the run
//! is a row that exists on one side only.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, warn};

use super::differ::diff_records;
use super::stats::StreamStats;
use crate::protocol::{RecordEvent, SourceLabel};

/// Canonical JSON encoding of a primary-key value.
///
/// Integral floats are written in integer form, so `1` and `1.0` share a key
/// while `1` and `"1"` do not.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PrimaryKey(String);

impl PrimaryKey {
    /// Key of `record` under `field`, or `None` when the field is absent.
    pub fn extract(record: &RecordEvent, field: &str) -> Option<Self> {
        record
            .fields
            .get(field)
            .map(|value| Self(canonical(value).to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Largest magnitude below which every integral f64 is exact.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

fn canonical(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.is_f64() => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT => Value::from(f as i64),
            _ => value.clone(),
        },
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), canonical(v)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

/// What happened to a positional pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    /// Keys matched; the pair was diffed in place.
    Diffed,
    /// Keys differed; both records were parked. `reconciled` is the number
    /// of buffered pairs matched and diffed as a result.
    Buffered { reconciled: usize },
    /// At least one record lacks the key field; diffed positionally.
    Unkeyed,
}

/// Diff or park a positionally paired record pair.
pub fn reconcile_pair(
    stats: &mut StreamStats,
    left: RecordEvent,
    right: RecordEvent,
    primary_key: &str,
) -> PairOutcome {
    match (
        PrimaryKey::extract(&left, primary_key),
        PrimaryKey::extract(&right, primary_key),
    ) {
        (Some(left_key), Some(right_key)) if left_key == right_key => {
            diff_records(&left, &right, stats);
            PairOutcome::Diffed
        }
        (Some(left_key), Some(right_key)) => {
            debug!(
                stream = %stats.stream,
                left_key = %left_key,
                right_key = %right_key,
                "primary keys out of step, buffering"
            );
            park(stats, SourceLabel::Left, left_key, left);
            park(stats, SourceLabel::Right, right_key, right);
            PairOutcome::Buffered {
                reconciled: drain_matches(stats),
            }
        }
        _ => {
            warn!(
                stream = %stats.stream,
                primary_key,
                "record without primary key, comparing positionally"
            );
            diff_records(&left, &right, stats);
            PairOutcome::Unkeyed
        }
    }
}

/// Park a record whose positional counterpart never arrived.
///
/// Returns the number of pairs reconciled, or `None` when the record has no
/// key and therefore cannot be tracked.
pub fn buffer_record(
    stats: &mut StreamStats,
    side: SourceLabel,
    record: RecordEvent,
    primary_key: &str,
) -> Option<usize> {
    let key = PrimaryKey::extract(&record, primary_key)?;
    park(stats, side, key, record);
    Some(drain_matches(stats))
}

fn park(stats: &mut StreamStats, side: SourceLabel, key: PrimaryKey, record: RecordEvent) {
    let stream = stats.stream.clone();
    if stats.pending_mut(side).insert(key.clone(), record).is_some() {
        warn!(%stream, source = %side, %key, "duplicate primary key, keeping latest record");
    }
}

/// Diff and drop every key present in both pending maps.
pub fn drain_matches(stats: &mut StreamStats) -> usize {
    let matched: Vec<PrimaryKey> = stats
        .pending_left
        .keys()
        .filter(|key| stats.pending_right.contains_key(*key))
        .cloned()
        .collect();

    for key in &matched {
        if let (Some(left), Some(right)) = (
            stats.pending_left.remove(key),
            stats.pending_right.remove(key),
        ) {
            debug!(stream = %stats.stream, %key, "reconciled buffered record");
            diff_records(&left, &right, stats);
        }
    }

    matched.len()
}
