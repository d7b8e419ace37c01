//! Per-stream comparison counters and the run-scoped aggregator that owns them.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::reconcile::{self, PairOutcome, PrimaryKey};
use crate::protocol::{Event, Message, RecordEvent, SourceLabel};
use crate::report::FinalizedReport;

/// Column name -> counter.
pub type ColumnCounts = BTreeMap<String, u64>;

/// Accumulated comparison state for one stream.
#[derive(Debug, Clone, Default)]
pub struct StreamStats {
    pub stream: String,
    /// Positionally paired records seen for this stream.
    pub record_count: u64,
    pub diff_count: ColumnCounts,
    pub equal_count: ColumnCounts,
    /// Field present on the right, absent on the left.
    pub left_missing_count: ColumnCounts,
    /// Field present on the left, absent on the right.
    pub right_missing_count: ColumnCounts,
    /// Left records still waiting for a right record with the same key.
    pub pending_left: BTreeMap<PrimaryKey, RecordEvent>,
    /// Right records still waiting for a left record with the same key.
    pub pending_right: BTreeMap<PrimaryKey, RecordEvent>,
}

impl StreamStats {
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            ..Default::default()
        }
    }

    /// Make sure `column` has an entry in all four counter maps.
    pub(crate) fn touch_column(&mut self, column: &str) {
        for counts in [
            &mut self.diff_count,
            &mut self.equal_count,
            &mut self.left_missing_count,
            &mut self.right_missing_count,
        ] {
            if !counts.contains_key(column) {
                counts.insert(column.to_owned(), 0);
            }
        }
    }

    /// Every column observed so far, in name order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.diff_count.keys().map(String::as_str)
    }

    pub(crate) fn pending_mut(
        &mut self,
        side: SourceLabel,
    ) -> &mut BTreeMap<PrimaryKey, RecordEvent> {
        match side {
            SourceLabel::Left => &mut self.pending_left,
            SourceLabel::Right => &mut self.pending_right,
        }
    }
}

pub(crate) fn increment(counts: &mut ColumnCounts, column: &str) {
    if let Some(count) = counts.get_mut(column) {
        *count += 1;
    } else {
        counts.insert(column.to_owned(), 1);
    }
}

/// Run-level counters, independent of stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Lock-step iterations that produced a message on both sides.
    pub iterations: u64,
    pub record_pairs: u64,
    pub control_pairs: u64,
    /// Positional record pairs whose data matched exactly.
    pub identical_records: u64,
    /// Positional record pairs whose data differed (including key misalignment).
    pub differing_records: u64,
    /// Buffered record pairs later matched by primary key. Each pair is one
    /// left record and one right record.
    pub reconciled_records: u64,
    /// Records that lacked the primary-key field.
    pub unkeyed_records: u64,
}

// =============================================================================
// AGGREGATOR
// =============================================================================

/// Owns the [`StreamStats`] of one regression run.
///
/// Each run constructs its own aggregator; [`StatsAggregator::finalize`]
/// consumes it, so no counter can change after the report is produced.
#[derive(Debug, Clone)]
pub struct StatsAggregator {
    primary_key: Arc<str>,
    streams: BTreeMap<String, StreamStats>,
    summary: RunSummary,
}

impl StatsAggregator {
    pub fn new(primary_key: impl Into<String>) -> Self {
        Self {
            primary_key: Arc::from(primary_key.into()),
            streams: BTreeMap::new(),
            summary: RunSummary::default(),
        }
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn stream(&self, stream: &str) -> Option<&StreamStats> {
        self.streams.get(stream)
    }

    pub fn streams(&self) -> impl Iterator<Item = &StreamStats> {
        self.streams.values()
    }

    /// Stats for `stream`, created on first use.
    pub fn stats_for(&mut self, stream: &str) -> &mut StreamStats {
        self.streams.entry(stream.to_owned()).or_insert_with(|| {
            debug!(stream, "first record for stream");
            StreamStats::new(stream)
        })
    }

    pub(crate) fn note_iteration(&mut self) {
        self.summary.iterations += 1;
    }

    pub(crate) fn note_control_pair(&mut self) {
        self.summary.control_pairs += 1;
    }

    /// Diff a positionally paired record pair. Both records must belong to
    /// the same stream.
    pub fn record_pair(&mut self, left: RecordEvent, right: RecordEvent) {
        debug_assert_eq!(left.stream_name, right.stream_name);

        self.summary.record_pairs += 1;
        if left.same_data(&right) {
            self.summary.identical_records += 1;
        } else {
            self.summary.differing_records += 1;
        }

        let primary_key = Arc::clone(&self.primary_key);
        let stats = self.stats_for(&left.stream_name);
        stats.record_count += 1;
        match reconcile::reconcile_pair(stats, left, right, &primary_key) {
            PairOutcome::Diffed => {}
            PairOutcome::Buffered { reconciled } => {
                self.summary.reconciled_records += reconciled as u64;
            }
            PairOutcome::Unkeyed => self.summary.unkeyed_records += 1,
        }
    }

    /// Buffer a record whose counterpart source ended in the same iteration.
    pub fn buffer_unpaired(&mut self, message: Message) {
        let Event::Record(record) = message.event else {
            return;
        };
        let side = message.source_label;
        let primary_key = Arc::clone(&self.primary_key);
        let stats = self.stats_for(&record.stream_name);
        match reconcile::buffer_record(stats, side, record, &primary_key) {
            Some(reconciled) => self.summary.reconciled_records += reconciled as u64,
            None => {
                warn!(source = %side, "unpaired record has no primary key, not reported");
                self.summary.unkeyed_records += 1;
            }
        }
    }

    /// Freeze the counters into a report.
    pub fn finalize(self) -> FinalizedReport {
        FinalizedReport::new(self.primary_key.to_string(), self.summary, self.streams.into_values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(stream: &str, data: serde_json::Value) -> RecordEvent {
        RecordEvent::from_value(stream, data)
    }

    #[test]
    fn test_touch_column_initialises_all_counters() {
        let mut stats = StreamStats::new("users");
        stats.touch_column("email");
        assert_eq!(stats.diff_count.get("email"), Some(&0));
        assert_eq!(stats.equal_count.get("email"), Some(&0));
        assert_eq!(stats.left_missing_count.get("email"), Some(&0));
        assert_eq!(stats.right_missing_count.get("email"), Some(&0));

        stats.equal_count.insert("email".into(), 3);
        stats.touch_column("email");
        assert_eq!(stats.equal_count.get("email"), Some(&3));
    }

    #[test]
    fn test_stats_created_per_stream() {
        let mut agg = StatsAggregator::new("id");
        agg.record_pair(
            record("users", json!({"id": 1})),
            record("users", json!({"id": 1})),
        );
        agg.record_pair(
            record("orders", json!({"id": 7})),
            record("orders", json!({"id": 7})),
        );
        agg.record_pair(
            record("users", json!({"id": 2})),
            record("users", json!({"id": 2})),
        );

        assert_eq!(agg.stream("users").unwrap().record_count, 2);
        assert_eq!(agg.stream("orders").unwrap().record_count, 1);
        assert!(agg.stream("invoices").is_none());
        assert_eq!(agg.summary().record_pairs, 3);
        assert_eq!(agg.summary().identical_records, 3);
    }

    #[test]
    fn test_stats_for_creates_once() {
        let mut agg = StatsAggregator::new("id");
        agg.stats_for("refunds").record_count = 4;
        assert_eq!(agg.stats_for("refunds").record_count, 4);
        assert_eq!(agg.streams().count(), 1);
        assert_eq!(agg.stats_for("disputes").stream, "disputes");
        assert_eq!(agg.streams().count(), 2);
    }

    #[test]
    fn test_reconciled_counts_pairs() {
        let mut agg = StatsAggregator::new("id");
        agg.record_pair(
            record("users", json!({"id": 1})),
            record("users", json!({"id": 2})),
        );
        agg.record_pair(
            record("users", json!({"id": 2})),
            record("users", json!({"id": 1})),
        );
        assert_eq!(agg.summary().reconciled_records, 2);
        assert_eq!(agg.stream("users").unwrap().equal_count["id"], 2);
    }

    #[test]
    fn test_buffer_unpaired_ignores_control_events() {
        let mut agg = StatsAggregator::new("id");
        agg.buffer_unpaired(Message::new(
            SourceLabel::Left,
            Event::Control(crate::protocol::MessageKind::State),
        ));
        assert_eq!(agg.streams().count(), 0);
    }

    #[test]
    fn test_buffer_unpaired_keeps_row() {
        let mut agg = StatsAggregator::new("id");
        agg.buffer_unpaired(Message::new(
            SourceLabel::Right,
            Event::Record(record("users", json!({"id": 9, "name": "z"}))),
        ));
        let stats = agg.stream("users").unwrap();
        assert_eq!(stats.pending_right.len(), 1);
        assert!(stats.pending_left.is_empty());
        assert_eq!(stats.record_count, 0);
    }
}
