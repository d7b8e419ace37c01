//! Finalized Report
//!
//! Read-only snapshot of every stream's counters, produced once when the
//! pairing loop finishes.

use serde::Serialize;
use std::fmt;

use crate::engine::{ColumnCounts, PrimaryKey, RunSummary, StreamStats};

/// Counter kinds reported per column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    DiffCount,
    EqualCount,
    LeftMissingCount,
    RightMissingCount,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::DiffCount,
        Metric::EqualCount,
        Metric::LeftMissingCount,
        Metric::RightMissingCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DiffCount => "diff_count",
            Self::EqualCount => "equal_count",
            Self::LeftMissingCount => "left_missing_count",
            Self::RightMissingCount => "right_missing_count",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cell of the tabular summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricRow {
    pub stream: String,
    pub column: String,
    pub metric: Metric,
    pub value: u64,
}

/// Final counters for one stream.
#[derive(Debug, Clone, Serialize)]
pub struct StreamReport {
    pub stream: String,
    pub record_count: u64,
    pub diff_count: ColumnCounts,
    pub equal_count: ColumnCounts,
    pub left_missing_count: ColumnCounts,
    pub right_missing_count: ColumnCounts,
    /// Primary keys of rows seen only in the left run.
    pub left_rows_missing: Vec<PrimaryKey>,
    /// Primary keys of rows seen only in the right run.
    pub right_rows_missing: Vec<PrimaryKey>,
}

impl StreamReport {
    pub fn from_stats(stats: StreamStats) -> Self {
        Self {
            stream: stats.stream,
            record_count: stats.record_count,
            diff_count: stats.diff_count,
            equal_count: stats.equal_count,
            left_missing_count: stats.left_missing_count,
            right_missing_count: stats.right_missing_count,
            left_rows_missing: stats.pending_left.into_keys().collect(),
            right_rows_missing: stats.pending_right.into_keys().collect(),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.diff_count.keys().map(String::as_str)
    }

    pub fn counts(&self, metric: Metric) -> &ColumnCounts {
        match metric {
            Metric::DiffCount => &self.diff_count,
            Metric::EqualCount => &self.equal_count,
            Metric::LeftMissingCount => &self.left_missing_count,
            Metric::RightMissingCount => &self.right_missing_count,
        }
    }

    pub fn metric(&self, column: &str, metric: Metric) -> Option<u64> {
        self.counts(metric).get(column).copied()
    }

    /// Tabular summary rows, grouped by metric then column.
    pub fn rows(&self) -> Vec<MetricRow> {
        Metric::ALL
            .iter()
            .flat_map(|&metric| {
                self.counts(metric).iter().map(move |(column, &value)| MetricRow {
                    stream: self.stream.clone(),
                    column: column.clone(),
                    metric,
                    value,
                })
            })
            .collect()
    }

    /// True if any column diverged or any row is single-sided.
    pub fn has_differences(&self) -> bool {
        let any = |counts: &ColumnCounts| counts.values().any(|&v| v > 0);
        any(&self.diff_count)
            || any(&self.left_missing_count)
            || any(&self.right_missing_count)
            || !self.left_rows_missing.is_empty()
            || !self.right_rows_missing.is_empty()
    }
}

/// The result of one completed run.
#[derive(Debug, Clone, Serialize)]
pub struct FinalizedReport {
    pub generated_at: i64,
    pub primary_key: String,
    pub summary: RunSummary,
    pub streams: Vec<StreamReport>,
}

impl FinalizedReport {
    pub(crate) fn new(
        primary_key: String,
        summary: RunSummary,
        streams: impl IntoIterator<Item = StreamStats>,
    ) -> Self {
        Self {
            generated_at: chrono::Utc::now().timestamp(),
            primary_key,
            summary,
            streams: streams.into_iter().map(StreamReport::from_stats).collect(),
        }
    }

    pub fn stream(&self, stream: &str) -> Option<&StreamReport> {
        self.streams.iter().find(|s| s.stream == stream)
    }

    pub fn rows(&self) -> Vec<MetricRow> {
        self.streams.iter().flat_map(StreamReport::rows).collect()
    }

    pub fn has_differences(&self) -> bool {
        self.streams.iter().any(StreamReport::has_differences)
    }

    /// Generate executive summary (text)
    pub fn executive_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str(&format!(
            "=== Connector Regression Report ===\n\
             Generated: {}\n\
             Primary key: {}\n\n",
            chrono::DateTime::from_timestamp(self.generated_at, 0)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| "unknown".to_string()),
            self.primary_key,
        ));

        summary.push_str(&format!(
            "RUN:\n\
             - Paired messages: {}\n\
             - Record pairs: {} ({} identical, {} differing)\n\
             - Control pairs: {}\n\
             - Reconciled by key: {}\n\
             - Records without key: {}\n",
            self.summary.iterations,
            self.summary.record_pairs,
            self.summary.identical_records,
            self.summary.differing_records,
            self.summary.control_pairs,
            self.summary.reconciled_records,
            self.summary.unkeyed_records,
        ));

        for stream in &self.streams {
            summary.push_str(&format!(
                "\nSTREAM {} ({} records):\n",
                stream.stream, stream.record_count
            ));
            summary.push_str(&format!(
                "  {:<32} {:>10} {:>10} {:>12} {:>13}\n",
                "column", "diff", "equal", "left_missing", "right_missing"
            ));
            for column in stream.columns() {
                let value = |metric| stream.metric(column, metric).unwrap_or(0);
                summary.push_str(&format!(
                    "  {:<32} {:>10} {:>10} {:>12} {:>13}\n",
                    column,
                    value(Metric::DiffCount),
                    value(Metric::EqualCount),
                    value(Metric::LeftMissingCount),
                    value(Metric::RightMissingCount),
                ));
            }
            summary.push_str(&format!(
                "  Rows only in left: {}{}\n",
                stream.left_rows_missing.len(),
                key_list(&stream.left_rows_missing),
            ));
            summary.push_str(&format!(
                "  Rows only in right: {}{}\n",
                stream.right_rows_missing.len(),
                key_list(&stream.right_rows_missing),
            ));
        }

        summary
    }

    /// Export as JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Export as compact JSON
    pub fn to_json_compact(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

fn key_list(keys: &[PrimaryKey]) -> String {
    const SHOWN: usize = 20;
    if keys.is_empty() {
        return String::new();
    }
    let mut out = keys
        .iter()
        .take(SHOWN)
        .map(PrimaryKey::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if keys.len() > SHOWN {
        out.push_str(&format!(", ... (+{})", keys.len() - SHOWN));
    }
    format!(" [{}]", out)
}
