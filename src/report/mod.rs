//! Regression Report
//!
//! The finalized, read-only result of a run and the sinks that persist it.

pub mod sink;
pub mod summary;

pub use sink::{JsonReportSink, MemorySink, ReportSink, TextReportSink, PAGE_BREAK};
pub use summary::{FinalizedReport, Metric, MetricRow, StreamReport};
