//! Dual-Source Record Diff Engine
//!
//! Compares two connector runs message by message:
//! - `pairing`: lock-step consumption of the two sources
//! - `differ`: field-level counters for a record pair
//! - `reconcile`: primary-key matching for rows that drifted out of position
//! - `stats`: per-stream accumulators owned by one aggregator per run

pub mod differ;
pub mod pairing;
pub mod reconcile;
pub mod stats;

pub use differ::diff_records;
pub use pairing::{compare_sources, PairingLoop, RunError, Step};
pub use reconcile::{PairOutcome, PrimaryKey};
pub use stats::{ColumnCounts, RunSummary, StatsAggregator, StreamStats};
