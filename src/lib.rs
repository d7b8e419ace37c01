//! Connector Regression Library
//!
//! Runs two versions of a connector, pairs their output message by message
//! and counts, per stream and column, how the records differ.

pub mod config;
pub mod engine;
pub mod protocol;
pub mod report;
pub mod runner;
pub mod source;

pub use config::RegressionConfig;
pub use engine::{compare_sources, RunError, StatsAggregator};
pub use report::FinalizedReport;
