//! Stream Pairing Loop
//!
//! Pulls one message from each source per iteration and routes record pairs
//! into the aggregator.
//!
//! # States
//!
//! - **Running**: both sources produced a message of the same kind.
//! - **Finalized**: either source is exhausted. A record already pulled from
//!   the other side in that iteration is buffered as a single-sided row; no
//!   further messages are read. The aggregator is finalized into a report.
//! - **Aborted**: the two messages differ in kind, or two records name
//!   different streams. The run ends with an error and no report.

use std::fmt;
use tracing::{debug, error, info};

use super::stats::StatsAggregator;
use crate::protocol::{Event, Message, MessageKind};
use crate::report::FinalizedReport;
use crate::source::{RecordSource, SourceError};

// =============================================================================
// RUN ERRORS
// =============================================================================

/// Conditions that end a run without a report
#[derive(Debug)]
pub enum RunError {
    /// The two runs emitted different message kinds at the same position.
    TypeMismatch {
        iteration: u64,
        left: MessageKind,
        right: MessageKind,
    },
    /// Two paired records belong to different streams.
    StreamMismatch {
        iteration: u64,
        left: String,
        right: String,
    },
    Source(SourceError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch {
                iteration,
                left,
                right,
            } => write!(
                f,
                "type mismatch at message {}: {} != {}",
                iteration, left, right
            ),
            Self::StreamMismatch {
                iteration,
                left,
                right,
            } => write!(
                f,
                "stream mismatch at message {}: {} != {}",
                iteration, left, right
            ),
            Self::Source(e) => write!(f, "{} source failed", e.label()),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Source(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SourceError> for RunError {
    fn from(e: SourceError) -> Self {
        Self::Source(e)
    }
}

// =============================================================================
// PAIRING LOOP
// =============================================================================

/// Result of a single lock-step iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Paired(MessageKind),
    Exhausted,
}

pub struct PairingLoop {
    aggregator: StatsAggregator,
    iteration: u64,
}

impl PairingLoop {
    pub fn new(aggregator: StatsAggregator) -> Self {
        Self {
            aggregator,
            iteration: 0,
        }
    }

    pub fn aggregator(&self) -> &StatsAggregator {
        &self.aggregator
    }

    /// Drive both sources until one is exhausted and return the report.
    pub async fn run<L, R>(mut self, left: &mut L, right: &mut R) -> Result<FinalizedReport, RunError>
    where
        L: RecordSource + ?Sized,
        R: RecordSource + ?Sized,
    {
        info!(primary_key = self.aggregator.primary_key(), "pairing started");
        while let Step::Paired(_) = self.step(left, right).await? {}

        let report = self.aggregator.finalize();
        info!(
            iterations = report.summary.iterations,
            streams = report.streams.len(),
            "pairing finalized"
        );
        Ok(report)
    }

    /// Request one message from each source and process the pair.
    pub async fn step<L, R>(&mut self, left: &mut L, right: &mut R) -> Result<Step, RunError>
    where
        L: RecordSource + ?Sized,
        R: RecordSource + ?Sized,
    {
        let (left_next, right_next) = tokio::join!(left.next_message(), right.next_message());
        let (left_next, right_next) = (left_next?, right_next?);

        let (left_msg, right_msg) = match (left_next, right_next) {
            (Some(l), Some(r)) => (l, r),
            (l, r) => {
                info!(
                    left_exhausted = l.is_none(),
                    right_exhausted = r.is_none(),
                    "source exhausted"
                );
                if let Some(message) = l.or(r) {
                    self.aggregator.buffer_unpaired(message);
                }
                return Ok(Step::Exhausted);
            }
        };

        self.iteration += 1;
        self.aggregator.note_iteration();
        self.pair(left_msg, right_msg)
    }

    fn pair(&mut self, left: Message, right: Message) -> Result<Step, RunError> {
        let (left_kind, right_kind) = (left.event.kind(), right.event.kind());
        if left_kind != right_kind {
            error!(
                iteration = self.iteration,
                left = ?left,
                right = ?right,
                "type mismatch: {} != {}",
                left_kind,
                right_kind
            );
            return Err(RunError::TypeMismatch {
                iteration: self.iteration,
                left: left_kind,
                right: right_kind,
            });
        }

        match (left.event, right.event) {
            (Event::Record(l), Event::Record(r)) => {
                if l.stream_name != r.stream_name {
                    error!(
                        iteration = self.iteration,
                        "stream mismatch: {} != {}",
                        l.stream_name,
                        r.stream_name
                    );
                    return Err(RunError::StreamMismatch {
                        iteration: self.iteration,
                        left: l.stream_name,
                        right: r.stream_name,
                    });
                }
                if !l.same_data(&r) {
                    debug!(
                        stream = %l.stream_name,
                        left = %serde_json::Value::Object(l.fields.clone()),
                        right = %serde_json::Value::Object(r.fields.clone()),
                        "data mismatch"
                    );
                }
                self.aggregator.record_pair(l, r);
            }
            _ => self.aggregator.note_control_pair(),
        }

        Ok(Step::Paired(left_kind))
    }
}

/// Compare two runs with a fresh aggregator keyed by `primary_key`.
pub async fn compare_sources<L, R>(
    left: &mut L,
    right: &mut R,
    primary_key: &str,
) -> Result<FinalizedReport, RunError>
where
    L: RecordSource + ?Sized,
    R: RecordSource + ?Sized,
{
    PairingLoop::new(StatsAggregator::new(primary_key))
        .run(left, right)
        .await
}
