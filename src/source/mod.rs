//! Record Sources
//!
//! A record source yields the protocol messages of one connector run, in
//! emission order. Two sources (left and right) feed the pairing loop:
//! - [`SubprocessSource`]: runs a shell command and reads its stdout
//! - [`LineSource`]: decodes any async line reader (captured output files)
//! - [`VecSource`]: in-memory events

pub mod lines;
pub mod memory;
pub mod subprocess;

pub use lines::LineSource;
pub use memory::VecSource;
pub use subprocess::SubprocessSource;

use async_trait::async_trait;
use std::fmt;
use std::io;

use crate::protocol::{Message, SourceLabel};

/// Producer of one run's message sequence.
#[async_trait]
pub trait RecordSource: Send {
    /// Which side of the comparison this source feeds.
    fn label(&self) -> SourceLabel;

    /// Next message, or `None` once the run has no further output.
    async fn next_message(&mut self) -> Result<Option<Message>, SourceError>;
}

#[async_trait]
impl<S: RecordSource + ?Sized> RecordSource for Box<S> {
    fn label(&self) -> SourceLabel {
        (**self).label()
    }

    async fn next_message(&mut self) -> Result<Option<Message>, SourceError> {
        (**self).next_message().await
    }
}

/// Errors raised while producing messages
#[derive(Debug)]
pub enum SourceError {
    Spawn {
        label: SourceLabel,
        command: String,
        source: io::Error,
    },
    Io {
        label: SourceLabel,
        source: io::Error,
    },
    Decode {
        label: SourceLabel,
        line_number: u64,
        message: String,
    },
}

impl SourceError {
    pub fn label(&self) -> SourceLabel {
        match self {
            Self::Spawn { label, .. } | Self::Io { label, .. } | Self::Decode { label, .. } => {
                *label
            }
        }
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { label, command, .. } => {
                write!(f, "{}: failed to spawn `{}`", label, command)
            }
            Self::Io { label, .. } => write!(f, "{}: read failed", label),
            Self::Decode {
                label,
                line_number,
                message,
            } => write!(f, "{}: line {}: {}", label, line_number, message),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } | Self::Io { source, .. } => Some(source),
            Self::Decode { .. } => None,
        }
    }
}
