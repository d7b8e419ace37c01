//! Line-delimited protocol decoding over any async reader.

use async_trait::async_trait;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, warn};

use super::{RecordSource, SourceError};
use crate::protocol::{decode_event, Message, SourceLabel};

/// Decodes one protocol message per line.
///
/// Connectors interleave plain log text with protocol JSON on stdout, so by
/// default lines that are not JSON objects are skipped and counted. A JSON
/// object that fails the message schema always ends the run with
/// [`SourceError::Decode`]; in strict mode every undecodable line does.
pub struct LineSource<R> {
    label: SourceLabel,
    lines: Lines<R>,
    strict: bool,
    line_number: u64,
    skipped_lines: u64,
}

impl<R: AsyncBufRead + Unpin + Send> LineSource<R> {
    pub fn new(label: SourceLabel, reader: R) -> Self {
        Self {
            label,
            lines: reader.lines(),
            strict: false,
            line_number: 0,
            skipped_lines: 0,
        }
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.set_strict(strict);
        self
    }

    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Lines read so far, including skipped ones.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }
}

impl LineSource<BufReader<File>> {
    /// Replay captured connector output from a file.
    pub async fn open(label: SourceLabel, path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|source| SourceError::Io { label, source })?;
        debug!(source = %label, path = %path.display(), "opened captured output");
        Ok(Self::new(label, BufReader::new(file)))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> RecordSource for LineSource<R> {
    fn label(&self) -> SourceLabel {
        self.label
    }

    async fn next_message(&mut self) -> Result<Option<Message>, SourceError> {
        let label = self.label;
        loop {
            let Some(line) = self
                .lines
                .next_line()
                .await
                .map_err(|source| SourceError::Io { label, source })?
            else {
                return Ok(None);
            };
            self.line_number += 1;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match decode_event(line) {
                Ok(event) => return Ok(Some(Message::new(label, event))),
                Err(err) if self.strict || !err.is_noise() => {
                    return Err(SourceError::Decode {
                        label,
                        line_number: self.line_number,
                        message: err.to_string(),
                    })
                }
                Err(err) => {
                    self.skipped_lines += 1;
                    warn!(
                        source = %label,
                        line = self.line_number,
                        error = %err,
                        "skipping undecodable line"
                    );
                }
            }
        }
    }
}
