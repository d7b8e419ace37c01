//! A source backed by an in-memory sequence of events.

use async_trait::async_trait;
use std::collections::VecDeque;

use super::{RecordSource, SourceError};
use crate::protocol::{Event, Message, RecordEvent, SourceLabel};

pub struct VecSource {
    label: SourceLabel,
    events: VecDeque<Event>,
}

impl VecSource {
    pub fn new(label: SourceLabel, events: impl IntoIterator<Item = Event>) -> Self {
        Self {
            label,
            events: events.into_iter().collect(),
        }
    }

    /// Source that yields only RECORD events.
    pub fn from_records(label: SourceLabel, records: impl IntoIterator<Item = RecordEvent>) -> Self {
        Self::new(label, records.into_iter().map(Event::Record))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl RecordSource for VecSource {
    fn label(&self) -> SourceLabel {
        self.label
    }

    async fn next_message(&mut self) -> Result<Option<Message>, SourceError> {
        Ok(self
            .events
            .pop_front()
            .map(|event| Message::new(self.label, event)))
    }
}
