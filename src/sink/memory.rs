//! In-memory event sink.

use crate::core::Event;
use crate::sink::{newest_first, EventSink, SinkError};
use std::collections::HashMap;
use std::sync::RwLock;

/// Keeps every event in memory, grouped by candidate.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: RwLock<HashMap<String, Vec<Event>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events stored across all candidates.
    pub fn len(&self) -> usize {
        self.events
            .read()
            .map(|events| events.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemorySink {
    fn append(&self, candidate_id: &str, event: &Event) -> Result<(), SinkError> {
        let mut events = self
            .events
            .write()
            .map_err(|_| SinkError::Io("event store lock poisoned".to_string()))?;
        events
            .entry(candidate_id.to_string())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    fn query(&self, candidate_id: &str, limit: usize) -> Result<Vec<Event>, SinkError> {
        let events = self
            .events
            .read()
            .map_err(|_| SinkError::Io("event store lock poisoned".to_string()))?;
        let stored = events.get(candidate_id).cloned().unwrap_or_default();
        Ok(newest_first(stored, limit))
    }
}
