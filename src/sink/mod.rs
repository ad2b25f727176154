//! Durable event storage.
//!
//! The coordinator hands every emitted event to an `EventSink`. Sinks are
//! append-only per candidate and answer queries newest first. Available
//! implementations:
//! - `MemorySink` for tests and short-lived runs
//! - `JsonlSink` writing one JSON-lines file per candidate
//! - `QueuedSink` putting a bounded queue and worker thread in front of
//!   another sink so a slow store never stalls frame processing
//! - `RemoteSink` (feature `gateway`) talking to an HTTP event store

pub mod jsonl;
pub mod memory;
pub mod queued;

#[cfg(feature = "gateway")]
pub mod remote;

pub use jsonl::JsonlSink;
pub use memory::MemorySink;
pub use queued::QueuedSink;

#[cfg(feature = "gateway")]
pub use remote::{RemoteSink, RemoteSinkConfig};

use crate::core::{Event, EventType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Append-only event store keyed by candidate.
pub trait EventSink: Send + Sync {
    /// Durably record one event for a candidate.
    fn append(&self, candidate_id: &str, event: &Event) -> Result<(), SinkError>;

    /// Up to `limit` events for a candidate, most recent first.
    fn query(&self, candidate_id: &str, limit: usize) -> Result<Vec<Event>, SinkError>;
}

/// Errors raised by event sinks.
#[derive(Debug)]
pub enum SinkError {
    /// Storage IO failed
    Io(String),
    /// An event could not be encoded or decoded
    Serialization(String),
    /// The queue in front of the store is full
    Backpressure { capacity: usize },
    /// The sink has shut down
    Closed,
    /// The remote store refused or failed the request
    Remote(String),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "Sink IO error: {e}"),
            SinkError::Serialization(e) => write!(f, "Sink serialization error: {e}"),
            SinkError::Backpressure { capacity } => {
                write!(f, "Sink queue full ({capacity} events pending)")
            }
            SinkError::Closed => write!(f, "Sink is closed"),
            SinkError::Remote(e) => write!(f, "Remote sink error: {e}"),
        }
    }
}

impl std::error::Error for SinkError {}

/// Order events newest first; among equal timestamps the later-appended
/// event comes first. `events` must be in append order.
pub(crate) fn newest_first(mut events: Vec<Event>, limit: usize) -> Vec<Event> {
    events.reverse();
    events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    events.truncate(limit);
    events
}

/// Per-candidate roll-up of stored events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSummary {
    pub candidate_id: String,
    pub total_events: usize,
    pub by_type: BTreeMap<EventType, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_event_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_at: Option<DateTime<Utc>>,
}

impl EventSummary {
    pub fn from_events(candidate_id: impl Into<String>, events: &[Event]) -> Self {
        let mut by_type: BTreeMap<EventType, usize> =
            EventType::ALL.iter().map(|t| (*t, 0)).collect();
        for event in events {
            *by_type.entry(event.event_type).or_insert(0) += 1;
        }

        Self {
            candidate_id: candidate_id.into(),
            total_events: events.len(),
            by_type,
            first_event_at: events.iter().map(|e| e.timestamp).min(),
            last_event_at: events.iter().map(|e| e.timestamp).max(),
        }
    }

    /// Human-readable report, oldest entries listed first.
    pub fn report(&self, events: &[Event]) -> String {
        let mut out = format!(
            "Proctoring Report - Candidate: {}\nTotal events: {}\n",
            self.candidate_id, self.total_events
        );
        for (kind, count) in &self.by_type {
            out.push_str(&format!("  {kind}: {count}\n"));
        }
        if !events.is_empty() {
            out.push('\n');
        }
        for event in events.iter().rev() {
            out.push_str(&format!(
                "{} | {} | {}\n",
                event.timestamp.to_rfc3339(),
                event.event_type,
                event.details
            ));
        }
        out
    }
}
