//! Integrity-violation events.
//!
//! Events are immutable once built. The serialized form matches the stored
//! document shape: a `type` tag, a timestamp, the candidate, a readable
//! `details` string and optional extra fields flattened alongside.

use crate::perception::BoundingBox;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of integrity violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    NoFace,
    MultipleFaces,
    FocusLost,
    ObjectDetected,
}

impl EventType {
    /// All event kinds, in tracker order.
    pub const ALL: [EventType; 4] = [
        EventType::NoFace,
        EventType::MultipleFaces,
        EventType::FocusLost,
        EventType::ObjectDetected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NoFace => "NO_FACE",
            EventType::MultipleFaces => "MULTIPLE_FACES",
            EventType::FocusLost => "FOCUS_LOST",
            EventType::ObjectDetected => "OBJECT_DETECTED",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which way the candidate was looking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    /// Negative offsets are left of center.
    pub fn from_offset(offset: f64) -> Self {
        if offset < 0.0 {
            Direction::Left
        } else {
            Direction::Right
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Left => f.write_str("left"),
            Direction::Right => f.write_str("right"),
        }
    }
}

/// Optional context attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

impl EventExtra {
    pub fn is_empty(&self) -> bool {
        self.frame_id.is_none()
            && self.confidence.is_none()
            && self.bbox.is_none()
            && self.direction.is_none()
    }
}

/// A single integrity-violation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub candidate_id: String,
    pub details: String,
    #[serde(flatten)]
    pub extra: EventExtra,
}

impl Event {
    pub fn new(
        event_type: EventType,
        timestamp: DateTime<Utc>,
        candidate_id: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            timestamp,
            candidate_id: candidate_id.into(),
            details: details.into(),
            extra: EventExtra::default(),
        }
    }

    pub fn with_extra(mut self, extra: EventExtra) -> Self {
        self.extra = extra;
        self
    }

    /// Set the frame id unless the event already carries one.
    pub(crate) fn assign_frame_id(&mut self, frame_id: u64) {
        self.extra.frame_id.get_or_insert(frame_id);
    }
}
