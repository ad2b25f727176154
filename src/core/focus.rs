//! Focus: raises FOCUS_LOST after the head stays off-center long enough.
//!
//! Two states, driven by every frame that carries a head offset:
//!
//! ```text
//!            off-center                 off-center, held > threshold
//! Centered ─────────────▶ Deviating ──────────────────────────────▶ emit, Centered
//!    ▲                        │
//!    └──────── centered ──────┘
//! ```
//!
//! Returning to center before the threshold cancels the pending violation.
//! After an emission the deviation clock starts over, so a long look away is
//! reported as a train of discrete events.

use crate::core::elapsed;
use crate::core::event::{Direction, Event, EventExtra, EventType};
use crate::perception::Detection;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Current classification of the candidate's gaze.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusState {
    /// Looking at the screen, or nothing known yet
    Centered,
    /// Off-center since the given instant
    Deviating { since: DateTime<Utc> },
}

pub struct FocusTracker {
    candidate_id: String,
    center_threshold: f64,
    away_threshold: Duration,
    state: FocusState,
}

impl FocusTracker {
    pub fn new(candidate_id: impl Into<String>, center_threshold: f64, away_threshold: Duration) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            center_threshold,
            away_threshold,
            state: FocusState::Centered,
        }
    }

    pub fn update(&mut self, detection: &Detection, now: DateTime<Utc>) -> Vec<Event> {
        // Absence is the presence tracker's concern.
        if !detection.has_face() {
            return Vec::new();
        }
        let Some(offset) = detection.head_offset else {
            return Vec::new();
        };

        if offset.abs() <= self.center_threshold {
            self.state = FocusState::Centered;
            return Vec::new();
        }

        match self.state {
            FocusState::Centered => {
                self.state = FocusState::Deviating { since: now };
                Vec::new()
            }
            FocusState::Deviating { since } if elapsed(since, now) > self.away_threshold => {
                self.state = FocusState::Centered;
                let direction = Direction::from_offset(offset);
                vec![Event::new(
                    EventType::FocusLost,
                    now,
                    self.candidate_id.as_str(),
                    format!(
                        "Looking {direction} for >{}s",
                        self.away_threshold.as_secs_f64()
                    ),
                )
                .with_extra(EventExtra {
                    direction: Some(direction),
                    ..Default::default()
                })]
            }
            FocusState::Deviating { .. } => Vec::new(),
        }
    }

    pub fn state(&self) -> FocusState {
        self.state
    }

    /// When the current deviation began, if one is pending.
    pub fn focus_away_since(&self) -> Option<DateTime<Utc>> {
        match self.state {
            FocusState::Centered => None,
            FocusState::Deviating { since } => Some(since),
        }
    }
}
