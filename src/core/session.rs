//! Per-candidate tracking state.
//!
//! A `Session` owns one instance of each tracker for a single candidate and
//! runs them against every frame in a fixed order. It is never shared
//! between candidates; the coordinator serializes access to it.

use crate::config::{ClockPolicy, Config, SuspiciousLabels, Thresholds};
use crate::core::event::Event;
use crate::core::focus::FocusTracker;
use crate::core::multi_face::MultiFaceTracker;
use crate::core::objects::ObjectWatch;
use crate::core::presence::FacePresenceTracker;
use crate::perception::Detection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// A frame arrived with a timestamp earlier than one already processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockWentBackwards {
    pub last_observed: DateTime<Utc>,
    pub now: DateTime<Utc>,
}

impl std::fmt::Display for ClockWentBackwards {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "frame time {} is earlier than last observed {}",
            self.now.to_rfc3339(),
            self.last_observed.to_rfc3339()
        )
    }
}

impl std::error::Error for ClockWentBackwards {}

/// Tracking state for one candidate.
pub struct Session {
    id: Uuid,
    candidate_id: String,
    thresholds: Thresholds,
    labels: SuspiciousLabels,
    clock_policy: ClockPolicy,
    created_at: DateTime<Utc>,
    last_frame_at: Option<DateTime<Utc>>,
    frame_counter: u64,
    presence: FacePresenceTracker,
    multi_face: MultiFaceTracker,
    focus: FocusTracker,
    objects: ObjectWatch,
}

impl Session {
    /// Create a session whose clocks start at `now`.
    pub fn new(candidate_id: impl Into<String>, config: &Config, now: DateTime<Utc>) -> Self {
        let candidate_id = candidate_id.into();
        let thresholds = config.thresholds.clone();
        let labels = config.suspicious_labels.clone();

        Self {
            id: Uuid::new_v4(),
            presence: FacePresenceTracker::new(candidate_id.as_str(), thresholds.no_face, now),
            multi_face: MultiFaceTracker::new(candidate_id.as_str(), thresholds.multi_face_cooldown),
            focus: FocusTracker::new(candidate_id.as_str(), thresholds.center, thresholds.focus_away),
            objects: ObjectWatch::new(
                candidate_id.as_str(),
                labels.clone(),
                thresholds.object_cooldown,
            ),
            candidate_id,
            thresholds,
            labels,
            clock_policy: config.clock_policy,
            created_at: now,
            last_frame_at: None,
            frame_counter: 0,
        }
    }

    /// Run every tracker against one frame and collect their events.
    ///
    /// Events come back in tracker order (presence, multi-face, focus,
    /// objects), each tagged with this frame's id.
    pub fn observe(
        &mut self,
        detection: &Detection,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, ClockWentBackwards> {
        let now = self.check_clock(now)?;

        let frame_id = self.frame_counter;
        self.frame_counter += 1;
        self.last_frame_at = Some(now);

        let mut events = self.presence.update(detection, now);
        events.extend(self.multi_face.update(detection, now));
        events.extend(self.focus.update(detection, now));
        events.extend(self.objects.update(detection, now, frame_id));

        for event in &mut events {
            event.assign_frame_id(frame_id);
        }

        Ok(events)
    }

    fn check_clock(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, ClockWentBackwards> {
        match self.last_frame_at {
            Some(last) if now < last => match self.clock_policy {
                ClockPolicy::Reject => Err(ClockWentBackwards {
                    last_observed: last,
                    now,
                }),
                ClockPolicy::Clamp => {
                    tracing::warn!(
                        candidate = %self.candidate_id,
                        skew_ms = (last - now).num_milliseconds(),
                        "clamping frame time that went backwards"
                    );
                    Ok(last)
                }
            },
            _ => Ok(now),
        }
    }

    /// Discard all tracker state and start over from `now`.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        let config = Config {
            thresholds: self.thresholds.clone(),
            suspicious_labels: self.labels.clone(),
            clock_policy: self.clock_policy,
            ..Config::default()
        };
        *self = Session::new(self.candidate_id.clone(), &config, now);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn candidate_id(&self) -> &str {
        &self.candidate_id
    }

    pub fn last_frame_at(&self) -> Option<DateTime<Utc>> {
        self.last_frame_at
    }

    /// Most recent activity: the last frame, or creation if none yet.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_frame_at.unwrap_or(self.created_at)
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Serializable view of the tracker state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            candidate_id: self.candidate_id.clone(),
            created_at: self.created_at,
            last_frame_at: self.last_frame_at,
            frame_counter: self.frame_counter,
            last_face_seen_at: self.presence.last_face_seen_at(),
            last_no_face_logged_at: self.presence.last_no_face_logged_at(),
            last_multi_face_logged_at: self.multi_face.last_multi_face_logged_at(),
            focus_away_since: self.focus.focus_away_since(),
            last_object_logged_at: self
                .objects
                .last_object_logged_at()
                .iter()
                .map(|(label, at)| (label.clone(), *at))
                .collect(),
        }
    }
}

/// Point-in-time copy of a session's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub candidate_id: String,
    pub created_at: DateTime<Utc>,
    pub last_frame_at: Option<DateTime<Utc>>,
    pub frame_counter: u64,
    pub last_face_seen_at: DateTime<Utc>,
    pub last_no_face_logged_at: Option<DateTime<Utc>>,
    pub last_multi_face_logged_at: Option<DateTime<Utc>>,
    pub focus_away_since: Option<DateTime<Utc>>,
    pub last_object_logged_at: BTreeMap<String, DateTime<Utc>>,
}
