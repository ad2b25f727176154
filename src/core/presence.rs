//! Face presence: raises NO_FACE after a sustained absence.
//!
//! Single-frame misses are ignored. Once the face has been gone for the
//! threshold, NO_FACE fires and then repeats at most once per threshold
//! interval while the absence continues.

use crate::core::elapsed;
use crate::core::event::{Event, EventType};
use crate::perception::Detection;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub struct FacePresenceTracker {
    candidate_id: String,
    threshold: Duration,
    last_face_seen_at: DateTime<Utc>,
    last_no_face_logged_at: Option<DateTime<Utc>>,
}

impl FacePresenceTracker {
    /// `started_at` is the reference point until the first face is seen.
    pub fn new(candidate_id: impl Into<String>, threshold: Duration, started_at: DateTime<Utc>) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            threshold,
            last_face_seen_at: started_at,
            last_no_face_logged_at: None,
        }
    }

    pub fn update(&mut self, detection: &Detection, now: DateTime<Utc>) -> Vec<Event> {
        if detection.has_face() {
            if now > self.last_face_seen_at {
                self.last_face_seen_at = now;
            }
            return Vec::new();
        }

        if elapsed(self.last_face_seen_at, now) < self.threshold {
            return Vec::new();
        }

        if let Some(logged) = self.last_no_face_logged_at {
            if elapsed(logged, now) < self.threshold {
                tracing::debug!(candidate = %self.candidate_id, "NO_FACE suppressed by cooldown");
                return Vec::new();
            }
        }

        self.last_no_face_logged_at = Some(now);
        vec![Event::new(
            EventType::NoFace,
            now,
            self.candidate_id.as_str(),
            format!(
                "No face detected for >{} seconds",
                self.threshold.as_secs_f64()
            ),
        )]
    }

    pub fn last_face_seen_at(&self) -> DateTime<Utc> {
        self.last_face_seen_at
    }

    pub fn last_no_face_logged_at(&self) -> Option<DateTime<Utc>> {
        self.last_no_face_logged_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::at;

    fn tracker() -> FacePresenceTracker {
        FacePresenceTracker::new("cand", Duration::from_secs(10), at(0.0))
    }

    #[test]
    fn test_no_event_before_threshold() {
        let mut tracker = tracker();
        for t in 0..10 {
            assert!(tracker.update(&Detection::empty(), at(t as f64)).is_empty());
        }
    }

    #[test]
    fn test_fires_at_boundary_once_per_window() {
        let mut tracker = tracker();
        let mut fired = Vec::new();
        // 0.5 s frames for 35 s of continuous absence
        for i in 0..=70 {
            let t = i as f64 * 0.5;
            if !tracker.update(&Detection::empty(), at(t)).is_empty() {
                fired.push(t);
            }
        }
        assert_eq!(fired, vec![10.0, 20.0, 30.0]);
        assert_eq!(tracker.last_no_face_logged_at(), Some(at(30.0)));
    }

    #[test]
    fn test_face_resets_absence_clock() {
        let mut tracker = tracker();
        assert!(tracker.update(&Detection::empty(), at(9.0)).is_empty());
        assert!(tracker.update(&Detection::single_face(0.0), at(9.5)).is_empty());
        assert_eq!(tracker.last_face_seen_at(), at(9.5));

        assert!(tracker.update(&Detection::empty(), at(19.0)).is_empty());
        let events = tracker.update(&Detection::empty(), at(19.5));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::NoFace);
        assert_eq!(events[0].candidate_id, "cand");
    }

    #[test]
    fn test_last_face_seen_never_moves_backwards() {
        let mut tracker = tracker();
        tracker.update(&Detection::single_face(0.0), at(5.0));
        tracker.update(&Detection::single_face(0.0), at(4.0));
        assert_eq!(tracker.last_face_seen_at(), at(5.0));
    }
}
