//! Multiple faces: raises MULTIPLE_FACES when more than one face is in frame.
//!
//! Cooldown only, no hysteresis: a single frame with several faces counts,
//! and the cooldown absorbs detector noise.

use crate::core::elapsed;
use crate::core::event::{Event, EventType};
use crate::perception::Detection;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub struct MultiFaceTracker {
    candidate_id: String,
    cooldown: Duration,
    last_multi_face_logged_at: Option<DateTime<Utc>>,
}

impl MultiFaceTracker {
    pub fn new(candidate_id: impl Into<String>, cooldown: Duration) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            cooldown,
            last_multi_face_logged_at: None,
        }
    }

    pub fn update(&mut self, detection: &Detection, now: DateTime<Utc>) -> Vec<Event> {
        let face_count = detection.face_count();
        if face_count <= 1 {
            return Vec::new();
        }

        if let Some(logged) = self.last_multi_face_logged_at {
            if elapsed(logged, now) <= self.cooldown {
                return Vec::new();
            }
        }

        self.last_multi_face_logged_at = Some(now);
        vec![Event::new(
            EventType::MultipleFaces,
            now,
            self.candidate_id.as_str(),
            format!("{face_count} faces detected in frame"),
        )]
    }

    pub fn last_multi_face_logged_at(&self) -> Option<DateTime<Utc>> {
        self.last_multi_face_logged_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::at;

    #[test]
    fn test_single_face_never_fires() {
        let mut tracker = MultiFaceTracker::new("cand", Duration::from_secs(10));
        assert!(tracker.update(&Detection::faces(1), at(0.0)).is_empty());
        assert!(tracker.update(&Detection::faces(0), at(1.0)).is_empty());
        assert_eq!(tracker.last_multi_face_logged_at(), None);
    }

    #[test]
    fn test_cooldown_between_emissions() {
        let mut tracker = MultiFaceTracker::new("cand", Duration::from_secs(10));

        let events = tracker.update(&Detection::faces(3), at(0.0));
        assert_eq!(events.len(), 1);
        assert!(events[0].details.contains('3'));

        assert!(tracker.update(&Detection::faces(2), at(5.0)).is_empty());
        // exactly at the cooldown is still suppressed
        assert!(tracker.update(&Detection::faces(2), at(10.0)).is_empty());
        assert_eq!(tracker.update(&Detection::faces(2), at(10.5)).len(), 1);
        assert_eq!(tracker.last_multi_face_logged_at(), Some(at(10.5)));
    }
}
