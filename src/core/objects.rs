//! Object watch: raises OBJECT_DETECTED for prohibited items.
//!
//! Deduplication is per normalized label, not per object instance: repeated
//! sightings of "cell phone" inside the cooldown produce one event even if
//! the box moves. Each label keeps its own cooldown.

use crate::config::{normalize_label, SuspiciousLabels};
use crate::core::elapsed;
use crate::core::event::{Event, EventExtra, EventType};
use crate::perception::Detection;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

pub struct ObjectWatch {
    candidate_id: String,
    labels: SuspiciousLabels,
    cooldown: Duration,
    last_object_logged_at: HashMap<String, DateTime<Utc>>,
}

impl ObjectWatch {
    pub fn new(candidate_id: impl Into<String>, labels: SuspiciousLabels, cooldown: Duration) -> Self {
        Self {
            candidate_id: candidate_id.into(),
            labels,
            cooldown,
            last_object_logged_at: HashMap::new(),
        }
    }

    pub fn update(&mut self, detection: &Detection, now: DateTime<Utc>, frame_id: u64) -> Vec<Event> {
        let mut events = Vec::new();

        for object in &detection.objects {
            if !self.labels.matches(&object.label) {
                continue;
            }

            let key = normalize_label(&object.label);
            if let Some(&logged) = self.last_object_logged_at.get(&key) {
                if elapsed(logged, now) <= self.cooldown {
                    tracing::debug!(
                        candidate = %self.candidate_id,
                        label = %key,
                        "object sighting within cooldown"
                    );
                    continue;
                }
            }

            self.last_object_logged_at.insert(key, now);
            events.push(
                Event::new(
                    EventType::ObjectDetected,
                    now,
                    self.candidate_id.as_str(),
                    format!("{} detected (conf={:.2})", object.label.trim(), object.confidence),
                )
                .with_extra(EventExtra {
                    frame_id: Some(frame_id),
                    confidence: Some(object.confidence),
                    bbox: Some(object.bbox),
                    direction: None,
                }),
            );
        }

        events
    }

    /// Last emission time per normalized label.
    pub fn last_object_logged_at(&self) -> &HashMap<String, DateTime<Utc>> {
        &self.last_object_logged_at
    }
}
