//! Core event-detection logic for the proctoring monitor.
//!
//! This module contains:
//! - The event model emitted by the trackers
//! - One tracker per violation kind (presence, multi-face, focus, objects)
//! - Per-candidate session state tying the trackers together

pub mod event;
pub mod focus;
pub mod multi_face;
pub mod objects;
pub mod presence;
pub mod session;

// Re-export commonly used types
pub use event::{Direction, Event, EventExtra, EventType};
pub use focus::{FocusState, FocusTracker};
pub use multi_face::MultiFaceTracker;
pub use objects::ObjectWatch;
pub use presence::FacePresenceTracker;
pub use session::{ClockWentBackwards, Session, SessionSnapshot};

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Time from `since` to `now`, saturating at zero if `now` is earlier.
pub(crate) fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

/// Fixed test clock: `secs` seconds after a constant epoch.
#[cfg(test)]
pub(crate) fn at(secs: f64) -> DateTime<Utc> {
    let base = "2024-05-01T09:00:00Z"
        .parse::<DateTime<Utc>>()
        .expect("valid base time");
    base + chrono::Duration::milliseconds((secs * 1000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_saturates() {
        assert_eq!(elapsed(at(5.0), at(3.0)), Duration::ZERO);
        assert_eq!(elapsed(at(1.0), at(3.5)), Duration::from_millis(2500));
    }
}
