//! Session coordinator: routes frames to per-candidate tracker state.
//!
//! The session map is the only structure shared across candidates. Lookups
//! take a read lock; only the first frame of a candidate takes the write
//! lock to insert. Each session sits behind its own mutex, so frames for one
//! candidate are processed strictly in order while other candidates proceed
//! in parallel.
//!
//! Tracker state advances before events reach the sink. A sink failure is
//! reported to the caller with the computed events attached, and the
//! trackers never re-emit them.

use crate::config::Config;
use crate::core::{ClockWentBackwards, Event, Session, SessionSnapshot};
use crate::perception::{Detection, RawDetection};
use crate::sink::{EventSink, EventSummary, SinkError};
use crate::transparency::{create_shared_log, SharedTransparencyLog};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Errors surfaced by `process_frame` and friends.
#[derive(Debug)]
pub enum CoordinatorError {
    /// The frame is older than one already processed for this candidate
    ClockWentBackwards {
        candidate_id: String,
        source: ClockWentBackwards,
    },
    /// Events were computed but at least one could not be persisted
    Sink {
        /// Every event computed for the frame, persisted or not
        events: Vec<Event>,
        /// How many of them the sink accepted
        persisted: usize,
        source: SinkError,
    },
    /// Reading from the sink failed
    Query(SinkError),
    /// A session's state was left unusable by a panic
    SessionPoisoned(String),
}

impl std::fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoordinatorError::ClockWentBackwards {
                candidate_id,
                source,
            } => write!(f, "Rejected frame for {candidate_id}: {source}"),
            CoordinatorError::Sink {
                events,
                persisted,
                source,
            } => write!(
                f,
                "Persisted {persisted} of {} events: {source}",
                events.len()
            ),
            CoordinatorError::Query(e) => write!(f, "Event query failed: {e}"),
            CoordinatorError::SessionPoisoned(id) => {
                write!(f, "Session state for {id} is poisoned")
            }
        }
    }
}

impl std::error::Error for CoordinatorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoordinatorError::ClockWentBackwards { source, .. } => Some(source),
            CoordinatorError::Sink { source, .. } => Some(source),
            CoordinatorError::Query(source) => Some(source),
            CoordinatorError::SessionPoisoned(_) => None,
        }
    }
}

struct SessionSlot {
    session: Session,
    /// Set once the session is closed; a caller still holding the slot must
    /// look the candidate up again.
    closed: bool,
}

type SharedSlot = Arc<Mutex<SessionSlot>>;

pub struct SessionCoordinator {
    config: Config,
    sink: Arc<dyn EventSink>,
    sessions: RwLock<HashMap<String, SharedSlot>>,
    transparency: SharedTransparencyLog,
}

impl SessionCoordinator {
    pub fn new(config: Config, sink: Arc<dyn EventSink>) -> Self {
        Self::with_transparency(config, sink, create_shared_log())
    }

    /// Create a coordinator that reports into an existing transparency log.
    pub fn with_transparency(
        config: Config,
        sink: Arc<dyn EventSink>,
        transparency: SharedTransparencyLog,
    ) -> Self {
        Self {
            config,
            sink,
            sessions: RwLock::new(HashMap::new()),
            transparency,
        }
    }

    /// Process one frame for a candidate, creating its session on first use.
    ///
    /// Returns the events emitted for this frame in tracker order.
    pub fn process_frame(
        &self,
        candidate_id: &str,
        detection: &Detection,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, CoordinatorError> {
        let events = loop {
            let slot = self.resolve(candidate_id, now);
            let mut guard = slot
                .lock()
                .map_err(|_| CoordinatorError::SessionPoisoned(candidate_id.to_string()))?;
            if guard.closed {
                continue;
            }
            break guard.session.observe(detection, now).map_err(|source| {
                tracing::warn!(candidate = %candidate_id, "{source}");
                CoordinatorError::ClockWentBackwards {
                    candidate_id: candidate_id.to_string(),
                    source,
                }
            })?;
        };

        self.transparency.record_frame();
        for event in &events {
            self.transparency.record_event(event.event_type);
            tracing::info!(
                candidate = %candidate_id,
                event_type = %event.event_type,
                frame_id = ?event.extra.frame_id,
                "{}",
                event.details
            );
        }

        self.persist(candidate_id, events)
    }

    /// Process a frame stamped with the current wall-clock time.
    pub fn process_frame_now(
        &self,
        candidate_id: &str,
        detection: &Detection,
    ) -> Result<Vec<Event>, CoordinatorError> {
        self.process_frame(candidate_id, detection, Utc::now())
    }

    /// Sanitize a wire-format detection, then process it.
    ///
    /// Malformed entries are dropped and counted; the rest of the frame is
    /// still evaluated.
    pub fn process_raw(
        &self,
        candidate_id: &str,
        raw: RawDetection,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, CoordinatorError> {
        let sanitized = Detection::from_raw(raw);
        if sanitized.skipped > 0 {
            tracing::warn!(
                candidate = %candidate_id,
                skipped = sanitized.skipped,
                "dropped malformed detection entries"
            );
            self.transparency
                .record_skipped_detections(sanitized.skipped as u64);
        }
        self.process_frame(candidate_id, &sanitized.detection, now)
    }

    /// Hand every event to the sink; report the first failure, if any.
    fn persist(
        &self,
        candidate_id: &str,
        events: Vec<Event>,
    ) -> Result<Vec<Event>, CoordinatorError> {
        let mut persisted = 0;
        let mut first_error = None;

        for event in &events {
            match self.sink.append(candidate_id, event) {
                Ok(()) => persisted += 1,
                Err(e) => {
                    self.transparency.record_sink_failure();
                    tracing::warn!(
                        candidate = %candidate_id,
                        event_type = %event.event_type,
                        "event not persisted: {e}"
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            None => Ok(events),
            Some(source) => Err(CoordinatorError::Sink {
                events,
                persisted,
                source,
            }),
        }
    }

    fn resolve(&self, candidate_id: &str, now: DateTime<Utc>) -> SharedSlot {
        {
            let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = sessions.get(candidate_id) {
                return Arc::clone(slot);
            }
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let slot = sessions.entry(candidate_id.to_string()).or_insert_with(|| {
            let session = Session::new(candidate_id, &self.config, now);
            self.transparency.record_session_opened();
            tracing::info!(candidate = %candidate_id, session = %session.id(), "session opened");
            Arc::new(Mutex::new(SessionSlot {
                session,
                closed: false,
            }))
        });
        Arc::clone(slot)
    }

    /// End a candidate's session once any in-flight frame has finished.
    ///
    /// Returns the final state, or `None` if there was no session.
    pub fn close_session(&self, candidate_id: &str) -> Option<SessionSnapshot> {
        let slot = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(candidate_id)?;

        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        guard.closed = true;
        let snapshot = guard.session.snapshot();
        drop(guard);

        self.transparency.record_session_closed();
        tracing::info!(
            candidate = %candidate_id,
            frames = snapshot.frame_counter,
            "session closed"
        );
        Some(snapshot)
    }

    /// Close every session idle for longer than the configured timeout.
    ///
    /// Sessions busy with a frame are not idle and are left alone.
    pub fn close_idle(&self, now: DateTime<Utc>) -> Vec<SessionSnapshot> {
        let timeout = chrono::Duration::from_std(self.config.session_idle_timeout)
            .unwrap_or_else(|_| chrono::Duration::days(365));

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let mut closed = Vec::new();

        sessions.retain(|candidate_id, slot| {
            let Ok(mut guard) = slot.try_lock() else {
                return true;
            };
            if now - guard.session.last_activity() <= timeout {
                return true;
            }
            guard.closed = true;
            closed.push(guard.session.snapshot());
            tracing::info!(candidate = %candidate_id, "session closed after inactivity");
            false
        });

        for _ in &closed {
            self.transparency.record_session_closed();
        }
        closed
    }

    /// Discard a session's tracker state without closing it.
    pub fn reset_session(&self, candidate_id: &str, now: DateTime<Utc>) -> bool {
        let slot = {
            let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
            match sessions.get(candidate_id) {
                Some(slot) => Arc::clone(slot),
                None => return false,
            }
        };
        let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.closed {
            return false;
        }
        guard.session.reset(now);
        true
    }

    /// Current state of a candidate's session.
    pub fn snapshot(&self, candidate_id: &str) -> Option<SessionSnapshot> {
        let slot = {
            let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(sessions.get(candidate_id)?)
        };
        let guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Some(guard.session.snapshot())
    }

    /// Candidates with an open session, sorted.
    pub fn active_sessions(&self) -> Vec<String> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stored events for a candidate, most recent first.
    pub fn query(&self, candidate_id: &str, limit: usize) -> Result<Vec<Event>, CoordinatorError> {
        self.sink
            .query(candidate_id, limit)
            .map_err(CoordinatorError::Query)
    }

    /// Roll-up of up to `limit` stored events for a candidate.
    pub fn summary(&self, candidate_id: &str, limit: usize) -> Result<EventSummary, CoordinatorError> {
        let events = self.query(candidate_id, limit)?;
        Ok(EventSummary::from_events(candidate_id, &events))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transparency(&self) -> &SharedTransparencyLog {
        &self.transparency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{at, EventType};
    use crate::sink::MemorySink;

    fn coordinator() -> (SessionCoordinator, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (SessionCoordinator::new(Config::default(), sink.clone()), sink)
    }

    struct RejectingSink;

    impl EventSink for RejectingSink {
        fn append(&self, _: &str, _: &Event) -> Result<(), SinkError> {
            Err(SinkError::Closed)
        }

        fn query(&self, _: &str, _: usize) -> Result<Vec<Event>, SinkError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_first_frame_creates_session() {
        let (coordinator, _) = coordinator();
        assert!(coordinator.active_sessions().is_empty());
        coordinator
            .process_frame("cand", &Detection::single_face(0.0), at(0.0))
            .unwrap();
        assert_eq!(coordinator.active_sessions(), vec!["cand".to_string()]);
        assert_eq!(coordinator.transparency().stats().sessions_opened, 1);
    }

    #[test]
    fn test_events_forwarded_to_sink() {
        let (coordinator, sink) = coordinator();
        coordinator.process_frame("cand", &Detection::empty(), at(0.0)).unwrap();
        let events = coordinator
            .process_frame("cand", &Detection::empty(), at(10.0))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].extra.frame_id, Some(1));

        let stored = sink.query("cand", 10).unwrap();
        assert_eq!(stored, events);
    }

    #[test]
    fn test_sink_failure_surfaces_but_state_advances() {
        let coordinator =
            SessionCoordinator::new(Config::default(), Arc::new(RejectingSink));
        coordinator.process_frame("cand", &Detection::empty(), at(0.0)).unwrap();

        match coordinator.process_frame("cand", &Detection::empty(), at(10.0)) {
            Err(CoordinatorError::Sink {
                events, persisted, ..
            }) => {
                assert_eq!(events.len(), 1);
                assert_eq!(persisted, 0);
            }
            other => panic!("expected sink error, got {other:?}"),
        }

        // the NO_FACE cooldown was consumed despite the failed write
        let events = coordinator
            .process_frame("cand", &Detection::empty(), at(12.0))
            .unwrap();
        assert!(events.is_empty());
        assert_eq!(coordinator.transparency().stats().sink_failures, 1);
    }

    #[test]
    fn test_clock_regression_rejected() {
        let (coordinator, _) = coordinator();
        coordinator.process_frame("cand", &Detection::empty(), at(5.0)).unwrap();
        let err = coordinator
            .process_frame("cand", &Detection::empty(), at(1.0))
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::ClockWentBackwards { .. }));
    }

    #[test]
    fn test_raw_detection_skips_malformed_entries() {
        let (coordinator, _) = coordinator();
        let raw: RawDetection = serde_json::from_value(serde_json::json!({
            "face_boxes": [{"x": 0.3, "y": 0.2, "w": 0.3, "h": 0.4}],
            "objects": [
                {"label": "cell phone", "confidence": 0.9},
                {"label": "book", "confidence": 0.8,
                 "bbox": {"x_min": 1.0, "y_min": 1.0, "x_max": 2.0, "y_max": 2.0}}
            ]
        }))
        .unwrap();

        let events = coordinator.process_raw("cand", raw, at(0.0)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::ObjectDetected);
        assert_eq!(coordinator.transparency().stats().detections_skipped, 1);
    }

    #[test]
    fn test_close_and_reopen_starts_fresh() {
        let (coordinator, _) = coordinator();
        coordinator
            .process_frame("cand", &Detection::single_face(0.4), at(0.0))
            .unwrap();

        let closed = coordinator.close_session("cand").unwrap();
        assert_eq!(closed.frame_counter, 1);
        assert!(coordinator.close_session("cand").is_none());
        assert!(coordinator.snapshot("cand").is_none());

        coordinator
            .process_frame("cand", &Detection::single_face(0.4), at(6.0))
            .unwrap();
        let snapshot = coordinator.snapshot("cand").unwrap();
        assert_ne!(snapshot.session_id, closed.session_id);
        assert_eq!(snapshot.focus_away_since, Some(at(6.0)));
    }

    #[test]
    fn test_close_idle_sessions() {
        let (coordinator, _) = coordinator();
        coordinator.process_frame("old", &Detection::empty(), at(0.0)).unwrap();
        coordinator.process_frame("new", &Detection::empty(), at(250.0)).unwrap();

        let closed = coordinator.close_idle(at(301.0));
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].candidate_id, "old");
        assert_eq!(coordinator.active_sessions(), vec!["new".to_string()]);
    }

    #[test]
    fn test_reset_session() {
        let (coordinator, _) = coordinator();
        assert!(!coordinator.reset_session("cand", at(0.0)));
        coordinator
            .process_frame("cand", &Detection::single_face(0.4), at(0.0))
            .unwrap();
        assert!(coordinator.reset_session("cand", at(1.0)));
        assert_eq!(coordinator.snapshot("cand").unwrap().frame_counter, 0);
    }
}
