//! Monitoring transparency log.
//!
//! Counts what the monitor analyzed and what it flagged, so a candidate or
//! reviewer can see how much was recorded. No frame content is kept.

use crate::core::EventType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Running counters for the current process.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Frames run through the trackers
    frames_analyzed: AtomicU64,
    /// Malformed detection entries dropped
    detections_skipped: AtomicU64,
    no_face_events: AtomicU64,
    multiple_faces_events: AtomicU64,
    focus_lost_events: AtomicU64,
    object_events: AtomicU64,
    /// Events the sink refused
    sink_failures: AtomicU64,
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    /// When counting started
    started_at: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    pub fn new() -> Self {
        Self {
            frames_analyzed: AtomicU64::new(0),
            detections_skipped: AtomicU64::new(0),
            no_face_events: AtomicU64::new(0),
            multiple_faces_events: AtomicU64::new(0),
            focus_lost_events: AtomicU64::new(0),
            object_events: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            sessions_opened: AtomicU64::new(0),
            sessions_closed: AtomicU64::new(0),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that loads and saves its counters at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!("could not load previous transparency stats: {e}");
        }

        log
    }

    pub fn record_frame(&self) {
        self.frames_analyzed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_detections(&self, count: u64) {
        self.detections_skipped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_event(&self, event_type: EventType) {
        self.counter(event_type).fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sink_failure(&self) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_closed(&self) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
    }

    fn counter(&self, event_type: EventType) -> &AtomicU64 {
        match event_type {
            EventType::NoFace => &self.no_face_events,
            EventType::MultipleFaces => &self.multiple_faces_events,
            EventType::FocusLost => &self.focus_lost_events,
            EventType::ObjectDetected => &self.object_events,
        }
    }

    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            frames_analyzed: self.frames_analyzed.load(Ordering::Relaxed),
            detections_skipped: self.detections_skipped.load(Ordering::Relaxed),
            no_face_events: self.no_face_events.load(Ordering::Relaxed),
            multiple_faces_events: self.multiple_faces_events.load(Ordering::Relaxed),
            focus_lost_events: self.focus_lost_events.load(Ordering::Relaxed),
            object_events: self.object_events.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Monitoring Statistics:\n\
             - Frames analyzed: {}\n\
             - Malformed detections skipped: {}\n\
             - NO_FACE events: {}\n\
             - MULTIPLE_FACES events: {}\n\
             - FOCUS_LOST events: {}\n\
             - OBJECT_DETECTED events: {}\n\
             - Events not persisted: {}\n\
             - Sessions opened / closed: {} / {}\n\
             \n\
             What is recorded:\n\
             - Only event type, time, and detector geometry\n\
             - No video frames or images are stored",
            stats.frames_analyzed,
            stats.detections_skipped,
            stats.no_face_events,
            stats.multiple_faces_events,
            stats.focus_lost_events,
            stats.object_events,
            stats.sink_failures,
            stats.sessions_opened,
            stats.sessions_closed,
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                frames_analyzed: stats.frames_analyzed,
                detections_skipped: stats.detections_skipped,
                no_face_events: stats.no_face_events,
                multiple_faces_events: stats.multiple_faces_events,
                focus_lost_events: stats.focus_lost_events,
                object_events: stats.object_events,
                sink_failures: stats.sink_failures,
                sessions_opened: stats.sessions_opened,
                sessions_closed: stats.sessions_closed,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.frames_analyzed
                    .store(persisted.frames_analyzed, Ordering::Relaxed);
                self.detections_skipped
                    .store(persisted.detections_skipped, Ordering::Relaxed);
                self.no_face_events
                    .store(persisted.no_face_events, Ordering::Relaxed);
                self.multiple_faces_events
                    .store(persisted.multiple_faces_events, Ordering::Relaxed);
                self.focus_lost_events
                    .store(persisted.focus_lost_events, Ordering::Relaxed);
                self.object_events
                    .store(persisted.object_events, Ordering::Relaxed);
                self.sink_failures
                    .store(persisted.sink_failures, Ordering::Relaxed);
                self.sessions_opened
                    .store(persisted.sessions_opened, Ordering::Relaxed);
                self.sessions_closed
                    .store(persisted.sessions_closed, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        for counter in [
            &self.frames_analyzed,
            &self.detections_skipped,
            &self.no_face_events,
            &self.multiple_faces_events,
            &self.focus_lost_events,
            &self.object_events,
            &self.sink_failures,
            &self.sessions_opened,
            &self.sessions_closed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub frames_analyzed: u64,
    pub detections_skipped: u64,
    pub no_face_events: u64,
    pub multiple_faces_events: u64,
    pub focus_lost_events: u64,
    pub object_events: u64,
    pub sink_failures: u64,
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}

impl TransparencyStats {
    pub fn total_events(&self) -> u64 {
        self.no_face_events + self.multiple_faces_events + self.focus_lost_events + self.object_events
    }
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    frames_analyzed: u64,
    detections_skipped: u64,
    no_face_events: u64,
    multiple_faces_events: u64,
    focus_lost_events: u64,
    object_events: u64,
    sink_failures: u64,
    #[serde(default)]
    sessions_opened: u64,
    #[serde(default)]
    sessions_closed: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}
