//! Proctor Watch - integrity monitoring for remote exams.
//!
//! This library turns a stream of per-frame webcam detections (face boxes,
//! head pose, labeled objects) into a low-rate, deduplicated stream of
//! integrity-violation events.
//!
//! # Events
//!
//! - **NO_FACE**: the candidate has been out of frame for a sustained period
//! - **MULTIPLE_FACES**: more than one face is in frame (rate-limited)
//! - **FOCUS_LOST**: the head stayed turned away from the screen too long
//! - **OBJECT_DETECTED**: a prohibited item (phone, book, ...) is visible
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Proctor Watch                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────────────┐    │
//! │  │ Perception  │──▶│   Session   │──▶│ Presence / MultiFace │    │
//! │  │   Source    │   │ Coordinator │   │ Focus / ObjectWatch  │    │
//! │  └─────────────┘   └─────────────┘   └──────────────────────┘    │
//! │                           │                     │                │
//! │                           ▼                     ▼                │
//! │                    ┌─────────────┐      ┌─────────────┐          │
//! │                    │Transparency │      │ Event Sink  │          │
//! │                    │    Log      │      │ (per cand.) │          │
//! │                    └─────────────┘      └─────────────┘          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use proctor_watch::{Config, Detection, MemorySink, SessionCoordinator};
//!
//! let sink = Arc::new(MemorySink::new());
//! let coordinator = SessionCoordinator::new(Config::default(), sink);
//!
//! let events = coordinator
//!     .process_frame_now("candidate_1", &Detection::single_face(0.0))
//!     .expect("in-memory sink never fails");
//! assert!(events.is_empty());
//! ```

pub mod config;
pub mod coordinator;
pub mod core;
pub mod perception;
pub mod sink;
pub mod transparency;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{ClockPolicy, Config, ConfigError, SuspiciousLabels, Thresholds};
pub use coordinator::{CoordinatorError, SessionCoordinator};
pub use core::{Direction, Event, EventExtra, EventType, Session, SessionSnapshot};
pub use perception::{
    Detection, FaceBox, ObjectDetection, PerceptionError, PerceptionSource, RawDetection,
    RecordedFrame, RecordedSource,
};
pub use sink::{EventSink, EventSummary, JsonlSink, MemorySink, QueuedSink, SinkError};
pub use transparency::{SharedTransparencyLog, TransparencyLog, TransparencyStats};

#[cfg(feature = "gateway")]
pub use sink::{RemoteSink, RemoteSinkConfig};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Notice that can be shown to candidates before monitoring starts.
pub const MONITORING_NOTICE: &str = r#"
╔══════════════════════════════════════════════════════════════════╗
║              PROCTOR WATCH - MONITORING NOTICE                   ║
╠══════════════════════════════════════════════════════════════════╣
║                                                                  ║
║  Your webcam feed is analyzed during this exam.                  ║
║                                                                  ║
║  ✓ WHAT IS FLAGGED:                                              ║
║    • Leaving the camera view for an extended time                ║
║    • Additional people in view                                   ║
║    • Looking away from the screen for an extended time           ║
║    • Phones, books, notes, laptops or tablets in view            ║
║                                                                  ║
║  ✗ WHAT IS NEVER STORED:                                         ║
║    • Video frames or images                                      ║
║    • Biometric identity data                                     ║
║                                                                  ║
║  Only the event type, time, and detector geometry are kept.      ║
║                                                                  ║
║  Monitoring statistics can be viewed anytime with:               ║
║    proctor-watch status                                          ║
║                                                                  ║
╚══════════════════════════════════════════════════════════════════╝
"#;
