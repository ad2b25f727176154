//! Transparency module for the proctoring monitor.
//!
//! This module tracks and exposes what the monitor analyzed and flagged,
//! supporting candidate trust and review.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
