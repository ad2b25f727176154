//! Perception input for the proctoring monitor.
//!
//! This module defines the per-frame detection model and the sources that
//! produce it: injected face/object models or a recorded detection stream.

pub mod source;
pub mod types;

// Re-export commonly used types
pub use source::{
    head_offset, CameraFrame, FaceDetector, LandmarkEstimator, ModelSource, ObjectDetector,
    PerceptionError, PerceptionSource, RecordedSource,
};
pub use types::{
    BoundingBox, Detection, FaceBox, ObjectDetection, RawDetection, RecordedFrame,
    SanitizedDetection,
};
