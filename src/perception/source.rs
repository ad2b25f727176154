//! Perception sources: where per-frame detections come from.
//!
//! The face and object models are opaque. A `ModelSource` is built once at
//! startup from detector instances handed to it, and a `RecordedSource`
//! replays detections captured earlier as JSON lines.

use crate::perception::types::{Detection, FaceBox, ObjectDetection, RecordedFrame};
use chrono::{DateTime, Utc};
use std::io::BufRead;

/// Errors raised while producing detections.
#[derive(Debug)]
pub enum PerceptionError {
    /// Reading the underlying stream failed
    Io(String),
    /// A recorded frame could not be parsed
    Parse { line: usize, message: String },
    /// A model failed on this frame
    Model(String),
}

impl std::fmt::Display for PerceptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PerceptionError::Io(e) => write!(f, "Perception IO error: {e}"),
            PerceptionError::Parse { line, message } => {
                write!(f, "Invalid recorded frame on line {line}: {message}")
            }
            PerceptionError::Model(e) => write!(f, "Perception model error: {e}"),
        }
    }
}

impl std::error::Error for PerceptionError {}

/// Anything that can turn a frame into a detection.
pub trait PerceptionSource {
    type Frame;

    fn detect(&mut self, frame: &Self::Frame) -> Result<Detection, PerceptionError>;
}

/// A decoded camera frame handed to the models.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
    /// Pixel data in whatever layout the injected models expect
    pub pixels: Vec<u8>,
}

/// Face detector returning boxes in pixel coordinates.
pub trait FaceDetector: Send {
    fn detect_faces(&mut self, frame: &CameraFrame) -> Result<Vec<FaceBox>, PerceptionError>;
}

/// Object detector returning labeled boxes in pixel coordinates.
pub trait ObjectDetector: Send {
    fn detect_objects(
        &mut self,
        frame: &CameraFrame,
    ) -> Result<Vec<ObjectDetection>, PerceptionError>;
}

/// Facial landmark model yielding the nose tip x coordinate (pixels).
pub trait LandmarkEstimator: Send {
    fn nose_x(&mut self, frame: &CameraFrame) -> Result<Option<f64>, PerceptionError>;
}

/// Perception source backed by injected detector models.
pub struct ModelSource<F, O> {
    faces: F,
    objects: O,
    landmarks: Option<Box<dyn LandmarkEstimator>>,
    min_object_confidence: f64,
}

impl<F: FaceDetector, O: ObjectDetector> ModelSource<F, O> {
    pub fn new(faces: F, objects: O) -> Self {
        Self {
            faces,
            objects,
            landmarks: None,
            min_object_confidence: 0.0,
        }
    }

    /// Use a landmark model for head pose instead of the face box center.
    pub fn with_landmarks(mut self, landmarks: Box<dyn LandmarkEstimator>) -> Self {
        self.landmarks = Some(landmarks);
        self
    }

    /// Drop object detections below this confidence.
    pub fn with_min_object_confidence(mut self, min: f64) -> Self {
        self.min_object_confidence = min;
        self
    }
}

impl<F: FaceDetector, O: ObjectDetector> PerceptionSource for ModelSource<F, O> {
    type Frame = CameraFrame;

    fn detect(&mut self, frame: &CameraFrame) -> Result<Detection, PerceptionError> {
        if frame.width == 0 {
            return Err(PerceptionError::Model("frame has zero width".to_string()));
        }
        let width = f64::from(frame.width);

        let face_boxes = self.faces.detect_faces(frame)?;

        let offset = if face_boxes.is_empty() {
            None
        } else {
            let nose_x = match self.landmarks.as_mut() {
                Some(landmarks) => landmarks.nose_x(frame)?,
                None => None,
            };
            let x = nose_x.unwrap_or_else(|| face_boxes[0].center_x());
            head_offset(x, width)
        };

        let objects = self
            .objects
            .detect_objects(frame)?
            .into_iter()
            .filter(|o| o.confidence >= self.min_object_confidence)
            .collect();

        Ok(Detection {
            face_boxes,
            head_offset: offset,
            objects,
        })
    }
}

/// Offset of `x` from the frame's horizontal center, as a fraction of width,
/// clamped to [-0.5, 0.5]. `None` when the inputs give no finite offset.
pub fn head_offset(x: f64, frame_width: f64) -> Option<f64> {
    let offset = (x - frame_width / 2.0) / frame_width;
    offset.is_finite().then(|| offset.clamp(-0.5, 0.5))
}

/// Replays recorded frames from a JSON-lines stream.
pub struct RecordedSource<R> {
    reader: R,
    line: usize,
    buf: String,
}

impl<R: BufRead> RecordedSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            buf: String::new(),
        }
    }

    /// Read the next recorded frame, skipping blank lines.
    pub fn next_frame(&mut self) -> Option<Result<RecordedFrame, PerceptionError>> {
        loop {
            self.buf.clear();
            self.line += 1;
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(PerceptionError::Io(e.to_string()))),
            }

            let trimmed = self.buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            return Some(serde_json::from_str(trimmed).map_err(|e| PerceptionError::Parse {
                line: self.line,
                message: e.to_string(),
            }));
        }
    }
}

impl<R: BufRead> Iterator for RecordedSource<R> {
    type Item = Result<RecordedFrame, PerceptionError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame()
    }
}

impl<R> PerceptionSource for RecordedSource<R> {
    type Frame = RecordedFrame;

    fn detect(&mut self, frame: &RecordedFrame) -> Result<Detection, PerceptionError> {
        Ok(Detection::from_raw(frame.detection.clone()).detection)
    }
}
