//! Per-frame perception results consumed by the trackers.
//!
//! Detectors report geometry and confidence only. The wire form
//! (`RawDetection`) tolerates missing and mistyped fields;
//! `Detection::from_raw` drops the malformed entries and keeps the rest of
//! the frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A face bounding box (top-left corner plus size).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl FaceBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Horizontal center of the box.
    pub fn center_x(&self) -> f64 {
        self.x + self.w / 2.0
    }
}

/// An object bounding box in corner form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBox {
    pub fn new(x_min: f64, y_min: f64, x_max: f64, y_max: f64) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }
}

/// A labeled object reported by the object detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDetection {
    /// Detector class name, e.g. "cell phone"
    pub label: String,
    /// Detector confidence in [0, 1]
    pub confidence: f64,
    pub bbox: BoundingBox,
}

impl ObjectDetection {
    pub fn new(label: impl Into<String>, confidence: f64, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// One frame's worth of perception output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Faces found in the frame; the first one is treated as the candidate
    #[serde(default)]
    pub face_boxes: Vec<FaceBox>,
    /// Signed horizontal deviation of the face from frame center, as a
    /// fraction of frame width (negative = left)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_offset: Option<f64>,
    #[serde(default)]
    pub objects: Vec<ObjectDetection>,
}

impl Detection {
    /// A frame with no faces and no objects.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A frame with a single face at the given head offset.
    pub fn single_face(head_offset: f64) -> Self {
        Self {
            face_boxes: vec![FaceBox::new(0.35, 0.25, 0.3, 0.4)],
            head_offset: Some(head_offset),
            objects: Vec::new(),
        }
    }

    /// A frame with `count` faces and no head pose.
    pub fn faces(count: usize) -> Self {
        Self {
            face_boxes: (0..count)
                .map(|i| FaceBox::new(0.1 + 0.2 * i as f64, 0.2, 0.15, 0.3))
                .collect(),
            head_offset: None,
            objects: Vec::new(),
        }
    }

    /// Add an object to the frame.
    pub fn with_object(mut self, object: ObjectDetection) -> Self {
        self.objects.push(object);
        self
    }

    pub fn face_count(&self) -> usize {
        self.face_boxes.len()
    }

    pub fn has_face(&self) -> bool {
        !self.face_boxes.is_empty()
    }

    /// Build a detection from its wire form, skipping malformed entries.
    pub fn from_raw(raw: RawDetection) -> SanitizedDetection {
        let mut skipped = 0usize;

        let face_boxes = raw
            .face_boxes
            .into_iter()
            .filter_map(|f| {
                let face = f.into_face_box();
                if face.is_none() {
                    skipped += 1;
                }
                face
            })
            .collect();

        let objects = raw
            .objects
            .into_iter()
            .filter_map(|o| {
                let object = o.into_object();
                if object.is_none() {
                    skipped += 1;
                }
                object
            })
            .collect();

        let head_offset = match raw.head_offset {
            Some(offset) if offset.is_finite() && (-0.5..=0.5).contains(&offset) => Some(offset),
            Some(_) => {
                skipped += 1;
                None
            }
            None => None,
        };

        SanitizedDetection {
            detection: Detection {
                face_boxes,
                head_offset,
                objects,
            },
            skipped,
        }
    }
}

/// Result of sanitizing a raw detection.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedDetection {
    pub detection: Detection,
    /// Number of entries (faces, objects, head offset) dropped as malformed
    pub skipped: usize,
}

/// Wire form of a detection where every field may be missing or mistyped.
///
/// Deserializing never fails on a bad entry; the entry is kept in a form
/// `Detection::from_raw` will reject and count.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(default, deserialize_with = "lenient::entries")]
    pub face_boxes: Vec<RawFaceBox>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub head_offset: Option<f64>,
    #[serde(default, deserialize_with = "lenient::entries")]
    pub objects: Vec<RawObject>,
}

impl From<Detection> for RawDetection {
    fn from(d: Detection) -> Self {
        Self {
            face_boxes: d
                .face_boxes
                .into_iter()
                .map(|f| RawFaceBox {
                    x: Some(f.x),
                    y: Some(f.y),
                    w: Some(f.w),
                    h: Some(f.h),
                })
                .collect(),
            head_offset: d.head_offset,
            objects: d
                .objects
                .into_iter()
                .map(|o| RawObject {
                    label: Some(o.label),
                    confidence: Some(o.confidence),
                    bbox: Some(RawBoundingBox {
                        x_min: Some(o.bbox.x_min),
                        y_min: Some(o.bbox.y_min),
                        x_max: Some(o.bbox.x_max),
                        y_max: Some(o.bbox.y_max),
                    }),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawFaceBox {
    #[serde(default, deserialize_with = "lenient::number")]
    pub x: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub y: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub w: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub h: Option<f64>,
}

impl RawFaceBox {
    fn into_face_box(self) -> Option<FaceBox> {
        let face = FaceBox::new(self.x?, self.y?, self.w?, self.h?);
        let finite = [face.x, face.y, face.w, face.h].iter().all(|v| v.is_finite());
        (finite && face.w > 0.0 && face.h > 0.0).then_some(face)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBoundingBox {
    #[serde(default, deserialize_with = "lenient::number")]
    pub x_min: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub y_min: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub x_max: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub y_max: Option<f64>,
}

impl RawBoundingBox {
    fn into_bbox(self) -> Option<BoundingBox> {
        let bbox = BoundingBox::new(self.x_min?, self.y_min?, self.x_max?, self.y_max?);
        let finite = [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max]
            .iter()
            .all(|v| v.is_finite());
        (finite && bbox.x_max >= bbox.x_min && bbox.y_max >= bbox.y_min).then_some(bbox)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawObject {
    #[serde(default, deserialize_with = "lenient::text")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient::entry")]
    pub bbox: Option<RawBoundingBox>,
}

impl RawObject {
    fn into_object(self) -> Option<ObjectDetection> {
        let label = self.label?;
        if label.trim().is_empty() {
            return None;
        }
        let confidence = self.confidence?;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return None;
        }
        let bbox = self.bbox?.into_bbox()?;
        Some(ObjectDetection::new(label, confidence, bbox))
    }
}

/// Field deserializers that turn wrongly typed input into values the
/// sanitizer rejects, instead of failing the whole frame.
mod lenient {
    use serde::de::{DeserializeOwned, Deserializer};
    use serde::Deserialize;
    use serde_json::Value;

    /// A present non-number becomes NaN so it is counted as malformed.
    pub fn number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => None,
            value => Some(value.as_f64().unwrap_or(f64::NAN)),
        })
    }

    pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            _ => None,
        })
    }

    pub fn entry<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => None,
            value => serde_json::from_value(value).ok(),
        })
    }

    /// Each unreadable element becomes an empty entry, which fails
    /// sanitization and is counted as skipped.
    pub fn entries<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .into_iter()
                .map(|item| serde_json::from_value(item).unwrap_or_default())
                .collect(),
            _ => vec![T::default()],
        })
    }
}

/// A recorded frame: when it was captured and what the detectors saw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedFrame {
    pub captured_at: DateTime<Utc>,
    #[serde(flatten)]
    pub detection: RawDetection,
}
