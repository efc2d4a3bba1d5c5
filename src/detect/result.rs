use serde::Serialize;

/// Axis-aligned box in frame pixel coordinates. Invariant: `x1 <= x2`, `y1 <= y2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Build a box from two corners in any order.
    pub fn from_corners(xa: i32, ya: i32, xb: i32, yb: i32) -> Self {
        Self {
            x1: xa.min(xb),
            y1: ya.min(yb),
            x2: xa.max(xb),
            y2: ya.max(yb),
        }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }
}

/// One detected object. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionResult {
    label: String,
    confidence: f32,
    bbox: BoundingBox,
}

impl DetectionResult {
    /// Confidence is clamped into `[0, 1]`; NaN becomes 0.
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }
}

/// Detections produced by one inference cycle.
///
/// `frame_index` is the frame count at which the cycle ran. Index 0 is reserved
/// for the initial set that exists before any cycle has completed.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionSet {
    frame_index: u64,
    detections: Vec<DetectionResult>,
}

impl DetectionSet {
    pub fn new(frame_index: u64, detections: Vec<DetectionResult>) -> Self {
        Self {
            frame_index,
            detections,
        }
    }

    /// The placeholder set rendered before the first detection cycle.
    pub fn initial() -> Self {
        Self::new(0, Vec::new())
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// True until the first detection cycle has replaced this set.
    pub fn is_initial(&self) -> bool {
        self.frame_index == 0
    }

    pub fn detections(&self) -> &[DetectionResult] {
        &self.detections
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
