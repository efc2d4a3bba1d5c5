#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::engine::InferenceEngine;
use crate::detect::result::{BoundingBox, DetectionResult};
use crate::frame::Frame;

const NMS_IOU_THRESHOLD: f32 = 0.45;

const COCO_LABELS: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Tract-based engine for YOLO-style ONNX detectors.
///
/// Expects a single `[1, 4 + classes, anchors]` output (or its transpose) with
/// `cx, cy, w, h` boxes in model-input pixels followed by per-class scores.
/// Frames are nearest-neighbour resized to the model input and boxes are
/// scaled back to frame coordinates.
pub struct TractEngine {
    model: TypedRunnableModel<TypedModel>,
    input_width: u32,
    input_height: u32,
    labels: Vec<String>,
}

impl TractEngine {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_width: u32, input_height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_height as usize, input_width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_width,
            input_height,
            labels: COCO_LABELS.iter().map(|l| l.to_string()).collect(),
        })
    }

    /// Replace the default COCO labels with one label per line from `path`.
    pub fn with_labels_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels file {}", path.display()))?;
        let labels: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if labels.is_empty() {
            return Err(anyhow!("labels file {} is empty", path.display()));
        }
        self.labels = labels;
        Ok(self)
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let src_w = frame.width as usize;
        let src_h = frame.height as usize;
        if src_w == 0 || src_h == 0 {
            return Err(anyhow!("cannot run inference on an empty frame"));
        }
        let pixels = frame.pixels();
        let dst_w = self.input_width as usize;
        let dst_h = self.input_height as usize;

        let input = tract_ndarray::Array4::from_shape_fn((1, 3, dst_h, dst_w), |(_, c, y, x)| {
            let sx = x * src_w / dst_w;
            let sy = y * src_h / dst_h;
            pixels[(sy * src_w + sx) * 3 + c] as f32 / 255.0
        });

        Ok(input.into_tensor())
    }

    fn label_for(&self, class_id: usize) -> String {
        self.labels
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class{}", class_id))
    }
}

impl InferenceEngine for TractEngine {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<Vec<DetectionResult>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;

        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected detector output shape {:?}", shape));
        }
        // YOLOv8 exports [1, 4 + classes, anchors]; some exports transpose it.
        let transposed = shape[1] > shape[2];
        let (features, anchors) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        if features <= 4 {
            return Err(anyhow!("detector output has no class scores: {:?}", shape));
        }
        let at = |feature: usize, anchor: usize| -> f32 {
            if transposed {
                view[[0, anchor, feature]]
            } else {
                view[[0, feature, anchor]]
            }
        };

        let scale_x = frame.width as f32 / self.input_width as f32;
        let scale_y = frame.height as f32 / self.input_height as f32;

        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let (class_id, score) = (4..features)
                .map(|f| (f - 4, at(f, anchor)))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < confidence_threshold {
                continue;
            }
            let cx = at(0, anchor);
            let cy = at(1, anchor);
            let w = at(2, anchor);
            let h = at(3, anchor);
            let bbox = BoundingBox::from_corners(
                to_frame_px(cx - w / 2.0, scale_x, frame.width),
                to_frame_px(cy - h / 2.0, scale_y, frame.height),
                to_frame_px(cx + w / 2.0, scale_x, frame.width),
                to_frame_px(cy + h / 2.0, scale_y, frame.height),
            );
            candidates.push((class_id, score, bbox));
        }

        Ok(suppress(candidates, NMS_IOU_THRESHOLD)
            .into_iter()
            .map(|(class_id, score, bbox)| DetectionResult::new(self.label_for(class_id), score, bbox))
            .collect())
    }
}

/// Scale a model-space coordinate into frame pixels, clamped to `0..=extent`.
/// Non-finite model outputs map to 0.
fn to_frame_px(v: f32, scale: f32, extent: u32) -> i32 {
    let px = (v * scale).round();
    if !px.is_finite() {
        return 0;
    }
    px.clamp(0.0, extent as f32) as i32
}

/// Greedy per-class non-maximum suppression, highest score first.
fn suppress(
    mut candidates: Vec<(usize, f32, BoundingBox)>,
    iou_threshold: f32,
) -> Vec<(usize, f32, BoundingBox)> {
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let mut keep: Vec<(usize, f32, BoundingBox)> = Vec::new();
    for cand in candidates {
        if keep
            .iter()
            .all(|kept| kept.0 != cand.0 || iou(kept.2, cand.2) <= iou_threshold)
        {
            keep.push(cand);
        }
    }
    keep
}

fn iou(a: BoundingBox, b: BoundingBox) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0) as f32;
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0) as f32;
    let inter = ix * iy;
    let union = a.width() as f32 * a.height() as f32 + b.width() as f32 * b.height() as f32 - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suppression_keeps_best_overlapping_box_per_class() {
        let a = BoundingBox::from_corners(0, 0, 10, 10);
        let b = BoundingBox::from_corners(1, 1, 11, 11);
        let far = BoundingBox::from_corners(50, 50, 60, 60);
        let kept = suppress(vec![(0, 0.6, b), (0, 0.9, a), (0, 0.7, far), (1, 0.5, b)], 0.45);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].1, 0.9);
        assert!(kept.iter().any(|k| k.0 == 1));
    }

    #[test]
    fn box_corners_are_clamped_to_the_frame() {
        assert_eq!(to_frame_px(1.0e12, 1.0, 640), 640);
        assert_eq!(to_frame_px(-1.0e12, 1.0, 640), 0);
        assert_eq!(to_frame_px(f32::NAN, 1.0, 640), 0);
        assert_eq!(to_frame_px(f32::INFINITY, 0.5, 480), 0);
        assert_eq!(to_frame_px(100.0, 0.5, 480), 50);

        let huge = BoundingBox::from_corners(0, 0, 640, 480);
        assert!((iou(huge, huge) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox::from_corners(0, 0, 5, 5);
        let b = BoundingBox::from_corners(10, 10, 15, 15);
        assert_eq!(iou(a, b), 0.0);
        assert!((iou(a, a) - 1.0).abs() < f32::EPSILON);
    }
}
