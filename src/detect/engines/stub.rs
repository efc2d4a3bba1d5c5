use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::engine::InferenceEngine;
use crate::detect::result::{BoundingBox, DetectionResult};
use crate::frame::Frame;

const STUB_LABELS: [&str; 6] = ["person", "car", "dog", "cat", "bicycle", "chair"];
const MAX_STUB_DETECTIONS: usize = 3;

/// Stub engine for testing and demos.
///
/// Derives pseudo-detections from a digest of the pixel data, so identical
/// frames always produce identical results.
#[derive(Debug, Default)]
pub struct StubEngine;

impl StubEngine {
    pub fn new() -> Self {
        Self
    }
}

impl InferenceEngine for StubEngine {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> Result<Vec<DetectionResult>> {
        let digest: [u8; 32] = Sha256::digest(frame.pixels()).into();

        let count = digest[0] as usize % (MAX_STUB_DETECTIONS + 1);
        let width = frame.width.max(1);
        let height = frame.height.max(1);

        let detections = digest[1..]
            .chunks_exact(6)
            .take(count)
            .map(|chunk| {
                let label = STUB_LABELS[chunk[0] as usize % STUB_LABELS.len()];
                let confidence = chunk[1] as f32 / 255.0;
                let xa = scale(chunk[2], width);
                let ya = scale(chunk[3], height);
                let xb = scale(chunk[4], width);
                let yb = scale(chunk[5], height);
                DetectionResult::new(label, confidence, BoundingBox::from_corners(xa, ya, xb, yb))
            })
            .filter(|det| det.confidence() >= confidence_threshold)
            .collect();

        Ok(detections)
    }
}

fn scale(byte: u8, extent: u32) -> i32 {
    ((byte as u64 * extent as u64) / 255) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(fill: u8) -> Frame {
        Frame::new(vec![fill; 8 * 6 * 3], 8, 6).expect("frame")
    }

    #[test]
    fn stub_engine_is_deterministic() -> Result<()> {
        let mut engine = StubEngine::new();
        let first = engine.detect(&frame(3), 0.0)?;
        let second = engine.detect(&frame(3), 0.0)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn stub_engine_respects_threshold_and_bounds() -> Result<()> {
        let mut engine = StubEngine::new();
        for fill in 0..32u8 {
            let f = frame(fill);
            for det in engine.detect(&f, 0.5)? {
                assert!(det.confidence() >= 0.5);
                let bbox = det.bbox();
                assert!(bbox.x1 <= bbox.x2 && bbox.y1 <= bbox.y2);
                assert!(bbox.x2 <= 8 && bbox.y2 <= 6);
            }
            assert!(engine.detect(&f, 1.01)?.is_empty());
        }
        Ok(())
    }
}
