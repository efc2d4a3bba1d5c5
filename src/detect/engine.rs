use anyhow::Result;

use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// Object-detection model boundary.
///
/// # Audit Boundary
///
/// Implementations MUST:
/// - Treat the frame as read-only and not retain it past `detect`
/// - Return an empty vector (not an error) when nothing is found
/// - Be deterministic for a fixed model and frame
///
/// Engines may be slow; the loop only calls them on the detection cadence and
/// can move them onto a worker thread, hence the `Send` bound.
pub trait InferenceEngine: Send {
    /// Engine identifier for logs.
    fn name(&self) -> &'static str;

    /// Run detection, keeping only results with `confidence >= confidence_threshold`.
    fn detect(&mut self, frame: &Frame, confidence_threshold: f32)
        -> Result<Vec<DetectionResult>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
