//! Captured frames and the capture boundary.
//!
//! - `Frame`: opaque RGB pixel buffer plus dimensions.
//! - `FrameSource`: camera abstraction. Pure capture, no policy.
//!
//! The detection loop never inspects pixels itself. Frames flow from a
//! `FrameSource` straight into an `InferenceEngine` and are dropped once the
//! tick that produced them is over.

use anyhow::{anyhow, Result};

/// A single captured frame (packed RGB24).
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Wrap a packed RGB24 buffer. The buffer length must match the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Read-only pixel access for inference engines.
    ///
    /// Engines must treat the slice as ephemeral and must not keep it past the
    /// `detect` call.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel content is never logged.
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

/// Camera abstraction.
///
/// A source is owned by exactly one `DetectionLoop` for its whole lifetime.
pub trait FrameSource: Send {
    /// Human-readable device identifier (e.g. "/dev/video0").
    fn name(&self) -> &str;

    /// Acquire the device. Failure is reported once and never retried.
    fn open(&mut self) -> Result<()>;

    /// Capture the next frame.
    fn read_frame(&mut self) -> Result<Frame>;

    /// Release the device. Must be safe to call more than once.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_length_mismatch() {
        assert!(Frame::new(vec![0u8; 10], 2, 2).is_err());
        let frame = Frame::new(vec![0u8; 12], 2, 2).expect("valid frame");
        assert_eq!(frame.pixels().len(), 12);
    }

    #[test]
    fn frame_debug_omits_pixels() {
        let frame = Frame::new(vec![7u8; 3], 1, 1).expect("valid frame");
        let rendered = format!("{:?}", frame);
        assert!(rendered.contains("bytes: 3"));
        assert!(!rendered.contains("[7"));
    }
}
