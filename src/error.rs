//! Failure taxonomy for the detection loop.
//!
//! Adapters (sources, engines, backends) report plain `anyhow` errors. The loop
//! classifies every adapter failure into one of these variants at its own
//! boundary; only `DeviceUnavailable` escapes `DetectionLoop::run`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    /// The camera could not be opened. Fatal at startup.
    #[error("frame source {device} unavailable: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    /// The camera stopped producing frames. Fatal while running.
    #[error("capture failed after frame {frame}: {reason}")]
    Capture { frame: u64, reason: String },

    /// A backend could not be initialized. Degrades to the `none` backend.
    #[error("output backend {backend} failed to initialize: {reason}")]
    BackendInit { backend: &'static str, reason: String },

    /// A backend failed mid-run. Degrades to the `none` backend.
    #[error("output backend {backend} failed to render frame {frame}: {reason}")]
    BackendRender {
        backend: &'static str,
        frame: u64,
        reason: String,
    },

    /// The engine failed on one cycle. The previous detections stay current.
    #[error("inference failed on frame {frame}: {reason}")]
    Inference { frame: u64, reason: String },
}

impl DetectError {
    /// True for failures that end the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceUnavailable { .. } | Self::Capture { .. })
    }
}

/// Render an adapter error with its full context chain.
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        let capture = DetectError::Capture {
            frame: 6,
            reason: "eof".into(),
        };
        assert!(capture.is_fatal());
        assert_eq!(capture.to_string(), "capture failed after frame 6: eof");

        let render = DetectError::BackendRender {
            backend: "text",
            frame: 3,
            reason: "broken pipe".into(),
        };
        assert!(!render.is_fatal());
    }

    #[test]
    fn describe_keeps_context_chain() {
        let err = anyhow::anyhow!("ioctl failed").context("open v4l2 device /dev/video0");
        assert_eq!(describe(&err), "open v4l2 device /dev/video0: ioctl failed");
    }
}
