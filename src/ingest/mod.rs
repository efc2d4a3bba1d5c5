//! Frame capture sources.
//!
//! - Synthetic source for `stub://` devices (testing, demos)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Sources only capture. Cadence, decimation and retry policy belong to the
//! detection loop, which owns the source for its whole lifetime.

#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::config::CaptureConfig;
use crate::frame::FrameSource;

pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Select a source for the configured device.
///
/// `stub://` devices are synthetic; anything else is treated as a local
/// device node. The source is returned unopened.
pub fn open_source(config: &CaptureConfig) -> Result<Box<dyn FrameSource>> {
    if config.device.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config.clone())));
    }
    device_source(config)
}

#[cfg(feature = "ingest-v4l2")]
fn device_source(config: &CaptureConfig) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Source::new(config.clone())))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn device_source(config: &CaptureConfig) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!(
        "camera {} requires the ingest-v4l2 feature",
        config.device
    )
}
