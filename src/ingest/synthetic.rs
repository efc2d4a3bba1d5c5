//! Synthetic frame source for `stub://` devices.
//!
//! Produces a deterministic moving pattern so that demos and tests can run the
//! full loop without camera hardware.

use anyhow::{anyhow, Result};

use crate::config::CaptureConfig;
use crate::frame::{rgb_len, Frame, FrameSource};

pub struct SyntheticSource {
    config: CaptureConfig,
    open: bool,
    frame_count: u64,
    /// Simulated scene state; changes every 50 frames.
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            open: false,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn generate_synthetic_pixels(&mut self) -> Result<Vec<u8>> {
        let pixel_count = rgb_len(self.config.width, self.config.height)?;

        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        Ok(pixels)
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.config.device
    }

    fn open(&mut self) -> Result<()> {
        if self.config.width == 0 || self.config.height == 0 {
            return Err(anyhow!(
                "invalid capture resolution {}x{}",
                self.config.width,
                self.config.height
            ));
        }
        self.open = true;
        log::info!(
            "SyntheticSource: opened {} ({}x{})",
            self.config.device,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame> {
        if !self.open {
            return Err(anyhow!("{} is not open", self.config.device));
        }
        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels()?;
        Frame::new(pixels, self.config.width, self.config.height)
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            log::info!(
                "SyntheticSource: closed {} after {} frames",
                self.config.device,
                self.frame_count
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> CaptureConfig {
        CaptureConfig {
            device: "stub://test".to_string(),
            width: 64,
            height: 48,
            target_fps: 30,
        }
    }

    #[test]
    fn synthetic_source_produces_frames() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config());
        source.open()?;

        let frame = source.read_frame()?;
        assert_eq!(frame.width, 64);
        assert_eq!(frame.height, 48);
        assert_eq!(frame.pixels().len(), 64 * 48 * 3);
        Ok(())
    }

    #[test]
    fn synthetic_frames_change_over_time() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config());
        source.open()?;

        let first = source.read_frame()?;
        let second = source.read_frame()?;
        assert_ne!(first.pixels(), second.pixels());
        Ok(())
    }

    #[test]
    fn closed_source_refuses_capture() -> Result<()> {
        let mut source = SyntheticSource::new(stub_config());
        assert!(source.read_frame().is_err());
        source.open()?;
        source.close();
        source.close();
        assert!(source.read_frame().is_err());
        Ok(())
    }
}
