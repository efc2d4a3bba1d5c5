//! Draw-command sinks for raster backends.
//!
//! A `Surface` is the boundary to the display hardware: it receives one list
//! of `DrawCommand`s per tick and reports whether the user asked to close it.
//! Low-level drawing (fonts, SPI/I2C transfers, windowing) lives behind it.

use anyhow::{anyhow, bail, Result};
use std::sync::{Arc, Mutex};

/// 24-bit colour. Monochrome panels treat any non-black colour as "on".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const WHITE: Rgb = Rgb(255, 255, 255);
    pub const GREEN: Rgb = Rgb(0, 255, 0);
    pub const YELLOW: Rgb = Rgb(255, 255, 0);
    pub const CYAN: Rgb = Rgb(0, 255, 255);
    pub const GRAY: Rgb = Rgb(128, 128, 128);
    pub const LIGHT_GRAY: Rgb = Rgb(200, 200, 200);
}

/// Nominal glyph height class; the surface picks the actual font.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextSize {
    /// ~8px, OLED panels.
    Tiny,
    /// ~18px.
    Small,
    /// ~24px, titles.
    Large,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrawCommand {
    Clear,
    Text {
        x: i32,
        y: i32,
        text: String,
        size: TextSize,
        color: Rgb,
    },
}

impl DrawCommand {
    pub fn text(x: i32, y: i32, text: impl Into<String>, size: TextSize, color: Rgb) -> Self {
        Self::Text {
            x,
            y,
            text: text.into(),
            size,
            color,
        }
    }
}

pub trait Surface: Send {
    /// Surface size in pixels.
    fn size(&self) -> (u32, u32);

    /// Replace the displayed content with `commands`.
    fn present(&mut self, commands: &[DrawCommand]) -> Result<()>;

    /// True once the user has asked to close the surface.
    fn poll_close(&mut self) -> bool;

    /// Release the surface. Repeated calls are no-ops.
    fn close(&mut self);
}

/// Open a surface by address.
///
/// - `stub://<name>` opens an in-memory `RecordingSurface`; append
///   `?close_after=N` to simulate the user closing it after N frames.
/// - `i2c:<bus>:<addr>`, `spi:<bus>.<dev>` and `window` name hardware
///   surfaces. No hardware driver is linked into this build, so they fail and
///   the caller falls back to the `none` backend.
pub fn open_surface(address: &str, size: (u32, u32)) -> Result<Box<dyn Surface>> {
    let address = address.trim();
    if let Some(rest) = address.strip_prefix("stub://") {
        let mut surface = RecordingSurface::new(size);
        if let Some((_, query)) = rest.split_once('?') {
            for pair in query.split('&') {
                match pair.split_once('=') {
                    Some(("close_after", n)) => {
                        let n: u64 = n
                            .parse()
                            .map_err(|_| anyhow!("invalid close_after in surface {}", address))?;
                        surface = surface.close_after(n);
                    }
                    _ => bail!("unknown surface option '{}' in {}", pair, address),
                }
            }
        }
        return Ok(Box::new(surface));
    }

    let kind = if address.starts_with("i2c:") {
        "I2C"
    } else if address.starts_with("spi:") {
        "SPI"
    } else if address == "window" {
        "windowing"
    } else {
        bail!("unrecognized surface address '{}'", address);
    };
    Err(anyhow!(
        "no {} display driver available for surface {} ({}x{})",
        kind,
        address,
        size.0,
        size.1
    ))
}

#[derive(Debug, Default)]
struct Recording {
    frames: Vec<Vec<DrawCommand>>,
    close_calls: u64,
}

/// In-memory surface that keeps every presented frame.
///
/// Clone the handle from `recording()` before handing the surface to a
/// backend to inspect what was drawn.
pub struct RecordingSurface {
    size: (u32, u32),
    state: Arc<Mutex<Recording>>,
    close_after: Option<u64>,
    closed: bool,
}

/// Read-only view of a `RecordingSurface`.
#[derive(Clone)]
pub struct SurfaceRecording {
    state: Arc<Mutex<Recording>>,
}

impl RecordingSurface {
    pub fn new(size: (u32, u32)) -> Self {
        Self {
            size,
            state: Arc::new(Mutex::new(Recording::default())),
            close_after: None,
            closed: false,
        }
    }

    /// Report a user close once `frames` frames have been presented.
    pub fn close_after(mut self, frames: u64) -> Self {
        self.close_after = Some(frames);
        self
    }

    pub fn recording(&self) -> SurfaceRecording {
        SurfaceRecording {
            state: self.state.clone(),
        }
    }
}

impl SurfaceRecording {
    pub fn frame_count(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn last_frame(&self) -> Option<Vec<DrawCommand>> {
        self.lock().frames.last().cloned()
    }

    /// Text of every `Text` command in the last frame, top to bottom.
    pub fn last_lines(&self) -> Vec<String> {
        self.last_frame()
            .unwrap_or_default()
            .into_iter()
            .filter_map(|cmd| match cmd {
                DrawCommand::Text { text, .. } => Some(text),
                DrawCommand::Clear => None,
            })
            .collect()
    }

    pub fn close_calls(&self) -> u64 {
        self.lock().close_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recording> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Surface for RecordingSurface {
    fn size(&self) -> (u32, u32) {
        self.size
    }

    fn present(&mut self, commands: &[DrawCommand]) -> Result<()> {
        if self.closed {
            bail!("surface is closed");
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.frames.push(commands.to_vec());
        Ok(())
    }

    fn poll_close(&mut self) -> bool {
        let presented = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .frames
            .len() as u64;
        self.close_after.is_some_and(|n| presented >= n)
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.close_calls += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_addresses_fail_without_drivers() {
        for address in ["i2c:1:0x3c", "spi:0.0", "window"] {
            let err = open_surface(address, (128, 64)).err().expect("must fail");
            assert!(err.to_string().contains("no "), "{}", err);
        }
        assert!(open_surface("hdmi", (128, 64)).is_err());
    }

    #[test]
    fn stub_surface_parses_close_after() -> Result<()> {
        let mut surface = open_surface("stub://oled?close_after=2", (128, 64))?;
        assert_eq!(surface.size(), (128, 64));
        surface.present(&[DrawCommand::Clear])?;
        assert!(!surface.poll_close());
        surface.present(&[DrawCommand::Clear])?;
        assert!(surface.poll_close());
        assert!(open_surface("stub://oled?close_after=x", (1, 1)).is_err());
        assert!(open_surface("stub://oled?bogus=1", (1, 1)).is_err());
        Ok(())
    }

    #[test]
    fn recording_close_is_idempotent() {
        let mut surface = RecordingSurface::new((10, 10));
        let recording = surface.recording();
        surface.close();
        surface.close();
        assert_eq!(recording.close_calls(), 1);
        assert!(surface.present(&[]).is_err());
    }
}
