//! Output backends.
//!
//! - `text`: console report on each new detection cycle
//! - `raster-small` / `raster-oled`: small-screen layouts drawn onto a `Surface`
//! - `none`: no-op, the universal fallback
//!
//! `BackendSlot` wraps whichever backend is configured and owns the
//! degradation policy; the loop never branches on the backend mode.

mod backend;
mod none;
mod raster;
mod slot;
pub mod surface;
mod text;

use crate::config::{BackendConfig, BackendMode};

pub use backend::{OutputBackend, RenderOutcome};
pub use none::NoneBackend;
pub use raster::{RasterBackend, RasterProfile};
pub use slot::BackendSlot;
pub use surface::{open_surface, DrawCommand, RecordingSurface, Surface, SurfaceRecording};
pub use text::TextBackend;

/// Build the configured backend. The result is not yet initialized.
pub fn build_backend(config: &BackendConfig) -> Box<dyn OutputBackend> {
    match config.mode {
        BackendMode::None => Box::new(NoneBackend::new()),
        BackendMode::Text => Box::new(TextBackend::stdout()),
        BackendMode::RasterSmall => Box::new(RasterBackend::new(RasterProfile::Small)),
        BackendMode::RasterOled => Box::new(RasterBackend::new(RasterProfile::Oled)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_backend_matches_mode_names() {
        for mode in [
            BackendMode::None,
            BackendMode::Text,
            BackendMode::RasterSmall,
            BackendMode::RasterOled,
        ] {
            let config = BackendConfig {
                mode,
                ..BackendConfig::default()
            };
            assert_eq!(build_backend(&config).name(), mode.as_str());
        }
    }
}
