use anyhow::{bail, Context, Result};

use super::backend::{OutputBackend, RenderOutcome};
use super::surface::{open_surface, DrawCommand, Rgb, Surface, TextSize};
use crate::config::BackendConfig;
use crate::detect::DetectionSet;
use crate::stats::LoopStats;

const TITLE: &str = "Object Detection";
const OLED_MAX_ENTRIES: usize = 3;

/// Physical class of a small raster display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RasterProfile {
    /// TFT / HDMI panels around 320x240.
    Small,
    /// Monochrome OLED panels around 128x64 (e.g. SSD1306).
    Oled,
}

impl RasterProfile {
    pub fn default_resolution(&self) -> (u32, u32) {
        match self {
            Self::Small => (320, 240),
            Self::Oled => (128, 64),
        }
    }

    pub fn default_surface(&self) -> &'static str {
        match self {
            Self::Small => "window",
            Self::Oled => "i2c:1:0x3c",
        }
    }

    /// Entry cap for the physical size of the panel.
    fn max_entries(&self, configured: usize) -> usize {
        match self {
            Self::Small => configured,
            Self::Oled => configured.min(OLED_MAX_ENTRIES),
        }
    }
}

/// Raster backend: title, throughput line and the top detections.
pub struct RasterBackend {
    profile: RasterProfile,
    surface: Option<Box<dyn Surface>>,
    max_entries: usize,
    height: i32,
}

impl RasterBackend {
    pub fn new(profile: RasterProfile) -> Self {
        Self {
            profile,
            surface: None,
            max_entries: 0,
            height: 0,
        }
    }

    /// Draw onto an already opened surface instead of opening one by address.
    pub fn with_surface(profile: RasterProfile, surface: Box<dyn Surface>) -> Self {
        Self {
            surface: Some(surface),
            ..Self::new(profile)
        }
    }

    /// Build the draw list for one frame.
    pub fn layout(&self, detections: &DetectionSet, stats: &LoopStats) -> Vec<DrawCommand> {
        match self.profile {
            RasterProfile::Small => self.layout_small(detections, stats),
            RasterProfile::Oled => self.layout_oled(detections, stats),
        }
    }

    fn layout_small(&self, detections: &DetectionSet, stats: &LoopStats) -> Vec<DrawCommand> {
        let mut cmds = vec![
            DrawCommand::Clear,
            DrawCommand::text(10, 10, TITLE, TextSize::Large, Rgb::GREEN),
            DrawCommand::text(
                10,
                40,
                format!("FPS: {:.1} | Frame: {}", stats.current_fps, stats.frame_count),
                TextSize::Small,
                Rgb::YELLOW,
            ),
        ];

        let mut y = 70;
        if detections.is_empty() {
            cmds.push(DrawCommand::text(
                10,
                y,
                "No objects detected",
                TextSize::Small,
                Rgb::GRAY,
            ));
            return cmds;
        }

        cmds.push(DrawCommand::text(
            10,
            y,
            format!("Detected: {} objects", detections.len()),
            TextSize::Small,
            Rgb::WHITE,
        ));
        y += 25;
        for (i, det) in detections.detections().iter().take(self.max_entries).enumerate() {
            // Each entry is a name line plus a confidence line; skip what won't fit.
            if y + 45 > self.height {
                break;
            }
            cmds.push(DrawCommand::text(
                20,
                y,
                format!("{}. {}", i + 1, det.label()),
                TextSize::Small,
                Rgb::CYAN,
            ));
            y += 20;
            cmds.push(DrawCommand::text(
                20,
                y,
                format!("   Conf: {}", percent(det.confidence())),
                TextSize::Small,
                Rgb::LIGHT_GRAY,
            ));
            y += 25;
        }
        cmds
    }

    fn layout_oled(&self, detections: &DetectionSet, stats: &LoopStats) -> Vec<DrawCommand> {
        let mut cmds = vec![
            DrawCommand::Clear,
            DrawCommand::text(2, 0, TITLE, TextSize::Tiny, Rgb::WHITE),
            DrawCommand::text(
                2,
                12,
                format!("FPS:{:.1} F:{}", stats.current_fps, stats.frame_count),
                TextSize::Tiny,
                Rgb::WHITE,
            ),
        ];

        let mut y = 26;
        if detections.is_empty() {
            cmds.push(DrawCommand::text(2, y, "No objects", TextSize::Tiny, Rgb::WHITE));
            return cmds;
        }

        cmds.push(DrawCommand::text(
            2,
            y,
            format!("Found: {}", detections.len()),
            TextSize::Tiny,
            Rgb::WHITE,
        ));
        y += 12;
        for (i, det) in detections.detections().iter().take(self.max_entries).enumerate() {
            // Tiny glyphs leave their bottom rows blank, so a line only needs
            // its top row on the panel.
            if y >= self.height {
                break;
            }
            cmds.push(DrawCommand::text(
                2,
                y,
                format!("{}.{} {}", i + 1, det.label(), percent(det.confidence())),
                TextSize::Tiny,
                Rgb::WHITE,
            ));
            y += 10;
        }
        cmds
    }
}

fn percent(confidence: f32) -> String {
    format!("{:.0}%", confidence * 100.0)
}

impl OutputBackend for RasterBackend {
    fn name(&self) -> &'static str {
        match self.profile {
            RasterProfile::Small => "raster-small",
            RasterProfile::Oled => "raster-oled",
        }
    }

    fn initialize(&mut self, config: &BackendConfig) -> Result<()> {
        if self.surface.is_none() {
            let size = config
                .resolution
                .unwrap_or_else(|| self.profile.default_resolution());
            let address = config
                .surface
                .as_deref()
                .unwrap_or_else(|| self.profile.default_surface());
            let surface = open_surface(address, size)
                .with_context(|| format!("open {} surface {}", self.name(), address))?;
            self.surface = Some(surface);
        }
        let Some(surface) = self.surface.as_ref() else {
            bail!("{} has no surface", self.name());
        };
        let (width, height) = surface.size();
        self.height = height as i32;
        self.max_entries = self.profile.max_entries(config.max_displayed_detections);
        log::info!(
            "{} display ready: {}x{}, up to {} entries",
            self.name(),
            width,
            height,
            self.max_entries
        );
        Ok(())
    }

    fn render(&mut self, detections: &DetectionSet, stats: &LoopStats) -> Result<RenderOutcome> {
        let cmds = self.layout(detections, stats);
        let name = self.name();
        let Some(surface) = self.surface.as_mut() else {
            bail!("{} is not initialized", name);
        };
        surface
            .present(&cmds)
            .with_context(|| format!("present {} frame", name))?;
        if surface.poll_close() {
            return Ok(RenderOutcome::Stop);
        }
        Ok(RenderOutcome::Continue)
    }

    fn cleanup(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            surface.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, DetectionResult};
    use crate::output::surface::RecordingSurface;

    fn set_of(n: usize) -> DetectionSet {
        let bbox = BoundingBox::from_corners(0, 0, 10, 10);
        let dets = (0..n)
            .map(|i| DetectionResult::new(format!("obj{}", i), 0.5, bbox))
            .collect();
        DetectionSet::new(5, dets)
    }

    fn stats() -> LoopStats {
        LoopStats {
            frame_count: 40,
            current_fps: 12.0,
            ..LoopStats::default()
        }
    }

    fn config(max: usize) -> BackendConfig {
        BackendConfig {
            max_displayed_detections: max,
            ..BackendConfig::default()
        }
    }

    #[test]
    fn small_layout_lists_entries() -> Result<()> {
        let surface = RecordingSurface::new((320, 240));
        let recording = surface.recording();
        let mut backend = RasterBackend::with_surface(RasterProfile::Small, Box::new(surface));
        backend.initialize(&config(5))?;

        assert_eq!(backend.render(&set_of(2), &stats())?, RenderOutcome::Continue);
        let lines = recording.last_lines();
        assert_eq!(lines[0], TITLE);
        assert_eq!(lines[1], "FPS: 12.0 | Frame: 40");
        assert_eq!(lines[2], "Detected: 2 objects");
        assert_eq!(lines[3], "1. obj0");
        assert_eq!(lines[4], "   Conf: 50%");
        assert_eq!(lines.len(), 7);
        Ok(())
    }

    #[test]
    fn small_layout_truncates_to_surface_height() -> Result<()> {
        let surface = RecordingSurface::new((320, 240));
        let recording = surface.recording();
        let mut backend = RasterBackend::with_surface(RasterProfile::Small, Box::new(surface));
        backend.initialize(&config(10))?;
        backend.render(&set_of(10), &stats())?;
        // 240px fits three two-line entries below the header.
        let entries = recording
            .last_lines()
            .iter()
            .filter(|l| l.contains("Conf:"))
            .count();
        assert_eq!(entries, 3);
        Ok(())
    }

    #[test]
    fn oled_caps_entries_at_three() -> Result<()> {
        let surface = RecordingSurface::new((128, 64));
        let recording = surface.recording();
        let mut backend = RasterBackend::with_surface(RasterProfile::Oled, Box::new(surface));
        backend.initialize(&config(8))?;
        backend.render(&set_of(5), &stats())?;
        let lines = recording.last_lines();
        assert_eq!(lines[1], "FPS:12.0 F:40");
        assert_eq!(lines[2], "Found: 5");
        assert_eq!(lines[3], "1.obj0 50%");
        // 64px rows: header at 0/12, count at 26, entries at 38/48/58.
        assert_eq!(lines[5], "3.obj2 50%");
        assert_eq!(lines.len(), 6);
        Ok(())
    }

    #[test]
    fn oled_truncates_on_short_panels() -> Result<()> {
        let surface = RecordingSurface::new((128, 48));
        let recording = surface.recording();
        let mut backend = RasterBackend::with_surface(RasterProfile::Oled, Box::new(surface));
        backend.initialize(&config(3))?;
        backend.render(&set_of(3), &stats())?;
        let lines = recording.last_lines();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3], "1.obj0 50%");
        Ok(())
    }

    #[test]
    fn empty_set_shows_no_objects() -> Result<()> {
        let surface = RecordingSurface::new((128, 64));
        let recording = surface.recording();
        let mut backend = RasterBackend::with_surface(RasterProfile::Oled, Box::new(surface));
        backend.initialize(&config(3))?;
        backend.render(&DetectionSet::new(10, Vec::new()), &stats())?;
        assert_eq!(recording.last_lines().last().map(String::as_str), Some("No objects"));
        Ok(())
    }

    #[test]
    fn user_close_stops_rendering() -> Result<()> {
        let surface = RecordingSurface::new((320, 240)).close_after(2);
        let mut backend = RasterBackend::with_surface(RasterProfile::Small, Box::new(surface));
        backend.initialize(&config(5))?;
        assert_eq!(backend.render(&set_of(0), &stats())?, RenderOutcome::Continue);
        assert_eq!(backend.render(&set_of(0), &stats())?, RenderOutcome::Stop);
        Ok(())
    }

    #[test]
    fn default_hardware_surface_fails_to_initialize() {
        let mut backend = RasterBackend::new(RasterProfile::Oled);
        assert!(backend.initialize(&config(3)).is_err());
        backend.cleanup();
        backend.cleanup();
    }

    #[test]
    fn cleanup_closes_surface_once() -> Result<()> {
        let surface = RecordingSurface::new((128, 64));
        let recording = surface.recording();
        let mut backend = RasterBackend::with_surface(RasterProfile::Oled, Box::new(surface));
        backend.initialize(&config(3))?;
        backend.cleanup();
        backend.cleanup();
        assert_eq!(recording.close_calls(), 1);
        assert!(backend.render(&set_of(1), &stats()).is_err());
        Ok(())
    }
}
