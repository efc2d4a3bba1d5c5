use anyhow::{bail, Context, Result};
use std::io::Write;

use super::backend::{OutputBackend, RenderOutcome};
use crate::config::BackendConfig;
use crate::detect::DetectionSet;
use crate::stats::LoopStats;

const RULE_WIDTH: usize = 50;
const DEFAULT_FPS_EVERY: u64 = 30;

/// Console report writer.
///
/// A report is written only when a new detection cycle has landed; the cached
/// set between cycles produces no output. A throughput line is written every
/// `fps_every` frames.
pub struct TextBackend {
    out: Box<dyn Write + Send>,
    last_reported: u64,
    fps_every: u64,
    initialized: bool,
    closed: bool,
}

impl TextBackend {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            last_reported: 0,
            fps_every: DEFAULT_FPS_EVERY,
            initialized: false,
            closed: false,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Throughput line cadence in frames; 0 disables it.
    pub fn with_fps_every(mut self, frames: u64) -> Self {
        self.fps_every = frames;
        self
    }

    fn write_report(&mut self, detections: &DetectionSet) -> Result<()> {
        let frame = detections.frame_index();
        if detections.is_empty() {
            writeln!(self.out, "\nframe {} - no objects detected", frame)?;
            return Ok(());
        }

        let rule = "=".repeat(RULE_WIDTH);
        writeln!(self.out, "\n{}", rule)?;
        writeln!(
            self.out,
            "frame {} - detected {} object{}",
            frame,
            detections.len(),
            if detections.len() == 1 { "" } else { "s" }
        )?;
        writeln!(self.out, "{}", rule)?;
        for (i, det) in detections.detections().iter().enumerate() {
            let bbox = det.bbox();
            writeln!(self.out, "\nobject {}:", i + 1)?;
            writeln!(self.out, "  name: {}", det.label())?;
            writeln!(self.out, "  confidence: {:.2}%", det.confidence() * 100.0)?;
            writeln!(
                self.out,
                "  position: ({}, {}) -> ({}, {})",
                bbox.x1, bbox.y1, bbox.x2, bbox.y2
            )?;
        }
        Ok(())
    }
}

impl OutputBackend for TextBackend {
    fn name(&self) -> &'static str {
        "text"
    }

    fn initialize(&mut self, _config: &BackendConfig) -> Result<()> {
        if self.closed {
            bail!("text backend already cleaned up");
        }
        self.initialized = true;
        Ok(())
    }

    fn render(&mut self, detections: &DetectionSet, stats: &LoopStats) -> Result<RenderOutcome> {
        if !self.initialized || self.closed {
            bail!("text backend is not initialized");
        }

        let mut wrote = false;
        if !detections.is_initial() && detections.frame_index() != self.last_reported {
            self.write_report(detections)
                .context("write detection report")?;
            self.last_reported = detections.frame_index();
            wrote = true;
        }
        if self.fps_every > 0 && stats.frame_count > 0 && stats.frame_count % self.fps_every == 0 {
            writeln!(self.out, "\n[perf] current fps: {:.2}", stats.current_fps)
                .context("write fps line")?;
            wrote = true;
        }
        if wrote {
            self.out.flush().context("flush text output")?;
        }
        Ok(RenderOutcome::Continue)
    }

    fn cleanup(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if self.initialized {
            if let Err(err) = self.out.flush() {
                log::debug!("text backend flush on cleanup failed: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, DetectionResult};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn stats(frame_count: u64) -> LoopStats {
        LoopStats {
            frame_count,
            ..LoopStats::default()
        }
    }

    fn backend(buf: &SharedBuf) -> TextBackend {
        let mut backend = TextBackend::new(Box::new(buf.clone())).with_fps_every(0);
        backend.initialize(&BackendConfig::default()).unwrap();
        backend
    }

    #[test]
    fn reports_only_new_cycles() -> Result<()> {
        let buf = SharedBuf::default();
        let mut backend = backend(&buf);
        let set = DetectionSet::new(
            5,
            vec![DetectionResult::new(
                "person",
                0.875,
                BoundingBox::from_corners(10, 20, 110, 220),
            )],
        );

        backend.render(&DetectionSet::initial(), &stats(1))?;
        assert!(buf.text().is_empty());

        backend.render(&set, &stats(5))?;
        backend.render(&set, &stats(6))?;
        let out = buf.text();
        assert_eq!(out.matches("frame 5 - detected 1 object").count(), 1);
        assert!(out.contains("  name: person"));
        assert!(out.contains("  confidence: 87.50%"));
        assert!(out.contains("  position: (10, 20) -> (110, 220)"));
        Ok(())
    }

    #[test]
    fn empty_cycle_is_reported_explicitly() -> Result<()> {
        let buf = SharedBuf::default();
        let mut backend = backend(&buf);
        backend.render(&DetectionSet::new(10, Vec::new()), &stats(10))?;
        assert!(buf.text().contains("frame 10 - no objects detected"));
        Ok(())
    }

    #[test]
    fn fps_line_on_cadence() -> Result<()> {
        let buf = SharedBuf::default();
        let mut backend = TextBackend::new(Box::new(buf.clone())).with_fps_every(30);
        backend.initialize(&BackendConfig::default())?;
        let mut s = stats(29);
        backend.render(&DetectionSet::initial(), &s)?;
        assert!(buf.text().is_empty());
        s.frame_count = 30;
        s.current_fps = 12.5;
        backend.render(&DetectionSet::initial(), &s)?;
        assert!(buf.text().contains("[perf] current fps: 12.50"));
        Ok(())
    }

    #[test]
    fn cleanup_is_idempotent_and_final() {
        let buf = SharedBuf::default();
        let mut backend = backend(&buf);
        backend.cleanup();
        backend.cleanup();
        assert!(backend.render(&DetectionSet::initial(), &stats(1)).is_err());
        assert!(buf.text().is_empty());
    }
}
