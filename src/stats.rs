//! Throughput bookkeeping and the end-of-run report.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Running counters, recomputed every tick.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LoopStats {
    pub frame_count: u64,
    pub elapsed: Duration,
    pub current_fps: f64,
}

impl LoopStats {
    /// Record one more captured frame at `elapsed` since start.
    pub fn record_frame(&mut self, elapsed: Duration) {
        self.frame_count += 1;
        self.refresh(elapsed);
    }

    /// Recompute FPS without counting a frame.
    pub fn refresh(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
        self.current_fps = fps(self.frame_count, elapsed);
    }
}

/// Frames per second; 0 when no time has elapsed.
pub fn fps(frames: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        frames as f64 / secs
    } else {
        0.0
    }
}

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// External interrupt (Ctrl-C) observed at the top of a tick.
    Interrupted,
    /// The camera stopped producing frames.
    CaptureFailure,
    /// An interactive backend reported a close request.
    UserQuit,
    /// The configured frame limit was reached.
    FrameLimit,
}

impl StopReason {
    /// True when the process should exit with status 0.
    pub fn is_clean(&self) -> bool {
        !matches!(self, Self::CaptureFailure)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Interrupted => "interrupted",
            Self::CaptureFailure => "capture failure",
            Self::UserQuit => "user quit",
            Self::FrameLimit => "frame limit",
        };
        f.write_str(label)
    }
}

/// Final report emitted on every stop path.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub frame_count: u64,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs_f64")]
    pub elapsed: Duration,
    pub average_fps: f64,
    pub detection_cycles: u64,
    pub reason: StopReason,
    /// Backend that was active when the run ended.
    pub backend: &'static str,
    /// True if the configured backend degraded to `none` at some point.
    pub degraded: bool,
}

fn as_secs_f64<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run summary:")?;
        writeln!(f, "  total frames: {}", self.frame_count)?;
        writeln!(f, "  total time: {:.2}s", self.elapsed.as_secs_f64())?;
        writeln!(f, "  average fps: {:.2}", self.average_fps)?;
        writeln!(f, "  detection cycles: {}", self.detection_cycles)?;
        writeln!(f, "  stop reason: {}", self.reason)?;
        if self.degraded {
            write!(f, "  output: {} (degraded)", self.backend)
        } else {
            write!(f, "  output: {}", self.backend)
        }
    }
}
