use anyhow::Result;

use crate::config::BackendConfig;
use crate::detect::DetectionSet;
use crate::stats::LoopStats;

/// What the loop should do after a render call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderOutcome {
    Continue,
    /// The user closed an interactive surface.
    Stop,
}

/// Rendering target for the latest detections.
///
/// Backends receive read-only views each tick and must not keep them past the
/// call. Errors from `initialize` or `render` are never fatal: the loop swaps
/// the failing backend for `NoneBackend` (see `BackendSlot`).
pub trait OutputBackend: Send {
    /// Backend identifier (matches the configured mode name).
    fn name(&self) -> &'static str;

    /// Acquire the output surface.
    fn initialize(&mut self, config: &BackendConfig) -> Result<()>;

    /// Draw the current detection set. The set may be stale; backends must
    /// never trigger inference themselves.
    fn render(&mut self, detections: &DetectionSet, stats: &LoopStats) -> Result<RenderOutcome>;

    /// Release the surface. Repeated calls are no-ops.
    fn cleanup(&mut self);
}
