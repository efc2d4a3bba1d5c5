use anyhow::Result;

use super::backend::{OutputBackend, RenderOutcome};
use crate::config::BackendConfig;
use crate::detect::DetectionSet;
use crate::stats::LoopStats;

/// No-op backend. The universal fallback; it cannot fail.
#[derive(Debug, Default)]
pub struct NoneBackend;

impl NoneBackend {
    pub fn new() -> Self {
        Self
    }
}

impl OutputBackend for NoneBackend {
    fn name(&self) -> &'static str {
        "none"
    }

    fn initialize(&mut self, _config: &BackendConfig) -> Result<()> {
        Ok(())
    }

    fn render(&mut self, _detections: &DetectionSet, _stats: &LoopStats) -> Result<RenderOutcome> {
        Ok(RenderOutcome::Continue)
    }

    fn cleanup(&mut self) {}
}
