use super::backend::{OutputBackend, RenderOutcome};
use super::none::NoneBackend;
use crate::config::BackendConfig;
use crate::detect::DetectionSet;
use crate::error::{describe, DetectError};
use crate::stats::LoopStats;

/// Holder for the active output backend.
///
/// Guarantees the loop always has a working backend: any initialization or
/// render failure swaps the configured backend for `NoneBackend` for the rest
/// of the run, logging the degradation once.
pub struct BackendSlot {
    active: Box<dyn OutputBackend>,
    configured: &'static str,
    degradation: Option<DetectError>,
    cleaned_up: bool,
}

impl BackendSlot {
    pub fn new(backend: Box<dyn OutputBackend>) -> Self {
        Self {
            configured: backend.name(),
            active: backend,
            degradation: None,
            cleaned_up: false,
        }
    }

    /// Name of the backend currently receiving frames.
    pub fn name(&self) -> &'static str {
        self.active.name()
    }

    /// Name of the backend that was configured.
    pub fn configured(&self) -> &'static str {
        self.configured
    }

    pub fn is_degraded(&self) -> bool {
        self.degradation.is_some()
    }

    /// The failure that caused degradation, if any.
    pub fn degradation(&self) -> Option<&DetectError> {
        self.degradation.as_ref()
    }

    /// Initialize the backend; on failure fall back to `none`.
    pub fn initialize(&mut self, config: &BackendConfig) {
        if let Err(err) = self.active.initialize(config) {
            let backend = self.active.name();
            self.degrade(DetectError::BackendInit {
                backend,
                reason: describe(&err),
            });
        }
    }

    /// Render one tick. A failed render counts as `Continue`.
    pub fn render(&mut self, detections: &DetectionSet, stats: &LoopStats) -> RenderOutcome {
        match self.active.render(detections, stats) {
            Ok(outcome) => outcome,
            Err(err) => {
                let backend = self.active.name();
                self.degrade(DetectError::BackendRender {
                    backend,
                    frame: stats.frame_count,
                    reason: describe(&err),
                });
                RenderOutcome::Continue
            }
        }
    }

    /// Release the active backend. Repeated calls are no-ops.
    pub fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        self.active.cleanup();
    }

    fn degrade(&mut self, err: DetectError) {
        log::warn!("{}; continuing with the none backend", err);
        let mut failed = std::mem::replace(&mut self.active, Box::new(NoneBackend::new()));
        failed.cleanup();
        self.degradation = Some(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counters {
        renders: AtomicUsize,
        cleanups: AtomicUsize,
    }

    struct Flaky {
        fail_init: bool,
        fail_render_at: Option<usize>,
        counters: Arc<Counters>,
    }

    impl OutputBackend for Flaky {
        fn name(&self) -> &'static str {
            "flaky"
        }

        fn initialize(&mut self, _config: &BackendConfig) -> Result<()> {
            if self.fail_init {
                bail!("no display attached");
            }
            Ok(())
        }

        fn render(&mut self, _d: &DetectionSet, _s: &LoopStats) -> Result<RenderOutcome> {
            let n = self.counters.renders.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(n) == self.fail_render_at {
                bail!("bus error");
            }
            Ok(RenderOutcome::Continue)
        }

        fn cleanup(&mut self) {
            self.counters.cleanups.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn stats() -> LoopStats {
        LoopStats::default()
    }

    #[test]
    fn init_failure_degrades_to_none() {
        let counters = Arc::new(Counters::default());
        let mut slot = BackendSlot::new(Box::new(Flaky {
            fail_init: true,
            fail_render_at: None,
            counters: counters.clone(),
        }));
        slot.initialize(&BackendConfig::default());
        assert_eq!(slot.name(), "none");
        assert_eq!(slot.configured(), "flaky");
        assert!(matches!(slot.degradation(), Some(DetectError::BackendInit { .. })));
        assert_eq!(counters.cleanups.load(Ordering::SeqCst), 1);

        assert_eq!(slot.render(&DetectionSet::initial(), &stats()), RenderOutcome::Continue);
        assert_eq!(counters.renders.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn render_failure_degrades_once() {
        let counters = Arc::new(Counters::default());
        let mut slot = BackendSlot::new(Box::new(Flaky {
            fail_init: false,
            fail_render_at: Some(2),
            counters: counters.clone(),
        }));
        slot.initialize(&BackendConfig::default());
        for _ in 0..5 {
            assert_eq!(slot.render(&DetectionSet::initial(), &stats()), RenderOutcome::Continue);
        }
        assert!(matches!(slot.degradation(), Some(DetectError::BackendRender { .. })));
        assert_eq!(counters.renders.load(Ordering::SeqCst), 2);

        slot.cleanup();
        slot.cleanup();
        assert_eq!(counters.cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn healthy_backend_is_cleaned_once() {
        let counters = Arc::new(Counters::default());
        let mut slot = BackendSlot::new(Box::new(Flaky {
            fail_init: false,
            fail_render_at: None,
            counters: counters.clone(),
        }));
        slot.initialize(&BackendConfig::default());
        assert!(!slot.is_degraded());
        slot.cleanup();
        slot.cleanup();
        assert_eq!(counters.cleanups.load(Ordering::SeqCst), 1);
    }
}
