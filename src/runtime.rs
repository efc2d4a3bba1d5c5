//! The duty-cycled detection loop.
//!
//! One tick is: check cancellation, capture a frame, maybe run a detection
//! cycle, render the cached detections, pace to the tick budget. Inference
//! runs only every `detection_interval` frames; every other tick renders the
//! last published `DetectionSet` unchanged.
//!
//! Source, engine, backend and clock are injected, so the loop never touches
//! hardware or wall-clock time directly.

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::config::{BackendConfig, InferenceMode, LoopConfig};
use crate::detect::{DetectionResult, DetectionSet, InferenceEngine};
use crate::error::{describe, DetectError};
use crate::frame::{Frame, FrameSource};
use crate::output::{BackendSlot, OutputBackend, RenderOutcome};
use crate::schedule::{Clock, TickScheduler};
use crate::stats::{fps, LoopStats, RunSummary, StopReason};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl LoopState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Read-only handle on a loop's state, usable after `run` has consumed it.
#[derive(Clone, Debug)]
pub struct StateWatch {
    state: Arc<AtomicU8>,
}

impl StateWatch {
    pub fn get(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set(&self, state: LoopState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

pub struct DetectionLoop {
    config: LoopConfig,
    backend_config: BackendConfig,
    source: Box<dyn FrameSource>,
    engine: Box<dyn InferenceEngine>,
    slot: BackendSlot,
    clock: Arc<dyn Clock>,
    cancel: CancelToken,
    state: StateWatch,
}

impl DetectionLoop {
    pub fn new(
        config: LoopConfig,
        backend_config: BackendConfig,
        source: Box<dyn FrameSource>,
        engine: Box<dyn InferenceEngine>,
        backend: Box<dyn OutputBackend>,
        clock: Arc<dyn Clock>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            config,
            backend_config,
            source,
            engine,
            slot: BackendSlot::new(backend),
            clock,
            cancel,
            state: StateWatch {
                state: Arc::new(AtomicU8::new(LoopState::Starting as u8)),
            },
        }
    }

    pub fn state(&self) -> LoopState {
        self.state.get()
    }

    pub fn watch(&self) -> StateWatch {
        self.state.clone()
    }

    /// Run until a stop condition. Only a source that cannot be opened is an
    /// error; every later stop path returns a summary.
    pub fn run(self) -> Result<RunSummary, DetectError> {
        let DetectionLoop {
            config,
            backend_config,
            mut source,
            mut engine,
            mut slot,
            clock,
            cancel,
            state,
        } = self;

        if let Err(err) = source.open() {
            let err = DetectError::DeviceUnavailable {
                device: source.name().to_string(),
                reason: describe(&err),
            };
            report(&err);
            state.set(LoopState::Stopped);
            return Err(err);
        }

        slot.initialize(&backend_config);
        if let Err(err) = engine.warm_up() {
            log::warn!("{} warm-up failed: {:#}", engine.name(), err);
        }

        let interval = config.detection_interval.max(1);
        log::info!(
            "detection loop starting: source={}, engine={}, output={}, interval={}, mode={:?}",
            source.name(),
            engine.name(),
            slot.name(),
            interval,
            config.inference_mode
        );

        let mut dispatcher = match config.inference_mode {
            InferenceMode::Inline => Dispatcher::Inline(engine),
            InferenceMode::Pipelined => Dispatcher::Pipelined(Worker::spawn(engine)),
        };

        let started = clock.now();
        let mut stats = LoopStats::default();
        let mut current = Arc::new(DetectionSet::initial());
        let mut cycles = 0u64;
        let mut ticks = TickScheduler::new(config.tick_interval);
        state.set(LoopState::Running);

        let reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Interrupted;
            }
            if config.max_frames.is_some_and(|max| stats.frame_count >= max) {
                break StopReason::FrameLimit;
            }
            ticks.begin(clock.as_ref());

            if let Dispatcher::Pipelined(worker) = &dispatcher {
                if let Some(set) = worker.poll_latest() {
                    current = set;
                }
            }

            let frame = match source.read_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    let err = DetectError::Capture {
                        frame: stats.frame_count,
                        reason: describe(&err),
                    };
                    report(&err);
                    break StopReason::CaptureFailure;
                }
            };
            stats.record_frame(clock.now().saturating_sub(started));
            let frame_index = stats.frame_count;

            if frame_index % interval == 0 {
                match &mut dispatcher {
                    Dispatcher::Inline(engine) => {
                        cycles += 1;
                        if let Some(set) =
                            run_cycle(engine.as_mut(), &frame, frame_index, config.confidence_threshold)
                        {
                            current = Arc::new(set);
                        }
                    }
                    Dispatcher::Pipelined(worker) => {
                        if worker.submit(frame, frame_index, config.confidence_threshold) {
                            cycles += 1;
                        } else {
                            log::debug!("inference worker busy; skipping cycle at frame {}", frame_index);
                        }
                    }
                }
            }

            stats.refresh(clock.now().saturating_sub(started));
            if config.fps_log_every > 0 && frame_index % config.fps_log_every == 0 {
                log::debug!("[perf] fps: {:.2} over {} frames", stats.current_fps, frame_index);
            }

            if slot.render(&current, &stats) == RenderOutcome::Stop {
                break StopReason::UserQuit;
            }
            if config.max_frames.is_some_and(|max| frame_index >= max) {
                break StopReason::FrameLimit;
            }
            ticks.finish(clock.as_ref());
        };

        state.set(LoopState::Draining);
        log::info!("detection loop stopping: {}", reason);
        if let Dispatcher::Pipelined(worker) = dispatcher {
            worker.drain(config.drain_grace);
        }
        source.close();
        slot.cleanup();
        if let Some(err) = slot.degradation() {
            log::info!(
                "output {} ran as {} after: {}",
                slot.configured(),
                slot.name(),
                err
            );
        }

        let elapsed = clock.now().saturating_sub(started);
        let summary = RunSummary {
            frame_count: stats.frame_count,
            elapsed,
            average_fps: fps(stats.frame_count, elapsed),
            detection_cycles: cycles,
            reason,
            backend: slot.name(),
            degraded: slot.is_degraded(),
        };
        state.set(LoopState::Stopped);
        Ok(summary)
    }
}

enum Dispatcher {
    Inline(Box<dyn InferenceEngine>),
    Pipelined(Worker),
}

/// Run one detection cycle. `None` means the engine failed and the previous
/// set stays current.
fn run_cycle(
    engine: &mut dyn InferenceEngine,
    frame: &Frame,
    frame_index: u64,
    threshold: f32,
) -> Option<DetectionSet> {
    match engine.detect(frame, threshold) {
        Ok(detections) => {
            log_cycle(frame_index, &detections);
            Some(DetectionSet::new(frame_index, detections))
        }
        Err(err) => {
            report(&DetectError::Inference {
                frame: frame_index,
                reason: describe(&err),
            });
            None
        }
    }
}

/// Log a classified failure: fatal ones at error, the rest at warn.
fn report(err: &DetectError) {
    if err.is_fatal() {
        log::error!("{}", err);
    } else {
        log::warn!("{}", err);
    }
}

fn log_cycle(frame_index: u64, detections: &[DetectionResult]) {
    if detections.is_empty() {
        log::info!("frame {}: no objects", frame_index);
        return;
    }
    let entries: Vec<String> = detections
        .iter()
        .map(|d| format!("{} ({:.0}%)", d.label(), d.confidence() * 100.0))
        .collect();
    log::info!(
        "frame {}: {} object(s): {}",
        frame_index,
        detections.len(),
        entries.join(", ")
    );
}

struct Job {
    frame: Frame,
    frame_index: u64,
    threshold: f32,
}

/// Single inference thread that owns the engine.
///
/// `busy` is raised when a job is accepted and cleared once its result is
/// published, so the worker holds at most one frame and a frame arriving
/// while it is busy is skipped rather than queued.
struct Worker {
    jobs: Sender<Job>,
    results: Receiver<DetectionSet>,
    busy: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Worker {
    fn spawn(mut engine: Box<dyn InferenceEngine>) -> Self {
        let (jobs, job_rx) = bounded::<Job>(1);
        let (result_tx, results) = unbounded();
        let busy = Arc::new(AtomicBool::new(false));
        let worker_busy = busy.clone();
        let handle = std::thread::spawn(move || {
            for job in job_rx.iter() {
                let set = run_cycle(engine.as_mut(), &job.frame, job.frame_index, job.threshold);
                let published = match set {
                    Some(set) => result_tx.send(set).is_ok(),
                    None => true,
                };
                worker_busy.store(false, Ordering::SeqCst);
                if !published {
                    break;
                }
            }
        });
        Self {
            jobs,
            results,
            busy,
            handle,
        }
    }

    /// Hand a frame to the worker. False when it is still busy.
    fn submit(&self, frame: Frame, frame_index: u64, threshold: f32) -> bool {
        if self.busy.swap(true, Ordering::SeqCst) {
            return false;
        }
        match self.jobs.try_send(Job {
            frame,
            frame_index,
            threshold,
        }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.busy.store(false, Ordering::SeqCst);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("inference worker exited; skipping cycle at frame {}", frame_index);
                false
            }
        }
    }

    /// Newest finished result, if any. Older pending results are dropped.
    fn poll_latest(&self) -> Option<Arc<DetectionSet>> {
        self.results.try_iter().last().map(Arc::new)
    }

    /// Stop accepting work and give the in-flight cycle `grace` to finish.
    fn drain(self, grace: Duration) {
        let Worker {
            jobs,
            results,
            handle,
            ..
        } = self;
        drop(jobs);

        let deadline = std::time::Instant::now() + grace;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match results.recv_timeout(remaining) {
                Ok(set) => {
                    log::debug!(
                        "discarding result for frame {} finished during drain",
                        set.frame_index()
                    );
                }
                Err(RecvTimeoutError::Disconnected) => {
                    if handle.join().is_err() {
                        log::warn!("inference worker panicked");
                    }
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "inference worker still busy after {:?}; abandoning it",
                        grace
                    );
                    return;
                }
            }
        }
    }
}
