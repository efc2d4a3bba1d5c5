//! detectd - duty-cycled camera object detection
//!
//! A single loop captures frames from a camera, runs an object detector on a
//! subset of them, and renders the most recent detections to one of several
//! interchangeable outputs.
//!
//! # Architecture
//!
//! The loop holds three invariants:
//!
//! 1. **Duty cycle**: inference runs exactly when `frame_count % interval == 0`.
//! 2. **Cached detections**: between cycles the last published `DetectionSet`
//!    is rendered unchanged; a new set replaces it wholesale.
//! 3. **Guaranteed output**: a backend that fails to initialize or render is
//!    replaced by the `none` backend and the run continues.
//!
//! # Module Structure
//!
//! - `frame`: `Frame` and the `FrameSource` capture boundary
//! - `ingest`: synthetic and V4L2 frame sources
//! - `detect`: detection records and `InferenceEngine` implementations
//! - `output`: output backends, surfaces and the degrading `BackendSlot`
//! - `runtime`: the `DetectionLoop` state machine
//! - `schedule`, `cancel`, `stats`: clock and pacing, Ctrl-C, throughput
//! - `config`, `error`, `ui`: configuration, failure taxonomy, startup stages

pub mod cancel;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod output;
pub mod runtime;
pub mod schedule;
pub mod stats;
pub mod ui;

pub use cancel::CancelToken;
pub use config::{
    BackendConfig, BackendMode, CaptureConfig, DetectdConfig, EngineKind, InferenceMode,
    LoopConfig, ModelConfig,
};
pub use detect::{open_engine, BoundingBox, DetectionResult, DetectionSet, InferenceEngine};
pub use error::DetectError;
pub use frame::{Frame, FrameSource};
pub use ingest::open_source;
pub use output::{build_backend, BackendSlot, OutputBackend, RenderOutcome};
pub use runtime::{DetectionLoop, LoopState, StateWatch};
pub use schedule::{Clock, ManualClock, SystemClock, TickScheduler};
pub use stats::{LoopStats, RunSummary, StopReason};
