//! Detection model boundary.
//!
//! - `DetectionResult` / `DetectionSet`: normalized detection records.
//! - `InferenceEngine`: the opaque frame -> detections function.
//! - Engines: `StubEngine` (deterministic, always available) and
//!   `TractEngine` (ONNX, feature `backend-tract`).

mod engine;
mod engines;
mod result;

use anyhow::Result;

use crate::config::{EngineKind, ModelConfig};

pub use engine::InferenceEngine;
pub use engines::StubEngine;
#[cfg(feature = "backend-tract")]
pub use engines::TractEngine;
pub use result::{BoundingBox, DetectionResult, DetectionSet};

/// Build the engine selected by configuration.
pub fn open_engine(config: &ModelConfig) -> Result<Box<dyn InferenceEngine>> {
    match config.engine {
        EngineKind::Stub => Ok(Box::new(StubEngine::new())),
        EngineKind::Tract => open_tract(config),
    }
}

#[cfg(feature = "backend-tract")]
fn open_tract(config: &ModelConfig) -> Result<Box<dyn InferenceEngine>> {
    let path = config
        .path
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("model.path is required for the tract engine"))?;
    let mut engine = TractEngine::new(path, config.input_width, config.input_height)?;
    if let Some(labels) = &config.labels {
        engine = engine.with_labels_file(labels)?;
    }
    Ok(Box::new(engine))
}

#[cfg(not(feature = "backend-tract"))]
fn open_tract(_config: &ModelConfig) -> Result<Box<dyn InferenceEngine>> {
    anyhow::bail!("the tract engine requires the backend-tract feature")
}
