use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DEVICE: &str = "stub://camera0";
const DEFAULT_CAPTURE_WIDTH: u32 = 640;
const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
const DEFAULT_TARGET_FPS: u32 = 30;
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_DETECTION_INTERVAL: u64 = 5;
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_MAX_DETECTIONS: usize = 5;
const DEFAULT_FPS_LOG_EVERY: u64 = 30;
const DEFAULT_DRAIN_GRACE_MS: u64 = 2_000;

// ----------------------------------------------------------------------------
// File layout (all fields optional)
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectdConfigFile {
    capture: Option<CaptureConfigFile>,
    model: Option<ModelConfigFile>,
    detection: Option<DetectionConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    backend: Option<String>,
    path: Option<PathBuf>,
    labels: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectionConfigFile {
    interval: Option<i64>,
    confidence: Option<f32>,
    tick_interval_secs: Option<f64>,
    mode: Option<String>,
    max_frames: Option<u64>,
    fps_log_every: Option<u64>,
    drain_grace_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OutputConfigFile {
    mode: Option<String>,
    resolution: Option<(u32, u32)>,
    max_detections: Option<usize>,
    surface: Option<String>,
}

// ----------------------------------------------------------------------------
// Resolved configuration
// ----------------------------------------------------------------------------

/// Process configuration. Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct DetectdConfig {
    pub capture: CaptureConfig,
    pub model: ModelConfig,
    pub detection: LoopConfig,
    pub output: BackendConfig,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Device path (e.g. "/dev/video0") or `stub://<name>` for synthetic frames.
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Natural frame rate of the device; bounds the default tick interval.
    pub target_fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_string(),
            width: DEFAULT_CAPTURE_WIDTH,
            height: DEFAULT_CAPTURE_HEIGHT,
            target_fps: DEFAULT_TARGET_FPS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineKind {
    Stub,
    Tract,
}

impl FromStr for EngineKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stub" => Ok(Self::Stub),
            "tract" | "onnx" => Ok(Self::Tract),
            other => Err(anyhow!("unknown model backend '{}' (expected stub|tract)", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub engine: EngineKind,
    /// Model artifact location. Required by the tract engine.
    pub path: Option<PathBuf>,
    /// Optional class labels, one per line.
    pub labels: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::Stub,
            path: None,
            labels: None,
            input_width: DEFAULT_MODEL_INPUT,
            input_height: DEFAULT_MODEL_INPUT,
        }
    }
}

/// Where inference runs relative to capture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InferenceMode {
    /// Capture, detect and render strictly in sequence within one tick.
    #[default]
    Inline,
    /// Inference runs on a worker thread; capture never waits for it.
    Pipelined,
}

impl FromStr for InferenceMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(Self::Inline),
            "pipelined" | "pipeline" => Ok(Self::Pipelined),
            other => Err(anyhow!(
                "unknown detection mode '{}' (expected inline|pipelined)",
                other
            )),
        }
    }
}

/// Scheduling policy for the detection loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Run inference when `frame_count % detection_interval == 0`. Always >= 1.
    pub detection_interval: u64,
    pub confidence_threshold: f32,
    /// Nominal tick length; the loop sleeps away whatever the tick did not use.
    pub tick_interval: Duration,
    pub inference_mode: InferenceMode,
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
    /// Log throughput every N frames; 0 disables.
    pub fps_log_every: u64,
    /// How long teardown waits for an in-flight pipelined inference.
    pub drain_grace: Duration,
}

impl LoopConfig {
    /// Map a configured interval onto the cadence actually used: values <= 0
    /// mean "detect every frame".
    pub fn normalize_interval(raw: i64) -> u64 {
        if raw <= 0 {
            1
        } else {
            raw as u64
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            detection_interval: DEFAULT_DETECTION_INTERVAL,
            confidence_threshold: DEFAULT_CONFIDENCE,
            tick_interval: default_tick(DEFAULT_TARGET_FPS),
            inference_mode: InferenceMode::Inline,
            max_frames: None,
            fps_log_every: DEFAULT_FPS_LOG_EVERY,
            drain_grace: Duration::from_millis(DEFAULT_DRAIN_GRACE_MS),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BackendMode {
    None,
    #[default]
    Text,
    RasterSmall,
    RasterOled,
}

impl BackendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Text => "text",
            Self::RasterSmall => "raster-small",
            Self::RasterOled => "raster-oled",
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "text" | "console" => Ok(Self::Text),
            "raster-small" | "tft" => Ok(Self::RasterSmall),
            "raster-oled" | "oled" => Ok(Self::RasterOled),
            other => Err(anyhow!(
                "unknown backend mode '{}' (expected none|text|raster-small|raster-oled)",
                other
            )),
        }
    }
}

/// Output backend selection and its sub-configuration.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub mode: BackendMode,
    /// Surface size for raster modes; each raster profile has its own default.
    pub resolution: Option<(u32, u32)>,
    pub max_displayed_detections: usize,
    /// Surface address for raster modes (e.g. "i2c:1:0x3c", "stub://oled").
    pub surface: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::Text,
            resolution: None,
            max_displayed_detections: DEFAULT_MAX_DETECTIONS,
            surface: None,
        }
    }
}

impl DetectdConfig {
    /// Load from `$DETECTD_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DETECTD_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (if any), then apply environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => DetectdConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DetectdConfigFile) -> Result<Self> {
        let capture_file = file.capture.unwrap_or_default();
        let capture = CaptureConfig {
            device: capture_file
                .device
                .unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            width: capture_file.width.unwrap_or(DEFAULT_CAPTURE_WIDTH),
            height: capture_file.height.unwrap_or(DEFAULT_CAPTURE_HEIGHT),
            target_fps: capture_file.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
        };

        let model_file = file.model.unwrap_or_default();
        let model = ModelConfig {
            engine: match model_file.backend.as_deref() {
                Some(raw) => raw.parse()?,
                None => EngineKind::Stub,
            },
            path: model_file.path,
            labels: model_file.labels,
            input_width: model_file.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
            input_height: model_file.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
        };

        let detection_file = file.detection.unwrap_or_default();
        let detection = LoopConfig {
            detection_interval: detection_file
                .interval
                .map(normalize_interval_logged)
                .unwrap_or(DEFAULT_DETECTION_INTERVAL),
            confidence_threshold: detection_file.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            tick_interval: match detection_file.tick_interval_secs {
                Some(secs) => tick_from_secs(secs)?,
                None => default_tick(capture.target_fps),
            },
            inference_mode: match detection_file.mode.as_deref() {
                Some(raw) => raw.parse()?,
                None => InferenceMode::Inline,
            },
            max_frames: detection_file.max_frames,
            fps_log_every: detection_file.fps_log_every.unwrap_or(DEFAULT_FPS_LOG_EVERY),
            drain_grace: Duration::from_millis(
                detection_file.drain_grace_ms.unwrap_or(DEFAULT_DRAIN_GRACE_MS),
            ),
        };

        let output_file = file.output.unwrap_or_default();
        let output = BackendConfig {
            mode: match output_file.mode.as_deref() {
                Some(raw) => raw.parse()?,
                None => BackendMode::Text,
            },
            resolution: output_file.resolution,
            max_displayed_detections: output_file
                .max_detections
                .unwrap_or(DEFAULT_MAX_DETECTIONS),
            surface: output_file.surface,
        };

        Ok(Self {
            capture,
            model,
            detection,
            output,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(mode) = std::env::var("DETECTD_BACKEND") {
            if !mode.trim().is_empty() {
                self.output.mode = mode.parse()?;
            }
        }
        if let Ok(device) = std::env::var("DETECTD_CAMERA") {
            if !device.trim().is_empty() {
                self.capture.device = device;
            }
        }
        if let Ok(interval) = std::env::var("DETECTD_DETECTION_INTERVAL") {
            let raw: i64 = interval
                .trim()
                .parse()
                .map_err(|_| anyhow!("DETECTD_DETECTION_INTERVAL must be an integer"))?;
            self.detection.detection_interval = normalize_interval_logged(raw);
        }
        if let Ok(confidence) = std::env::var("DETECTD_CONFIDENCE") {
            self.detection.confidence_threshold = confidence
                .trim()
                .parse()
                .map_err(|_| anyhow!("DETECTD_CONFIDENCE must be a number in [0, 1]"))?;
        }
        if let Ok(tick) = std::env::var("DETECTD_TICK_INTERVAL_SECS") {
            let secs: f64 = tick
                .trim()
                .parse()
                .map_err(|_| anyhow!("DETECTD_TICK_INTERVAL_SECS must be a number of seconds"))?;
            self.detection.tick_interval = tick_from_secs(secs)?;
        }
        if let Ok(max) = std::env::var("DETECTD_MAX_DETECTIONS") {
            self.output.max_displayed_detections = max
                .trim()
                .parse()
                .map_err(|_| anyhow!("DETECTD_MAX_DETECTIONS must be a non-negative integer"))?;
        }
        Ok(())
    }

    /// Check cross-field constraints. Call again after applying CLI overrides.
    pub fn validate(&mut self) -> Result<()> {
        let confidence = self.detection.confidence_threshold;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1], got {}",
                confidence
            ));
        }
        if self.detection.detection_interval == 0 {
            self.detection.detection_interval = 1;
        }
        if self.capture.device.trim().is_empty() {
            return Err(anyhow!("capture device must not be empty"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!(
                "capture resolution must be non-zero, got {}x{}",
                self.capture.width,
                self.capture.height
            ));
        }
        if let Some((w, h)) = self.output.resolution {
            if w == 0 || h == 0 {
                return Err(anyhow!("output resolution must be non-zero, got {}x{}", w, h));
            }
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(anyhow!("model input size must be non-zero"));
        }
        if self.model.engine == EngineKind::Tract && self.model.path.is_none() {
            return Err(anyhow!("model.path is required for the tract backend"));
        }
        Ok(())
    }
}

/// Parse a tick length in seconds. Negative or non-finite values are rejected.
pub fn tick_from_secs(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return Err(anyhow!(
            "tick interval must be a non-negative number of seconds, got {}",
            secs
        ));
    }
    Ok(Duration::from_secs_f64(secs))
}

fn default_tick(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(1.0 / target_fps as f64)
    }
}

fn normalize_interval_logged(raw: i64) -> u64 {
    let interval = LoopConfig::normalize_interval(raw);
    if raw <= 0 {
        log::warn!(
            "detection interval {} is not positive; detecting on every frame",
            raw
        );
    }
    interval
}

fn read_config_file(path: &Path) -> Result<DetectdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
