//! detectd - camera object detection with small-screen output
//!
//! This daemon:
//! 1. Captures frames from a camera (V4L2 device or `stub://` synthetic source)
//! 2. Runs the detector on every Nth frame and caches the result
//! 3. Renders the cached detections to the console, a small raster panel, or nothing
//! 4. Prints a run summary on exit (Ctrl-C, window close, capture failure, frame limit)

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use detectd::config::{tick_from_secs, DetectdConfig, LoopConfig};
use detectd::ui::{Ui, UiMode};
use detectd::{
    build_backend, open_engine, open_source, BackendMode, CancelToken, DetectionLoop, SystemClock,
};

const EXIT_CAPTURE_FAILURE: u8 = 1;
const EXIT_STARTUP: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about = "Duty-cycled camera object detection")]
struct Args {
    /// Path to a TOML config file.
    #[arg(long, env = "DETECTD_CONFIG")]
    config: Option<PathBuf>,
    /// Output backend (none|text|raster-small|raster-oled).
    #[arg(long, value_name = "MODE")]
    backend: Option<String>,
    /// Camera device (e.g. /dev/video0, stub://camera0).
    #[arg(long)]
    camera: Option<String>,
    /// Capture width in pixels.
    #[arg(long)]
    width: Option<u32>,
    /// Capture height in pixels.
    #[arg(long)]
    height: Option<u32>,
    /// Run inference every N frames; values <= 0 mean every frame.
    #[arg(long, allow_negative_numbers = true)]
    detection_interval: Option<i64>,
    /// Minimum detection confidence in [0, 1].
    #[arg(long)]
    confidence: Option<f32>,
    /// Tick length in seconds.
    #[arg(long)]
    tick_interval_secs: Option<f64>,
    /// Maximum detections drawn by raster backends.
    #[arg(long)]
    max_detections: Option<usize>,
    /// Surface address for raster backends (e.g. i2c:1:0x3c, stub://panel).
    #[arg(long)]
    surface: Option<String>,
    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
    /// Inference mode (inline|pipelined).
    #[arg(long, value_name = "MODE")]
    mode: Option<String>,
    /// Also print the run summary as one line of JSON.
    #[arg(long)]
    summary_json: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

impl Args {
    fn apply(&self, cfg: &mut DetectdConfig) -> Result<()> {
        if let Some(mode) = &self.backend {
            cfg.output.mode = mode.parse()?;
        }
        if let Some(camera) = &self.camera {
            cfg.capture.device = camera.clone();
        }
        if let Some(width) = self.width {
            cfg.capture.width = width;
        }
        if let Some(height) = self.height {
            cfg.capture.height = height;
        }
        if let Some(interval) = self.detection_interval {
            cfg.detection.detection_interval = LoopConfig::normalize_interval(interval);
        }
        if let Some(confidence) = self.confidence {
            cfg.detection.confidence_threshold = confidence;
        }
        if let Some(secs) = self.tick_interval_secs {
            cfg.detection.tick_interval = tick_from_secs(secs)?;
        }
        if let Some(max) = self.max_detections {
            cfg.output.max_displayed_detections = max;
        }
        if let Some(surface) = &self.surface {
            cfg.output.surface = Some(surface.clone());
        }
        if let Some(max) = self.max_frames {
            cfg.detection.max_frames = Some(max);
        }
        if let Some(mode) = &self.mode {
            cfg.detection.inference_mode = mode.parse()?;
        }
        Ok(())
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(err) => {
            log::error!("{:#}", err);
            ExitCode::from(EXIT_STARTUP)
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let ui_mode: UiMode = args.ui.parse()?;
    let config = {
        let mut cfg = DetectdConfig::load_from(args.config.as_deref())?;
        args.apply(&mut cfg)?;
        cfg.validate()?;
        cfg
    };
    let ui = Ui::for_terminal(ui_mode, config.output.mode == BackendMode::Text);

    // Installed before the slow stages; an interrupt while the model loads
    // stops the loop at its first tick.
    let cancel = CancelToken::new();
    cancel.install_ctrlc()?;

    let source = {
        let _stage = ui.stage("Prepare camera");
        open_source(&config.capture)?
    };
    let engine = {
        let _stage = ui.stage("Load detection model");
        open_engine(&config.model)?
    };
    let backend = {
        let _stage = ui.stage("Prepare output");
        build_backend(&config.output)
    };

    log::info!(
        "detectd {} on {} ({}x{}), output {}",
        env!("CARGO_PKG_VERSION"),
        config.capture.device,
        config.capture.width,
        config.capture.height,
        config.output.mode
    );

    let detection_loop = DetectionLoop::new(
        config.detection.clone(),
        config.output.clone(),
        source,
        engine,
        backend,
        Arc::new(SystemClock::new()),
        cancel,
    );
    let summary = match detection_loop.run() {
        Ok(summary) => summary,
        // Already logged by the loop.
        Err(_) => return Ok(ExitCode::from(EXIT_STARTUP)),
    };

    println!("\n{}", summary);
    if args.summary_json {
        println!("{}", serde_json::to_string(&summary)?);
    }

    if summary.reason.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_CAPTURE_FAILURE))
    }
}
