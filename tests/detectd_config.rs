use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use detectd::config::{BackendMode, DetectdConfig, EngineKind, InferenceMode};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "DETECTD_CONFIG",
        "DETECTD_BACKEND",
        "DETECTD_CAMERA",
        "DETECTD_DETECTION_INTERVAL",
        "DETECTD_CONFIDENCE",
        "DETECTD_TICK_INTERVAL_SECS",
        "DETECTD_MAX_DETECTIONS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, contents.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"
        [capture]
        device = "/dev/video2"
        width = 1280
        height = 720
        target_fps = 15

        [model]
        backend = "stub"

        [detection]
        interval = 10
        confidence = 0.4
        tick_interval_secs = 0.05
        mode = "pipelined"
        max_frames = 300
        drain_grace_ms = 500

        [output]
        mode = "raster-oled"
        max_detections = 2
        surface = "stub://panel"
        "#,
    );

    std::env::set_var("DETECTD_CONFIG", file.path());
    std::env::set_var("DETECTD_DETECTION_INTERVAL", "3");
    std::env::set_var("DETECTD_CONFIDENCE", "0.75");

    let cfg = DetectdConfig::load().expect("load config");

    assert_eq!(cfg.capture.device, "/dev/video2");
    assert_eq!(cfg.capture.width, 1280);
    assert_eq!(cfg.capture.height, 720);
    assert_eq!(cfg.capture.target_fps, 15);
    assert_eq!(cfg.model.engine, EngineKind::Stub);
    assert_eq!(cfg.detection.detection_interval, 3);
    assert_eq!(cfg.detection.confidence_threshold, 0.75);
    assert_eq!(cfg.detection.tick_interval, Duration::from_millis(50));
    assert_eq!(cfg.detection.inference_mode, InferenceMode::Pipelined);
    assert_eq!(cfg.detection.max_frames, Some(300));
    assert_eq!(cfg.detection.drain_grace, Duration::from_millis(500));
    assert_eq!(cfg.output.mode, BackendMode::RasterOled);
    assert_eq!(cfg.output.max_displayed_detections, 2);
    assert_eq!(cfg.output.surface.as_deref(), Some("stub://panel"));

    clear_env();
}

#[test]
fn defaults_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = DetectdConfig::load().expect("load defaults");
    assert_eq!(cfg.capture.device, "stub://camera0");
    assert_eq!((cfg.capture.width, cfg.capture.height), (640, 480));
    assert_eq!(cfg.detection.detection_interval, 5);
    assert_eq!(cfg.detection.confidence_threshold, 0.5);
    assert_eq!(cfg.detection.inference_mode, InferenceMode::Inline);
    assert_eq!(cfg.detection.max_frames, None);
    assert_eq!(cfg.output.mode, BackendMode::Text);
    assert_eq!(cfg.output.max_displayed_detections, 5);
}

#[test]
fn env_backend_and_camera_override_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config("[output]\nmode = \"text\"\n");
    std::env::set_var("DETECTD_BACKEND", "none");
    std::env::set_var("DETECTD_CAMERA", "stub://bench");
    std::env::set_var("DETECTD_TICK_INTERVAL_SECS", "0");
    std::env::set_var("DETECTD_MAX_DETECTIONS", "1");

    let cfg = DetectdConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.output.mode, BackendMode::None);
    assert_eq!(cfg.capture.device, "stub://bench");
    assert_eq!(cfg.detection.tick_interval, Duration::ZERO);
    assert_eq!(cfg.output.max_displayed_detections, 1);

    clear_env();
}

#[test]
fn non_positive_interval_is_every_frame() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DETECTD_DETECTION_INTERVAL", "-3");
    let cfg = DetectdConfig::load().expect("load config");
    assert_eq!(cfg.detection.detection_interval, 1);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DETECTD_CONFIDENCE", "1.5");
    assert!(DetectdConfig::load().is_err());
    clear_env();

    std::env::set_var("DETECTD_BACKEND", "hologram");
    assert!(DetectdConfig::load().is_err());
    clear_env();

    let unknown_key = write_config("[output]\ncolour = \"green\"\n");
    assert!(DetectdConfig::load_from(Some(unknown_key.path())).is_err());

    let zero_size = write_config("[capture]\nwidth = 0\n");
    assert!(DetectdConfig::load_from(Some(zero_size.path())).is_err());

    let bad_tick = write_config("[detection]\ntick_interval_secs = -1.0\n");
    assert!(DetectdConfig::load_from(Some(bad_tick.path())).is_err());

    clear_env();
}
