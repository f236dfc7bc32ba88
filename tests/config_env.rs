use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use vehicle_watch::{CodecHint, VehicleConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "VEHICLE_CONFIG",
        "VEHICLE_API_ADDR",
        "VEHICLE_MODEL_BACKEND",
        "VEHICLE_MODEL_PATH",
        "VEHICLE_OUTPUT_DIR",
        "VEHICLE_OUTPUT_CODEC",
        "VEHICLE_FONT_PATH",
        "VEHICLE_CAMERA_DEVICE",
        "VEHICLE_CAMERA_FPS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(file: &mut NamedTempFile, body: &str) {
    std::io::Write::write_all(file, body.as_bytes()).expect("write config");
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    write_config(
        &mut file,
        r#"{
            "api": { "addr": "127.0.0.1:9100" },
            "model": { "backend": "Tract", "path": "models/yolov8s.onnx", "input_size": 320 },
            "output": { "dir": "/var/lib/vehicle/out", "codec": "xvid" },
            "camera": { "device": "/dev/video2", "target_fps": 15, "width": 1280, "height": 720 }
        }"#,
    );

    std::env::set_var("VEHICLE_CONFIG", file.path());
    std::env::set_var("VEHICLE_OUTPUT_CODEC", "mjpeg");
    std::env::set_var("VEHICLE_CAMERA_FPS", "5");

    let cfg = VehicleConfig::load().expect("load config");

    assert_eq!(cfg.api_addr, "127.0.0.1:9100");
    assert_eq!(cfg.model.backend, "tract");
    assert_eq!(cfg.model.path, PathBuf::from("models/yolov8s.onnx"));
    assert_eq!(cfg.model.input_size, 320);
    assert_eq!(cfg.output.dir, PathBuf::from("/var/lib/vehicle/out"));
    assert_eq!(cfg.output.codec, CodecHint::Mjpeg);
    assert_eq!(cfg.output.fallback_codec, CodecHint::Mjpeg);
    assert_eq!(cfg.camera.device, "/dev/video2");
    assert_eq!(cfg.camera.target_fps, 5);
    assert_eq!((cfg.camera.width, cfg.camera.height), (1280, 720));

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    write_config(
        &mut file,
        r#"
[model]
backend = "stub"
iou_threshold = 0.6

[output]
fallback_codec = "png"

[annotate]
font_path = "/usr/share/fonts/DejaVuSans.ttf"
"#,
    );
    std::env::set_var("VEHICLE_CONFIG", file.path());

    let cfg = VehicleConfig::load().expect("load config");

    assert_eq!(cfg.model.backend, "stub");
    assert!((cfg.model.iou_threshold - 0.6).abs() < f32::EPSILON);
    assert_eq!(cfg.output.codec, CodecHint::Mp4v);
    assert_eq!(cfg.output.fallback_codec, CodecHint::Png);
    assert_eq!(
        cfg.font_path,
        Some(PathBuf::from("/usr/share/fonts/DejaVuSans.ttf"))
    );

    clear_env();
}

#[test]
fn defaults_apply_without_a_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();
    std::env::set_var("VEHICLE_FONT_PATH", "/tmp/font.ttf");
    std::env::set_var("VEHICLE_CAMERA_DEVICE", "stub://cam");

    let cfg = VehicleConfig::load().expect("load config");

    assert_eq!(cfg.api_addr, "127.0.0.1:8808");
    assert_eq!(cfg.model.backend, "stub");
    assert_eq!(cfg.output.dir, PathBuf::from("outputs"));
    assert_eq!(cfg.font_path, Some(PathBuf::from("/tmp/font.ttf")));
    assert_eq!(cfg.camera.device, "stub://cam");

    clear_env();
}

#[test]
fn rejects_invalid_camera_fps() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VEHICLE_CAMERA_FPS", "fast");
    let err = VehicleConfig::load().unwrap_err();
    assert!(err.to_string().contains("VEHICLE_CAMERA_FPS"));

    std::env::set_var("VEHICLE_CAMERA_FPS", "0");
    let err = VehicleConfig::load().unwrap_err();
    assert!(err.to_string().contains("target_fps"));

    clear_env();
}

#[test]
fn rejects_unknown_backend_and_codec() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VEHICLE_MODEL_BACKEND", "opencv");
    let err = VehicleConfig::load().unwrap_err();
    assert!(err.to_string().contains("unknown model backend"));
    std::env::remove_var("VEHICLE_MODEL_BACKEND");

    std::env::set_var("VEHICLE_OUTPUT_CODEC", "h265");
    assert!(VehicleConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_malformed_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    write_config(&mut file, "{ not json");
    std::env::set_var("VEHICLE_CONFIG", file.path());

    let err = VehicleConfig::load().unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    clear_env();
}
