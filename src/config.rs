use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::sink::CodecHint;

const DEFAULT_API_ADDR: &str = "127.0.0.1:8808";
const DEFAULT_MODEL_BACKEND: &str = "stub";
const DEFAULT_MODEL_PATH: &str = "yolov8n.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_OUTPUT_DIR: &str = "outputs";
const DEFAULT_OUTPUT_CODEC: CodecHint = CodecHint::Mp4v;
const DEFAULT_FALLBACK_CODEC: CodecHint = CodecHint::Mjpeg;
const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;

const KNOWN_BACKENDS: &[&str] = &["stub", "tract"];

#[derive(Debug, Deserialize, Default)]
struct VehicleConfigFile {
    api: Option<ApiConfigFile>,
    model: Option<ModelConfigFile>,
    output: Option<OutputConfigFile>,
    annotate: Option<AnnotateConfigFile>,
    camera: Option<CameraConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    backend: Option<String>,
    path: Option<PathBuf>,
    input_size: Option<u32>,
    iou_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    dir: Option<PathBuf>,
    codec: Option<String>,
    fallback_codec: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotateConfigFile {
    font_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct VehicleConfig {
    pub api_addr: String,
    pub model: ModelSettings,
    pub output: OutputSettings,
    pub font_path: Option<PathBuf>,
    pub camera: CameraSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub backend: String,
    pub path: PathBuf,
    pub input_size: u32,
    pub iou_threshold: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub dir: PathBuf,
    pub codec: CodecHint,
    pub fallback_codec: CodecHint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub device: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl VehicleConfig {
    /// File named by `VEHICLE_CONFIG` (optional), then env overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VEHICLE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: VehicleConfigFile) -> Result<Self> {
        let api_addr = file
            .api
            .and_then(|api| api.addr)
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());

        let model = file.model.unwrap_or_default();
        let model = ModelSettings {
            backend: model
                .backend
                .unwrap_or_else(|| DEFAULT_MODEL_BACKEND.to_string()),
            path: model
                .path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            input_size: model.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            iou_threshold: model.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
        };

        let output = file.output.unwrap_or_default();
        let output = OutputSettings {
            dir: output
                .dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            codec: match output.codec {
                Some(codec) => codec.parse()?,
                None => DEFAULT_OUTPUT_CODEC,
            },
            fallback_codec: match output.fallback_codec {
                Some(codec) => codec.parse()?,
                None => DEFAULT_FALLBACK_CODEC,
            },
        };

        let camera = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            device: camera
                .device
                .unwrap_or_else(|| DEFAULT_CAMERA_DEVICE.to_string()),
            target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
        };

        Ok(Self {
            api_addr,
            model,
            output,
            font_path: file.annotate.and_then(|annotate| annotate.font_path),
            camera,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = non_empty_var("VEHICLE_API_ADDR") {
            self.api_addr = addr;
        }
        if let Some(backend) = non_empty_var("VEHICLE_MODEL_BACKEND") {
            self.model.backend = backend;
        }
        if let Some(path) = non_empty_var("VEHICLE_MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(dir) = non_empty_var("VEHICLE_OUTPUT_DIR") {
            self.output.dir = PathBuf::from(dir);
        }
        if let Some(codec) = non_empty_var("VEHICLE_OUTPUT_CODEC") {
            self.output.codec = codec
                .parse()
                .map_err(|e| anyhow!("VEHICLE_OUTPUT_CODEC: {}", e))?;
        }
        if let Some(path) = non_empty_var("VEHICLE_FONT_PATH") {
            self.font_path = Some(PathBuf::from(path));
        }
        if let Some(device) = non_empty_var("VEHICLE_CAMERA_DEVICE") {
            self.camera.device = device;
        }
        if let Some(fps) = non_empty_var("VEHICLE_CAMERA_FPS") {
            self.camera.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("VEHICLE_CAMERA_FPS must be an integer frame rate"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.model.backend = self.model.backend.trim().to_lowercase();
        if !KNOWN_BACKENDS.contains(&self.model.backend.as_str()) {
            return Err(anyhow!(
                "unknown model backend '{}' (expected one of: {})",
                self.model.backend,
                KNOWN_BACKENDS.join(", ")
            ));
        }
        if self.model.input_size == 0 || self.model.input_size % 32 != 0 {
            return Err(anyhow!(
                "model input_size must be a positive multiple of 32, got {}",
                self.model.input_size
            ));
        }
        if !(self.model.iou_threshold > 0.0 && self.model.iou_threshold <= 1.0) {
            return Err(anyhow!(
                "model iou_threshold must be in (0, 1], got {}",
                self.model.iou_threshold
            ));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be non-zero"));
        }
        if self.api_addr.trim().is_empty() {
            return Err(anyhow!("api addr must not be empty"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<VehicleConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let mut cfg = VehicleConfig::from_file(VehicleConfigFile::default()).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.api_addr, DEFAULT_API_ADDR);
        assert_eq!(cfg.model.input_size, 640);
        assert_eq!(cfg.output.codec, CodecHint::Mp4v);
        assert_eq!(cfg.output.fallback_codec, CodecHint::Mjpeg);
        assert!(cfg.font_path.is_none());
    }

    #[test]
    fn rejects_bad_model_settings() {
        let mut cfg = VehicleConfig::from_file(VehicleConfigFile::default()).unwrap();
        cfg.model.input_size = 100;
        assert!(cfg.validate().is_err());

        let mut cfg = VehicleConfig::from_file(VehicleConfigFile::default()).unwrap();
        cfg.model.iou_threshold = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = VehicleConfig::from_file(VehicleConfigFile::default()).unwrap();
        cfg.model.backend = "opencv".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_codec_in_file_is_an_error() {
        let file = VehicleConfigFile {
            output: Some(OutputConfigFile {
                codec: Some("h266".to_string()),
                ..OutputConfigFile::default()
            }),
            ..VehicleConfigFile::default()
        };
        assert!(VehicleConfig::from_file(file).is_err());
    }
}
