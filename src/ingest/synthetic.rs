//! Synthetic `stub://` frames for dry runs and tests.
//!
//! `stub://<name>?frames=<n>&width=<w>&height=<h>&fps=<f>`; every parameter is
//! optional. Without `frames` the source never ends, like a camera.

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::frame::{Frame, FrameRead, FrameSource, SourceInfo};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: f64 = 10.0;

#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticSpec {
    pub name: String,
    pub frames: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl SyntheticSpec {
    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic sources must start with stub://"))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));
        let mut spec = Self {
            name: name.to_string(),
            frames: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
        };
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub parameter '{}'", pair))?;
            let bad = || anyhow!("invalid value '{}' for stub parameter '{}'", value, key);
            match key {
                "frames" => spec.frames = Some(value.parse().map_err(|_| bad())?),
                "width" => spec.width = value.parse().map_err(|_| bad())?,
                "height" => spec.height = value.parse().map_err(|_| bad())?,
                "fps" => spec.fps = value.parse().map_err(|_| bad())?,
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        if spec.width == 0 || spec.height == 0 {
            return Err(anyhow!("stub frame dimensions must be non-zero"));
        }
        Ok(spec)
    }
}

pub struct SyntheticSource {
    spec: SyntheticSpec,
    live: bool,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(spec: SyntheticSpec) -> Self {
        Self {
            spec,
            live: false,
            frame_count: 0,
            scene_state: 0,
        }
    }

    /// Report as a live source (no total frame count).
    pub fn live(mut self) -> Self {
        self.live = true;
        self
    }

    fn generate(&mut self) -> RgbImage {
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let shift = self.frame_count + self.scene_state as u64;
        RgbImage::from_fn(self.spec.width, self.spec.height, |x, y| {
            let v = ((x as u64 + y as u64 + shift) % 256) as u8;
            image::Rgb([v, v.wrapping_add(85), v.wrapping_add(170)])
        })
    }
}

impl FrameSource for SyntheticSource {
    fn open(&mut self) -> Result<SourceInfo> {
        log::info!("connected to {} (synthetic)", self.spec.name);
        Ok(SourceInfo {
            width: self.spec.width,
            height: self.spec.height,
            fps: self.spec.fps,
            total_frames: if self.live { None } else { self.spec.frames },
            description: format!("stub://{}", self.spec.name),
        })
    }

    fn next_frame(&mut self) -> Result<FrameRead> {
        if let Some(limit) = self.spec.frames {
            if self.frame_count >= limit {
                return Ok(FrameRead::EndOfStream);
            }
        }
        let image = self.generate();
        let frame = Frame::new(self.frame_count, image);
        self.frame_count += 1;
        Ok(FrameRead::Frame(frame))
    }

    fn is_live(&self) -> bool {
        self.live
    }
}
