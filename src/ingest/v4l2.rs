//! V4L2 camera source.
//!
//! Live frames from a local device node (e.g. `/dev/video0`). `stub://` device
//! paths produce an endless synthetic stream instead, for dry runs without a
//! camera. Whatever pixel format the driver settles on is normalised to RGB.

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use ouroboros::self_referencing;

use super::normalize::PixelFormat;
use super::synthetic::{SyntheticSource, SyntheticSpec};
use crate::config::CameraSettings;
use crate::frame::{Frame, FrameRead, FrameSource, SourceInfo};

/// Camera device and the capture geometry to request from it.
#[derive(Clone, Debug)]
pub struct V4l2Config {
    pub device: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl From<&CameraSettings> for V4l2Config {
    fn from(settings: &CameraSettings) -> Self {
        Self {
            device: settings.device.clone(),
            target_fps: settings.target_fps,
            width: settings.width,
            height: settings.height,
        }
    }
}

pub struct V4l2Source {
    backend: V4l2Backend,
}

enum V4l2Backend {
    Synthetic(SyntheticSource),
    Device(DeviceCamera),
}

impl V4l2Source {
    pub fn new(config: V4l2Config) -> Result<Self> {
        if config.device.starts_with("stub://") {
            let mut spec = SyntheticSpec::parse(&config.device)?;
            spec.width = config.width;
            spec.height = config.height;
            spec.fps = config.target_fps as f64;
            Ok(Self {
                backend: V4l2Backend::Synthetic(SyntheticSource::new(spec).live()),
            })
        } else {
            Ok(Self {
                backend: V4l2Backend::Device(DeviceCamera::new(config)),
            })
        }
    }
}

impl FrameSource for V4l2Source {
    fn open(&mut self) -> Result<SourceInfo> {
        match &mut self.backend {
            V4l2Backend::Synthetic(source) => source.open(),
            V4l2Backend::Device(source) => source.open(),
        }
    }

    fn next_frame(&mut self) -> Result<FrameRead> {
        match &mut self.backend {
            V4l2Backend::Synthetic(source) => source.next_frame(),
            V4l2Backend::Device(source) => source.next_frame(),
        }
    }

    fn is_live(&self) -> bool {
        true
    }
}

/// An opened capture device with its mmap stream borrowed from it.
#[self_referencing]
struct CaptureStream {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

/// Geometry and encoding the driver actually agreed to.
#[derive(Clone, Copy, Debug)]
struct Negotiated {
    width: u32,
    height: u32,
    format: PixelFormat,
}

struct DeviceCamera {
    config: V4l2Config,
    capture: Option<(CaptureStream, Negotiated)>,
    next_index: u64,
}

impl DeviceCamera {
    fn new(config: V4l2Config) -> Self {
        Self {
            config,
            capture: None,
            next_index: 0,
        }
    }

    fn open(&mut self) -> Result<SourceInfo> {
        let device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("failed to open camera {}", self.config.device))?;
        let negotiated = negotiate_format(&device, &self.config)?;
        let fps = negotiate_fps(&device, &self.config);

        let stream = CaptureStreamTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, v4l::buffer::Type::VideoCapture, 4)
                    .context("failed to map camera buffers")
            },
        }
        .try_build()?;
        self.capture = Some((stream, negotiated));

        log::info!(
            "camera {} open: {}x{} {:?} at {:.1} fps",
            self.config.device,
            negotiated.width,
            negotiated.height,
            negotiated.format,
            fps
        );
        Ok(SourceInfo {
            width: negotiated.width,
            height: negotiated.height,
            fps,
            total_frames: None,
            description: self.config.device.clone(),
        })
    }

    fn next_frame(&mut self) -> Result<FrameRead> {
        use v4l::io::traits::CaptureStream as _;

        let (stream, negotiated) = self
            .capture
            .as_mut()
            .ok_or_else(|| anyhow!("camera {} is not open", self.config.device))?;
        let negotiated = *negotiated;
        let image = stream.with_stream_mut(|stream| -> Result<RgbImage> {
            let (buffer, _meta) = stream.next().context("camera capture failed")?;
            negotiated
                .format
                .to_rgb_image(buffer, negotiated.width, negotiated.height)
        })?;

        let frame = Frame::new(self.next_index, image);
        self.next_index += 1;
        Ok(FrameRead::Frame(frame))
    }
}

/// Ask for RGB at the configured size; accept whatever the driver keeps as
/// long as it is a format we can convert.
fn negotiate_format(device: &v4l::Device, config: &V4l2Config) -> Result<Negotiated> {
    use v4l::video::Capture;

    let mut wanted = device.format().context("failed to read camera format")?;
    wanted.width = config.width;
    wanted.height = config.height;
    wanted.fourcc = v4l::FourCC::new(PixelFormat::PREFERRED_FOURCC);

    let applied = device.set_format(&wanted).or_else(|err| {
        log::warn!("camera {} refused RGB: {}", config.device, err);
        device.format()
    })?;
    let format = PixelFormat::from_fourcc(&applied.fourcc.repr).ok_or_else(|| {
        anyhow!(
            "camera {} delivers unsupported pixel format {}",
            config.device,
            applied.fourcc
        )
    })?;
    Ok(Negotiated {
        width: applied.width,
        height: applied.height,
        format,
    })
}

/// Request the configured frame interval; fall back to the configured rate
/// when the driver does not report one.
fn negotiate_fps(device: &v4l::Device, config: &V4l2Config) -> f64 {
    use v4l::video::Capture;

    let params = v4l::video::capture::Parameters::with_fps(config.target_fps);
    match device.set_params(&params) {
        Ok(applied) if applied.interval.numerator > 0 => {
            applied.interval.denominator as f64 / applied.interval.numerator as f64
        }
        Ok(_) => config.target_fps as f64,
        Err(err) => {
            log::warn!("camera {} ignored frame rate request: {}", config.device, err);
            config.target_fps as f64
        }
    }
}
