//! Frame sources.
//!
//! - Local files: still images, image directories and video files
//!   (video needs feature `ingest-file-ffmpeg`)
//! - V4L2 cameras (feature: ingest-v4l2)
//! - `stub://` synthetic streams (dry runs and tests)
//!
//! `media` holds the upload boundary that decides image vs. video vs. unsupported.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod media;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use file::{FileConfig, FileSource};
pub use media::{classify, MediaKind};
pub use synthetic::{SyntheticSource, SyntheticSpec};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

use anyhow::Result;

use crate::config::CameraSettings;
use crate::frame::FrameSource;

/// Build the live source for `settings.device`. `stub://` devices work without
/// V4L2 support compiled in.
pub fn camera_source(settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Source::new(V4l2Config::from(settings))?))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        if settings.device.starts_with("stub://") {
            let mut spec = SyntheticSpec::parse(&settings.device)?;
            spec.width = settings.width;
            spec.height = settings.height;
            spec.fps = settings.target_fps as f64;
            Ok(Box::new(SyntheticSource::new(spec).live()))
        } else {
            Err(anyhow::anyhow!(
                "camera capture requires the ingest-v4l2 feature"
            ))
        }
    }
}
