//! Local file frame source.
//!
//! `FileSource` reads frames from local media only:
//! - a still image (one frame)
//! - a directory of images, in file-name order
//! - a `stub://` synthetic stream
//! - a video file (feature `ingest-file-ffmpeg`)
//!
//! URL schemes other than `stub://` are rejected.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::media::{classify, MediaKind, IMAGE_EXTENSIONS};
use super::synthetic::{SyntheticSource, SyntheticSpec};
use crate::frame::{Frame, FrameRead, FrameSource, SourceInfo};

/// Configuration for a local file source.
#[derive(Clone, Debug)]
pub struct FileConfig {
    pub path: String,
    /// Frame rate reported for sources that carry none (images, directories).
    pub default_fps: f64,
}

impl FileConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            default_fps: 25.0,
        }
    }
}

pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticSource),
    Images(ImageListSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if config.path.starts_with("stub://") {
            let spec = SyntheticSpec::parse(&config.path)?;
            return Ok(Self {
                backend: FileBackend::Synthetic(SyntheticSource::new(spec)),
            });
        }

        let path = PathBuf::from(&config.path);
        if path.is_dir() {
            return Ok(Self {
                backend: FileBackend::Images(ImageListSource::directory(path, config.default_fps)),
            });
        }
        match classify(&path)? {
            MediaKind::Image => Ok(Self {
                backend: FileBackend::Images(ImageListSource::single(path, config.default_fps)),
            }),
            MediaKind::Video => Self::video(config),
        }
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    fn video(config: FileConfig) -> Result<Self> {
        Ok(Self {
            backend: FileBackend::Ffmpeg(FfmpegFileSource::new(config)),
        })
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    fn video(_config: FileConfig) -> Result<Self> {
        Err(anyhow!(
            "video decoding requires the ingest-file-ffmpeg feature"
        ))
    }
}

impl FrameSource for FileSource {
    fn open(&mut self) -> Result<SourceInfo> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.open(),
            FileBackend::Images(source) => source.open(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.open(),
        }
    }

    fn next_frame(&mut self) -> Result<FrameRead> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            FileBackend::Images(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }
}

// ----------------------------------------------------------------------------
// Still images and image directories
// ----------------------------------------------------------------------------

enum ImageOrigin {
    Single(PathBuf),
    Directory(PathBuf),
}

struct ImageListSource {
    origin: ImageOrigin,
    fps: f64,
    files: Vec<PathBuf>,
    next: usize,
    dimensions: (u32, u32),
}

impl ImageListSource {
    fn single(path: PathBuf, fps: f64) -> Self {
        Self {
            origin: ImageOrigin::Single(path),
            fps,
            files: Vec::new(),
            next: 0,
            dimensions: (0, 0),
        }
    }

    fn directory(path: PathBuf, fps: f64) -> Self {
        Self {
            origin: ImageOrigin::Directory(path),
            fps,
            files: Vec::new(),
            next: 0,
            dimensions: (0, 0),
        }
    }

    fn open(&mut self) -> Result<SourceInfo> {
        let description = match &self.origin {
            ImageOrigin::Single(path) => {
                self.files = vec![path.clone()];
                path.display().to_string()
            }
            ImageOrigin::Directory(dir) => {
                self.files = list_images(dir)?;
                if self.files.is_empty() {
                    return Err(anyhow!("no images found in {}", dir.display()));
                }
                format!("{} ({} images)", dir.display(), self.files.len())
            }
        };
        // Dimensions come from the first frame; later frames must match.
        let (width, height) = image::image_dimensions(&self.files[0])
            .with_context(|| format!("failed to read {}", self.files[0].display()))?;
        self.dimensions = (width, height);
        Ok(SourceInfo {
            width,
            height,
            fps: self.fps,
            total_frames: Some(self.files.len() as u64),
            description,
        })
    }

    fn next_frame(&mut self) -> Result<FrameRead> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(FrameRead::EndOfStream);
        };
        let image = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_rgb8();
        if image.dimensions() != self.dimensions {
            return Err(anyhow!(
                "{} is {}x{}, expected {}x{} like the first image",
                path.display(),
                image.width(),
                image.height(),
                self.dimensions.0,
                self.dimensions.1
            ));
        }
        let frame = Frame::new(self.next as u64, image);
        self.next += 1;
        Ok(FrameRead::Frame(frame))
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
        if path.is_file() && is_image {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn rejects_urls_and_unknown_types() {
        assert!(FileSource::new(FileConfig::new("rtsp://camera/1")).is_err());
        assert!(FileSource::new(FileConfig::new("")).is_err());
        assert!(FileSource::new(FileConfig::new("notes.txt")).is_err());
    }

    #[test]
    fn reads_image_directory_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        for name in ["b.png", "a.png", "c.jpg"] {
            RgbImage::new(6, 4).save(dir.path().join(name))?;
        }
        fs::write(dir.path().join("readme.txt"), "ignored")?;

        let mut source = FileSource::new(FileConfig::new(dir.path().to_string_lossy()))?;
        let info = source.open()?;
        assert_eq!(info.total_frames, Some(3));
        assert_eq!((info.width, info.height), (6, 4));

        let mut seen = 0;
        while let FrameRead::Frame(frame) = source.next_frame()? {
            assert_eq!(frame.index, seen);
            seen += 1;
        }
        assert_eq!(seen, 3);
        Ok(())
    }

    #[test]
    fn mismatched_image_size_is_a_read_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        RgbImage::new(6, 4).save(dir.path().join("a.png"))?;
        RgbImage::new(8, 4).save(dir.path().join("b.png"))?;

        let mut source = FileSource::new(FileConfig::new(dir.path().to_string_lossy()))?;
        source.open()?;
        assert!(matches!(source.next_frame()?, FrameRead::Frame(_)));
        let err = source.next_frame().unwrap_err();
        assert!(err.to_string().contains("expected 6x4"));
        Ok(())
    }

    #[test]
    fn missing_image_fails_on_open() {
        let mut source = FileSource::new(FileConfig::new("/nonexistent/car.jpg")).unwrap();
        assert!(source.open().is_err());
    }
}
