//! Frames and the source/sink capabilities the pipeline drives.
//!
//! - `Frame`: one decoded RGB image with its position in the source.
//! - `FrameSource`: anything that yields frames in order (image, video, camera).
//! - `FrameSink`: anything that accepts annotated frames and must be finalised.
//!
//! Concrete sources live in `ingest`, concrete sinks in `sink`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use image::RgbImage;
use std::path::Path;

/// A decoded frame. The pixel buffer is owned; annotation always works on a copy.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Zero-based position within the source.
    pub index: u64,
    /// Wall-clock time the frame was pulled from its source.
    pub captured_at: DateTime<Utc>,
    image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self::with_timestamp(index, Utc::now(), image)
    }

    pub fn with_timestamp(index: u64, captured_at: DateTime<Utc>, image: RgbImage) -> Self {
        Self {
            index,
            captured_at,
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Packed RGB bytes, as handed to detector backends.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// Properties a source exposes once opened.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Known up front for video files only.
    pub total_frames: Option<u64>,
    pub description: String,
}

/// Result of pulling from a source.
#[derive(Debug)]
pub enum FrameRead {
    Frame(Frame),
    EndOfStream,
}

/// Ordered frame producer.
pub trait FrameSource: Send {
    /// Open the underlying media. Called once, before the first `next_frame`.
    fn open(&mut self) -> Result<SourceInfo>;

    /// Pull the next frame. An `Err` is a read/decode failure, not end of stream.
    fn next_frame(&mut self) -> Result<FrameRead>;

    /// Live sources (cameras) never report a total frame count.
    fn is_live(&self) -> bool {
        false
    }
}

/// Annotated frame consumer.
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Finalise the output. Must leave a readable artifact holding every frame
    /// written so far.
    fn close(&mut self) -> Result<()>;

    fn frames_written(&self) -> u64;

    /// Where the output lives, when it is on disk.
    fn location(&self) -> Option<&Path> {
        None
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn open(&mut self) -> Result<SourceInfo> {
        (**self).open()
    }

    fn next_frame(&mut self) -> Result<FrameRead> {
        (**self).next_frame()
    }

    fn is_live(&self) -> bool {
        (**self).is_live()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_exposes_packed_rgb() {
        let frame = Frame::new(3, RgbImage::new(4, 2));
        assert_eq!(frame.width(), 4);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.pixels().len(), 4 * 2 * 3);
        assert_eq!(frame.index, 3);
    }
}
