use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

use crate::frame::FrameSink;
use crate::sink::{CodecHint, SinkFactory, SinkOpenError, SinkRequest};

/// Writes every frame as a numbered image (`frame_000001.jpg`, ...) into one
/// output directory. Supports the per-frame codecs only.
pub struct ImageSequenceSinkFactory;

impl SinkFactory for ImageSequenceSinkFactory {
    fn open(&self, request: &SinkRequest) -> Result<Box<dyn FrameSink>, SinkOpenError> {
        match request.codec {
            CodecHint::Mjpeg | CodecHint::Png => {}
            other => return Err(SinkOpenError::Unsupported(other)),
        }
        let sink = ImageSequenceSink::create(&request.path, request.codec, request.width, request.height)?;
        Ok(Box::new(sink))
    }
}

pub struct ImageSequenceSink {
    dir: PathBuf,
    codec: CodecHint,
    width: u32,
    height: u32,
    written: u64,
    closed: bool,
}

impl ImageSequenceSink {
    pub fn create(dir: &Path, codec: CodecHint, width: u32, height: u32) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory {}", dir.display()))?;
        log::info!("writing {} frames to {}", codec, dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
            codec,
            width,
            height,
            written: 0,
            closed: false,
        })
    }

    fn frame_path(&self, number: u64) -> PathBuf {
        self.dir
            .join(format!("frame_{:06}.{}", number, self.codec.extension()))
    }
}

impl FrameSink for ImageSequenceSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if self.closed {
            return Err(anyhow!("sink already closed"));
        }
        if frame.dimensions() != (self.width, self.height) {
            return Err(anyhow!(
                "frame is {}x{}, sink was opened for {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            ));
        }
        let path = self.frame_path(self.written + 1);
        frame
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            log::debug!("closed {} after {} frames", self.dir.display(), self.written);
        }
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.dir)
    }
}
