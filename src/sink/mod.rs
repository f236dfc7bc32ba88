//! Output sinks and the codec fallback policy.
//!
//! A `SinkFactory` is the encode capability: given a request it either opens a
//! `FrameSink` or reports that it cannot produce the requested codec. The
//! pipeline asks for the configured codec first and, when that is rejected,
//! retries once with the fallback codec before giving up with `EncodeError`.

mod image_seq;
mod memory;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::JobError;
use crate::frame::FrameSink;

pub use image_seq::{ImageSequenceSink, ImageSequenceSinkFactory};
pub use memory::{MemorySink, MemorySinkFactory, SharedFrames};

/// Requested output encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecHint {
    /// MPEG-4 part 2 in an `.mp4` container.
    Mp4v,
    /// XVID in an `.avi` container.
    Xvid,
    /// Motion JPEG, one JPEG per frame.
    Mjpeg,
    /// Lossless PNG per frame.
    Png,
}

impl CodecHint {
    pub fn as_str(self) -> &'static str {
        match self {
            CodecHint::Mp4v => "mp4v",
            CodecHint::Xvid => "xvid",
            CodecHint::Mjpeg => "mjpeg",
            CodecHint::Png => "png",
        }
    }

    /// File extension for the container (or per-frame image) this codec uses.
    pub fn extension(self) -> &'static str {
        match self {
            CodecHint::Mp4v => "mp4",
            CodecHint::Xvid => "avi",
            CodecHint::Mjpeg => "jpg",
            CodecHint::Png => "png",
        }
    }
}

impl fmt::Display for CodecHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodecHint {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mp4v" | "mp4" => Ok(CodecHint::Mp4v),
            "xvid" | "avi" => Ok(CodecHint::Xvid),
            "mjpeg" | "mjpg" | "jpeg" | "jpg" => Ok(CodecHint::Mjpeg),
            "png" => Ok(CodecHint::Png),
            other => Err(anyhow!("unknown output codec '{}'", other)),
        }
    }
}

/// Parameters for opening a sink.
#[derive(Clone, Debug, PartialEq)]
pub struct SinkRequest {
    /// Output location without extension; factories append their own.
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: CodecHint,
}

impl SinkRequest {
    pub fn with_codec(&self, codec: CodecHint) -> Self {
        Self {
            codec,
            ..self.clone()
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkOpenError {
    /// The factory cannot produce this codec; the caller may fall back.
    #[error("codec {0} is not supported by this sink")]
    Unsupported(CodecHint),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// Encode capability.
pub trait SinkFactory: Send + Sync {
    fn open(&self, request: &SinkRequest) -> Result<Box<dyn FrameSink>, SinkOpenError>;
}

/// Open `request`, retrying once with `fallback` if the requested codec is
/// rejected. Returns the sink and the codec actually in use.
pub fn open_with_fallback(
    factory: &dyn SinkFactory,
    request: &SinkRequest,
    fallback: CodecHint,
) -> Result<(Box<dyn FrameSink>, CodecHint), JobError> {
    match factory.open(request) {
        Ok(sink) => Ok((sink, request.codec)),
        Err(SinkOpenError::Unsupported(codec)) if codec != fallback => {
            log::warn!(
                "output codec {} unavailable, falling back to {}",
                codec,
                fallback
            );
            factory
                .open(&request.with_codec(fallback))
                .map(|sink| (sink, fallback))
                .map_err(|err| JobError::EncodeError(format!("{:#}", err)))
        }
        Err(err) => Err(JobError::EncodeError(format!("{:#}", err))),
    }
}
