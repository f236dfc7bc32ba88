use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{anyhow, Result};
use image::RgbImage;

use crate::frame::FrameSink;
use crate::sink::{CodecHint, SinkFactory, SinkOpenError, SinkRequest};

/// Frames collected by a memory sink, shared with whoever created it.
pub type SharedFrames = Arc<Mutex<Vec<RgbImage>>>;

/// Keeps written frames in memory. Used for previews and tests.
pub struct MemorySink {
    frames: SharedFrames,
    closed: Arc<Mutex<bool>>,
    written: u64,
}

impl MemorySink {
    pub fn new(frames: SharedFrames) -> Self {
        Self {
            frames,
            closed: Arc::new(Mutex::new(false)),
            written: 0,
        }
    }
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if *self.closed.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(anyhow!("sink already closed"));
        }
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.clone());
        self.written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner) = true;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.written
    }
}

/// Opens `MemorySink`s over one shared buffer. Codecs listed as rejected are
/// refused with `Unsupported`, which lets callers exercise the fallback path.
#[derive(Clone, Default)]
pub struct MemorySinkFactory {
    frames: SharedFrames,
    closed: Arc<Mutex<bool>>,
    rejected: HashSet<CodecHint>,
    opened: Arc<Mutex<Vec<CodecHint>>>,
}

impl MemorySinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting(mut self, codec: CodecHint) -> Self {
        self.rejected.insert(codec);
        self
    }

    pub fn frames(&self) -> SharedFrames {
        Arc::clone(&self.frames)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True once the most recently opened sink was closed.
    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Codecs of every successfully opened sink, in order.
    pub fn opened_codecs(&self) -> Vec<CodecHint> {
        self.opened.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl SinkFactory for MemorySinkFactory {
    fn open(&self, request: &SinkRequest) -> Result<Box<dyn FrameSink>, SinkOpenError> {
        if self.rejected.contains(&request.codec) {
            return Err(SinkOpenError::Unsupported(request.codec));
        }
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.codec);
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner) = false;
        Ok(Box::new(MemorySink {
            frames: Arc::clone(&self.frames),
            closed: Arc::clone(&self.closed),
            written: 0,
        }))
    }
}
