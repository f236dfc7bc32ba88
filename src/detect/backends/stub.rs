use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;

type DetectFn = Box<dyn FnMut(u64, u32, u32) -> Result<Vec<RawDetection>> + Send>;

/// Stub backend for testing and dry runs.
///
/// By default it finds nothing. Scripted variants return fixed detections or
/// call a closure with `(call_index, width, height)` for each frame.
pub struct StubBackend {
    script: Option<DetectFn>,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            script: None,
            calls: 0,
        }
    }

    /// Returns the same detections for every frame.
    pub fn fixed(detections: Vec<RawDetection>) -> Self {
        Self::from_fn(move |_, _, _| Ok(detections.clone()))
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut(u64, u32, u32) -> Result<Vec<RawDetection>> + Send + 'static,
    {
        Self {
            script: Some(Box::new(f)),
            calls: 0,
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>> {
        let call = self.calls;
        self.calls += 1;
        match self.script.as_mut() {
            Some(script) => script(call, width, height),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    #[test]
    fn stub_backend_follows_its_script() {
        let mut backend = StubBackend::from_fn(|call, w, _| {
            if call % 2 == 0 {
                Ok(vec![RawDetection::new(
                    5,
                    0.8,
                    BoundingBox::new(0.0, 0.0, w as f32, 1.0),
                )])
            } else {
                Ok(vec![])
            }
        });

        assert_eq!(backend.detect(b"", 10, 10).unwrap().len(), 1);
        assert!(backend.detect(b"", 10, 10).unwrap().is_empty());
        assert_eq!(backend.detect(b"", 10, 10).unwrap()[0].bbox.x2, 10.0);
        assert_eq!(backend.calls(), 3);
    }

    #[test]
    fn default_stub_finds_nothing() {
        let mut backend = StubBackend::default();
        assert!(backend.detect(b"frame", 4, 4).unwrap().is_empty());
    }
}
