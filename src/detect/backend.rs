use anyhow::Result;

use crate::detect::result::RawDetection;

/// Detector backend trait.
///
/// A backend is the raw object detector. It reports every box it finds in the
/// detector's native class numbering; admission into the vehicle domain happens
/// afterwards in the filter, never inside a backend.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a packed RGB frame (`width * height * 3` bytes).
    ///
    /// Boxes are in source-frame pixel coordinates.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook, run once by the readiness gate after loading.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
