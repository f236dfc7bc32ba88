//! Error taxonomy for pipeline runs and the upload boundary.
//!
//! Filtering, annotation and statistics never fail. Everything else a run can
//! hit is reported as a `JobError` carried inside the job summary, so callers
//! decide retry/display policy themselves.

use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum JobError {
    /// The detector is still loading.
    #[error("model still loading")]
    ModelNotReady,
    /// Model initialisation failed; terminal for this process.
    #[error("model failed to load: {0}")]
    ModelFailed(String),
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("failed to decode frame: {0}")]
    DecodeError(String),
    /// The sink rejected the output even after the codec fallback.
    #[error("failed to encode output: {0}")]
    EncodeError(String),
    #[error("detection failed: {0}")]
    DetectionFailed(String),
    #[error("job cancelled")]
    Cancelled,
}

impl JobError {
    /// True for the readiness family, which callers report as "model still loading"
    /// or "model unavailable" instead of a generic failure.
    pub fn is_model_state(&self) -> bool {
        matches!(self, JobError::ModelNotReady | JobError::ModelFailed(_))
    }
}

/// Rejected at the upload boundary; never reaches the pipeline.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unsupported input type '{extension}' (expected an image or video file)")]
pub struct UnsupportedInput {
    pub extension: String,
}
