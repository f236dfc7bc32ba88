//! Vehicle detection and traffic statistics.
//!
//! Frames from images, video files or cameras go through one pipeline:
//! detect, keep vehicles only, annotate, record statistics, write output.
//! A read-only dashboard view over the statistics runs alongside.
//!
//! # Module Structure
//!
//! - `detect`: vehicle domain types, the vehicle filter, detector backends and
//!   the model readiness gate
//! - `frame`: frames and the `FrameSource` / `FrameSink` capabilities
//! - `ingest`: concrete sources (images, image directories, video, V4L2, stub)
//! - `sink`: output sinks and the codec fallback policy
//! - `annotate`: boxes, labels and the statistics overlay
//! - `stats`: the process-wide statistics aggregator
//! - `pipeline`: the frame pipeline, job control and summaries
//! - `dashboard`, `api`: read-only views and their HTTP endpoint

pub mod annotate;
pub mod api;
pub mod config;
pub mod dashboard;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod sink;
pub mod stats;
pub mod ui;

pub use annotate::{Annotator, Palette};
pub use config::VehicleConfig;
pub use dashboard::{Dashboard, HistoryView, SnapshotView};
pub use detect::{
    admit, load_backend, BoundingBox, ClassCounts, Detection, DetectionBatch, DetectorBackend,
    ModelGate, ModelStatus, RawDetection, StubBackend, VehicleClass,
};
pub use error::{JobError, UnsupportedInput};
pub use frame::{Frame, FrameRead, FrameSink, FrameSource, SourceInfo};
pub use ingest::{FileConfig, FileSource, MediaKind};
pub use pipeline::{
    FramePipeline, ImageReport, JobControl, JobOutcome, JobState, JobSummary, OutputRequest,
    PipelineMode,
};
pub use sink::{CodecHint, SinkFactory};
pub use stats::{AggregateStats, HistoryEntry, StatsAggregator, HISTORY_CAPACITY};
