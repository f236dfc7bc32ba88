//! Frame pipeline: drives a source through detect, filter, annotate, record and
//! write, for single images, video files and live cameras alike.
//!
//! A run moves through `Opening -> Processing -> {Completed | Failed |
//! PartialFailure | Cancelled}`. Errors never escape as panics or raw `Err`s;
//! they end up in the returned `JobSummary`. Frames are handled strictly in
//! source order and any sink that was opened is closed before the run returns.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use serde::Serialize;

use crate::annotate::Annotator;
use crate::detect::{admit, ClassCounts, Detection, DetectionBatch, ModelGate};
use crate::error::JobError;
use crate::frame::{Frame, FrameRead, FrameSink, FrameSource};
use crate::sink::{open_with_fallback, CodecHint, ImageSequenceSinkFactory, SinkFactory, SinkRequest};
use crate::stats::StatsAggregator;

const PROGRESS_LOG_INTERVAL: u64 = 30;
const JPEG_QUALITY: u8 = 90;

/// Batch runs write frames as they come. Interactive runs also draw the live
/// statistics overlay and honour reset requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineMode {
    Batch,
    Interactive,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Opening,
    Processing,
    Completed,
    Failed,
    PartialFailure,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::PartialFailure | JobState::Cancelled
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    Failed,
    PartialFailure,
    Cancelled,
}

impl From<JobOutcome> for JobState {
    fn from(outcome: JobOutcome) -> Self {
        match outcome {
            JobOutcome::Completed => JobState::Completed,
            JobOutcome::Failed => JobState::Failed,
            JobOutcome::PartialFailure => JobState::PartialFailure,
            JobOutcome::Cancelled => JobState::Cancelled,
        }
    }
}

/// Progress as seen by a poller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobProgress {
    pub state: JobState,
    pub frames_processed: u64,
    pub total_frames: Option<u64>,
}

struct ControlInner {
    stop: AtomicBool,
    reset: AtomicBool,
    frames_processed: AtomicU64,
    status: Mutex<(JobState, Option<u64>)>,
}

/// Shared handle between a running job and the outside world: stop and reset
/// requests go in, progress comes out. Cheap to clone.
#[derive(Clone)]
pub struct JobControl {
    inner: Arc<ControlInner>,
}

impl JobControl {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ControlInner {
                stop: AtomicBool::new(false),
                reset: AtomicBool::new(false),
                frames_processed: AtomicU64::new(0),
                status: Mutex::new((JobState::Pending, None)),
            }),
        }
    }

    /// Ask the job to stop at the next frame boundary.
    pub fn request_stop(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.inner.stop.load(Ordering::SeqCst)
    }

    /// Ask an interactive job to clear the statistics at the next frame boundary.
    pub fn request_reset(&self) {
        self.inner.reset.store(true, Ordering::SeqCst);
    }

    pub fn frames_processed(&self) -> u64 {
        self.inner.frames_processed.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> JobProgress {
        let (state, total_frames) = *self.status();
        JobProgress {
            state,
            frames_processed: self.frames_processed(),
            total_frames,
        }
    }

    /// Start a new run on this control. Requests left over from a finished
    /// run are dropped; requests made before the first run are kept.
    fn begin(&self) {
        let mut status = self.status();
        if status.0.is_terminal() {
            self.inner.stop.store(false, Ordering::SeqCst);
            self.inner.reset.store(false, Ordering::SeqCst);
        }
        self.inner.frames_processed.store(0, Ordering::SeqCst);
        *status = (JobState::Opening, None);
    }

    fn take_reset(&self) -> bool {
        self.inner.reset.swap(false, Ordering::SeqCst)
    }

    fn advance(&self) -> u64 {
        self.inner.frames_processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn set_state(&self, state: JobState) {
        self.status().0 = state;
    }

    fn set_total(&self, total: Option<u64>) {
        self.status().1 = total;
    }

    fn status(&self) -> std::sync::MutexGuard<'_, (JobState, Option<u64>)> {
        self.inner.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for JobControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Where and how a run should write its annotated frames.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputRequest {
    pub path: PathBuf,
    pub codec: CodecHint,
}

impl OutputRequest {
    /// `<dir>/output_video_<unix-seconds>`.
    pub fn timestamped(dir: &Path, codec: CodecHint, now: DateTime<Utc>) -> Self {
        Self {
            path: dir.join(output_name(now)),
            codec,
        }
    }
}

pub fn output_name(now: DateTime<Utc>) -> String {
    format!("output_video_{}", now.timestamp())
}

/// Result of one run. `per_class` is this run's own tally, independent of the
/// process-wide statistics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobSummary {
    pub outcome: JobOutcome,
    pub frames_processed: u64,
    pub total_frames: Option<u64>,
    pub per_class: ClassCounts,
    pub total_detections: u64,
    pub output: Option<PathBuf>,
    pub codec: Option<CodecHint>,
    pub error: Option<JobError>,
}

impl JobSummary {
    pub fn is_success(&self) -> bool {
        self.outcome == JobOutcome::Completed
    }
}

/// Detections and rendering for one still image.
#[derive(Clone, Debug)]
pub struct ImageReport {
    pub detections: Vec<Detection>,
    pub breakdown: ClassCounts,
    pub annotated: RgbImage,
}

/// JSON body returned for an image upload.
#[derive(Clone, Debug, Serialize)]
pub struct ImageResponse {
    pub total_vehicles: u64,
    pub vehicle_breakdown: std::collections::BTreeMap<String, u64>,
    pub detections: Vec<Detection>,
}

impl ImageReport {
    pub fn total_vehicles(&self) -> u64 {
        self.detections.len() as u64
    }

    pub fn response(&self) -> ImageResponse {
        ImageResponse {
            total_vehicles: self.total_vehicles(),
            vehicle_breakdown: self
                .breakdown
                .non_zero()
                .map(|(class, count)| (class.name().to_string(), count))
                .collect(),
            detections: self.detections.clone(),
        }
    }

    pub fn to_jpeg(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        self.annotated
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))
            .context("failed to encode annotated image")?;
        Ok(buf.into_inner())
    }
}

#[derive(Default)]
struct Tally {
    per_class: ClassCounts,
    total_detections: u64,
}

pub struct FramePipeline {
    gate: Arc<ModelGate>,
    stats: Arc<StatsAggregator>,
    annotator: Arc<Annotator>,
    sinks: Arc<dyn SinkFactory>,
    fallback_codec: CodecHint,
    mode: PipelineMode,
}

impl FramePipeline {
    pub fn new(gate: Arc<ModelGate>, stats: Arc<StatsAggregator>) -> Self {
        Self {
            gate,
            stats,
            annotator: Arc::new(Annotator::new()),
            sinks: Arc::new(ImageSequenceSinkFactory),
            fallback_codec: CodecHint::Mjpeg,
            mode: PipelineMode::Batch,
        }
    }

    pub fn with_annotator(mut self, annotator: Arc<Annotator>) -> Self {
        self.annotator = annotator;
        self
    }

    pub fn with_sink_factory(mut self, sinks: Arc<dyn SinkFactory>) -> Self {
        self.sinks = sinks;
        self
    }

    pub fn with_fallback_codec(mut self, codec: CodecHint) -> Self {
        self.fallback_codec = codec;
        self
    }

    pub fn with_mode(mut self, mode: PipelineMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    /// Detect, filter, annotate and record a single image.
    ///
    /// A gate that is not ready aborts before anything is recorded.
    pub fn run_image(&self, image: RgbImage) -> Result<ImageReport, JobError> {
        self.gate.check_ready()?;
        let frame = Frame::new(0, image);
        let (annotated, batch) = self.process_frame(&frame)?;
        let breakdown = batch.counts();
        log::info!(
            "image processed: {} vehicle(s) {:?}",
            batch.len(),
            breakdown
        );
        Ok(ImageReport {
            detections: batch.detections,
            breakdown,
            annotated,
        })
    }

    /// Drive `source` to completion, cancellation or failure.
    pub fn run(
        &self,
        source: &mut dyn FrameSource,
        output: Option<&OutputRequest>,
        control: &JobControl,
    ) -> JobSummary {
        let mut tally = Tally::default();
        control.begin();

        let info = match source.open() {
            Ok(info) => info,
            Err(err) => {
                let error = JobError::SourceUnavailable(format!("{err:#}"));
                return self.finish(control, &tally, Some(error), None);
            }
        };
        let total_frames = if source.is_live() { None } else { info.total_frames };
        control.set_total(total_frames);

        if let Err(error) = self.gate.check_ready() {
            return self.finish(control, &tally, Some(error), None);
        }

        let mut sink = match output {
            Some(request) => {
                let request = SinkRequest {
                    path: request.path.clone(),
                    width: info.width,
                    height: info.height,
                    fps: info.fps,
                    codec: request.codec,
                };
                match open_with_fallback(self.sinks.as_ref(), &request, self.fallback_codec) {
                    Ok(opened) => Some(opened),
                    Err(error) => return self.finish(control, &tally, Some(error), None),
                }
            }
            None => None,
        };

        log::info!(
            "processing {}: {}x{} at {:.1} fps, {} frames",
            info.description,
            info.width,
            info.height,
            info.fps,
            total_frames.map_or_else(|| "unknown".to_string(), |n| n.to_string())
        );
        control.set_state(JobState::Processing);

        let mut failure = self.process_stream(
            source,
            sink.as_mut().map(|(s, _)| -> &mut dyn FrameSink { s.as_mut() }),
            control,
            &mut tally,
            total_frames,
        );

        let mut written = None;
        if let Some((sink, codec)) = sink.as_mut() {
            if let Err(err) = sink.close() {
                log::error!("failed to finalise output: {:#}", err);
                failure.get_or_insert(JobError::EncodeError(format!("{err:#}")));
            }
            written = Some((sink.location().map(Path::to_path_buf), *codec));
        }
        self.finish(control, &tally, failure, written)
    }

    fn process_stream(
        &self,
        source: &mut dyn FrameSource,
        mut sink: Option<&mut dyn FrameSink>,
        control: &JobControl,
        tally: &mut Tally,
        total_frames: Option<u64>,
    ) -> Option<JobError> {
        loop {
            if control.stop_requested() {
                log::info!("stop requested");
                return Some(JobError::Cancelled);
            }
            if control.take_reset() {
                match self.mode {
                    PipelineMode::Interactive => self.stats.reset(),
                    PipelineMode::Batch => log::warn!("statistics reset ignored in batch mode"),
                }
            }

            let frame = match source.next_frame() {
                Ok(FrameRead::Frame(frame)) => frame,
                Ok(FrameRead::EndOfStream) => return None,
                Err(err) => return Some(JobError::DecodeError(format!("{err:#}"))),
            };

            let (annotated, batch) = match self.process_frame(&frame) {
                Ok(done) => done,
                Err(error) => return Some(error),
            };
            tally.per_class.merge(&batch.counts());
            tally.total_detections += batch.len() as u64;

            if let Some(sink) = sink.as_deref_mut() {
                if let Err(err) = sink.write_frame(&annotated) {
                    return Some(JobError::EncodeError(format!("{err:#}")));
                }
            }

            let processed = control.advance();
            if processed % PROGRESS_LOG_INTERVAL == 0 {
                match total_frames {
                    Some(total) if total > 0 => log::info!(
                        "progress: {:.1}% ({}/{} frames)",
                        processed as f64 * 100.0 / total as f64,
                        processed,
                        total
                    ),
                    _ => log::info!("progress: {} frames", processed),
                }
            }
        }
    }

    /// Detect, filter, annotate and record one frame.
    fn process_frame(&self, frame: &Frame) -> Result<(RgbImage, DetectionBatch), JobError> {
        let raw = self.gate.detect(frame)?;
        let detections = admit(&raw, frame.width(), frame.height());
        let mut annotated = self.annotator.render(frame.image(), &detections);
        let batch = DetectionBatch::new(frame.index, frame.captured_at, detections);
        self.stats.record(&batch);
        if self.mode == PipelineMode::Interactive {
            self.annotator
                .draw_stats_overlay(&mut annotated, &self.stats.cumulative());
        }
        Ok((annotated, batch))
    }

    fn finish(
        &self,
        control: &JobControl,
        tally: &Tally,
        error: Option<JobError>,
        written: Option<(Option<PathBuf>, CodecHint)>,
    ) -> JobSummary {
        let frames_processed = control.frames_processed();
        let outcome = match &error {
            None => JobOutcome::Completed,
            Some(JobError::Cancelled) => JobOutcome::Cancelled,
            Some(_) if frames_processed > 0 => JobOutcome::PartialFailure,
            Some(_) => JobOutcome::Failed,
        };
        control.set_state(outcome.into());

        match (&outcome, &error) {
            (JobOutcome::Completed, _) => log::info!(
                "job completed: {} frames, {} detections",
                frames_processed,
                tally.total_detections
            ),
            (_, Some(err)) => log::warn!(
                "job ended {:?} after {} frames: {}",
                outcome,
                frames_processed,
                err
            ),
            _ => {}
        }

        let (output, codec) = match written {
            Some((path, codec)) => (path, Some(codec)),
            None => (None, None),
        };
        JobSummary {
            outcome,
            frames_processed,
            total_frames: control.progress().total_frames,
            per_class: tally.per_class,
            total_detections: tally.total_detections,
            output,
            codec,
            error,
        }
    }
}
