//! vehicle_detect - one-shot vehicle detection on an image, a video or a camera

use anyhow::{anyhow, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use vehicle_watch::{
    ingest::{camera_source, classify},
    load_backend, ui, Annotator, CodecHint, FileConfig, FileSource, FramePipeline, FrameSource,
    JobControl, JobError, JobSummary, MediaKind, ModelGate, ModelStatus, OutputRequest, PipelineMode,
    StatsAggregator, VehicleConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct CommonArgs {
    /// Detector backend (stub or tract). Overrides the config file.
    #[arg(long, global = true)]
    backend: Option<String>,
    /// Path to the ONNX model. Overrides the config file.
    #[arg(long, global = true)]
    model: Option<PathBuf>,
    /// TTF/OTF font used for labels and the statistics overlay.
    #[arg(long, global = true)]
    font: Option<PathBuf>,
    /// Output directory. Overrides the config file.
    #[arg(long, global = true)]
    out_dir: Option<PathBuf>,
    /// Progress display: auto, plain or pretty.
    #[arg(long, global = true)]
    ui: Option<String>,
    /// Seconds to wait for the model to load.
    #[arg(long, global = true, default_value_t = 120)]
    model_timeout: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect vehicles in one image and write the annotated copy.
    Image {
        path: PathBuf,
        /// Annotated image destination (defaults to <out-dir>/<stem>_detected.jpg).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Process a video file, image directory or stub:// source.
    Video {
        path: String,
        /// Output codec (mp4v, xvid, mjpeg, png). Overrides the config file.
        #[arg(long)]
        codec: Option<CodecHint>,
        /// Skip writing annotated output.
        #[arg(long)]
        no_output: bool,
    },
    /// Live camera detection with the statistics overlay. Type q to quit, r to reset.
    Camera {
        /// Device path (e.g. /dev/video0 or stub://cam). Overrides the config file.
        #[arg(long)]
        device: Option<String>,
        /// Write annotated frames under the output directory.
        #[arg(long)]
        record: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = VehicleConfig::load()?;
    if let Some(backend) = &cli.common.backend {
        config.model.backend = backend.to_lowercase();
    }
    if let Some(model) = &cli.common.model {
        config.model.path = model.clone();
    }
    if let Some(font) = &cli.common.font {
        config.font_path = Some(font.clone());
    }
    if let Some(dir) = &cli.common.out_dir {
        config.output.dir = dir.clone();
    }

    let ui = ui::Ui::from_args(cli.common.ui.as_deref(), std::io::stderr().is_terminal());
    let stats = Arc::new(StatsAggregator::new());
    let gate = Arc::new(ModelGate::new());
    {
        let _stage = ui.stage("loading detection model");
        let settings = config.model.clone();
        gate.spawn_load(move || load_backend(&settings))?;
        match gate.wait_settled(Duration::from_secs(cli.common.model_timeout)) {
            ModelStatus::Ready => {}
            ModelStatus::Failed(reason) => return Err(anyhow!("model failed to load: {}", reason)),
            other => return Err(anyhow!("model not ready after timeout: {:?}", other)),
        }
    }

    let annotator = Arc::new(Annotator::from_font_path(config.font_path.as_deref()));
    let pipeline = FramePipeline::new(gate, stats)
        .with_annotator(annotator)
        .with_fallback_codec(config.output.fallback_codec);

    match cli.command {
        Command::Image { path, output } => run_image(&pipeline, &config, &path, output),
        Command::Video {
            path,
            codec,
            no_output,
        } => {
            let is_file = !path.starts_with("stub://") && !Path::new(&path).is_dir();
            if is_file && classify(Path::new(&path))? != MediaKind::Video {
                return Err(anyhow!("{} is an image; use the image command", path));
            }
            let source = FileSource::new(FileConfig::new(path))?;
            let output = (!no_output).then(|| {
                OutputRequest::timestamped(
                    &config.output.dir,
                    codec.unwrap_or(config.output.codec),
                    chrono::Utc::now(),
                )
            });
            let summary = run_job(&ui, pipeline, Box::new(source), output, false)?;
            report(&summary)
        }
        Command::Camera { device, record } => {
            if let Some(device) = device {
                config.camera.device = device;
            }
            let source = camera_source(&config.camera)?;
            let output = record.then(|| {
                OutputRequest::timestamped(&config.output.dir, config.output.codec, chrono::Utc::now())
            });
            let pipeline = pipeline.with_mode(PipelineMode::Interactive);
            let summary = run_job(&ui, pipeline, source, output, true)?;
            report(&summary)
        }
    }
}

fn run_image(
    pipeline: &FramePipeline,
    config: &VehicleConfig,
    path: &Path,
    output: Option<PathBuf>,
) -> Result<()> {
    if classify(path)? != MediaKind::Image {
        return Err(anyhow!("{} is a video; use the video command", path.display()));
    }
    let image = image::open(path)
        .with_context(|| format!("invalid image file {}", path.display()))?
        .to_rgb8();
    let report = pipeline.run_image(image)?;

    let output = match output {
        Some(output) => output,
        None => {
            let stem = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("image");
            std::fs::create_dir_all(&config.output.dir)?;
            config.output.dir.join(format!("{stem}_detected.jpg"))
        }
    };
    std::fs::write(&output, report.to_jpeg()?)
        .with_context(|| format!("failed to write {}", output.display()))?;
    log::info!("annotated image written to {}", output.display());

    println!("{}", serde_json::to_string_pretty(&report.response())?);
    Ok(())
}

fn run_job(
    ui: &ui::Ui,
    pipeline: FramePipeline,
    mut source: Box<dyn FrameSource>,
    output: Option<OutputRequest>,
    interactive: bool,
) -> Result<JobSummary> {
    let control = JobControl::new();
    let signal_control = control.clone();
    ctrlc::set_handler(move || signal_control.request_stop())
        .map_err(|err| anyhow!("error setting Ctrl-C handler: {}", err))?;
    if interactive {
        ui::spawn_command_reader(control.clone())?;
    }

    let worker_control = control.clone();
    let worker = std::thread::Builder::new()
        .name("pipeline".to_string())
        .spawn(move || pipeline.run(source.as_mut(), output.as_ref(), &worker_control))?;
    ui.follow(&control, worker)
}

fn report(summary: &JobSummary) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(summary)?);
    if let Some(path) = &summary.output {
        log::info!("annotated frames written to {}", path.display());
    }
    match (&summary.error, summary.is_success()) {
        (_, true) | (Some(JobError::Cancelled), _) => Ok(()),
        (Some(err), false) if summary.frames_processed > 0 => Err(anyhow!(
            "job ended after {} frames: {}",
            summary.frames_processed,
            err
        )),
        (Some(err), false) => Err(anyhow!("job failed: {}", err)),
        (None, false) => Err(anyhow!("job ended: {:?}", summary.outcome)),
    }
}
