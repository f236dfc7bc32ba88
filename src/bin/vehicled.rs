//! vehicled - vehicle detection daemon
//!
//! This daemon:
//! 1. Loads the detection model in the background
//! 2. Serves the read-only dashboard API (/health, /stats, /history, /model)
//! 3. Optionally runs a live camera job with the statistics overlay
//!
//! Without `--live` nothing feeds the statistics: /stats and /history stay
//! empty and only /model is informative. Images and videos are processed by
//! `vehicle_detect`, which keeps its own in-process statistics.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use vehicle_watch::{
    api::{ApiConfig, ApiServer},
    ingest::camera_source,
    load_backend, ui, Annotator, Dashboard, FramePipeline, JobControl, ModelGate, ModelStatus,
    OutputRequest, PipelineMode, StatsAggregator, VehicleConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Run a live camera job alongside the API.
    #[arg(long)]
    live: bool,
    /// Write annotated live frames under the output directory.
    #[arg(long, requires = "live")]
    record: bool,
    /// Seconds to wait for the model before starting the live job.
    #[arg(long, default_value_t = 120)]
    model_timeout: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = VehicleConfig::load()?;

    let stats = Arc::new(StatsAggregator::new());
    let gate = Arc::new(ModelGate::new());
    let model_settings = config.model.clone();
    gate.spawn_load(move || load_backend(&model_settings))?;

    let api_handle = ApiServer::new(
        ApiConfig {
            addr: config.api_addr.clone(),
        },
        Dashboard::new(Arc::clone(&stats)),
        Arc::clone(&gate),
    )
    .spawn()?;

    let (tx, rx) = mpsc::channel();
    let control = JobControl::new();
    let signal_control = control.clone();
    ctrlc::set_handler(move || {
        signal_control.request_stop();
        let _ = tx.send(());
    })
    .map_err(|err| anyhow!("error setting Ctrl-C handler: {}", err))?;

    if args.live {
        let status = gate.wait_settled(Duration::from_secs(args.model_timeout));
        if status != ModelStatus::Ready {
            api_handle.stop()?;
            return Err(anyhow!("model not ready for live job: {:?}", status));
        }

        let annotator = Annotator::from_font_path(config.font_path.as_deref());
        let pipeline = FramePipeline::new(Arc::clone(&gate), Arc::clone(&stats))
            .with_annotator(Arc::new(annotator))
            .with_fallback_codec(config.output.fallback_codec)
            .with_mode(PipelineMode::Interactive);
        let output = args.record.then(|| {
            OutputRequest::timestamped(&config.output.dir, config.output.codec, chrono::Utc::now())
        });

        let mut source = camera_source(&config.camera)?;
        ui::spawn_command_reader(control.clone())?;
        log::info!("live job running on {}", config.camera.device);
        let summary = pipeline.run(source.as_mut(), output.as_ref(), &control);
        log::info!(
            "live job ended: {:?}, {} frames, {} vehicles",
            summary.outcome,
            summary.frames_processed,
            summary.total_detections
        );
        if let Some(path) = summary.output.as_ref().map(PathBuf::as_path) {
            log::info!("annotated frames written to {}", path.display());
        }
    } else {
        log::info!("no live job; dashboard only reports model readiness");
        log::info!("vehicled running; waiting for shutdown signal (Ctrl-C)...");
        let _ = rx.recv();
    }

    log::info!("shutting down, stopping API server...");
    api_handle.stop()?;
    Ok(())
}
