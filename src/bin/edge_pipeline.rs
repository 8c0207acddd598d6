//! edge-pipeline - stream frames from a folder or camera into a model loop
//!
//! This binary:
//! 1. Loads configuration (file, environment, then command-line flags)
//! 2. Opens the frame source (image folder or camera)
//! 3. Runs a bounded prefetching pipeline (sample → resize → normalize)
//! 4. Runs the selected inference backend on each delivered frame
//! 5. Reports FPS and memory every N frames, and a summary at exit
//!
//! Ctrl-C cancels the pipeline: the producer is woken and joined, and the
//! camera (if any) is released before the summary is printed.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;

use edge_pipeline::ingest::{CameraSource, FrameSource, PathListSource};
use edge_pipeline::ui::Ui;
use edge_pipeline::{
    BackendRegistry, BoundedPipeline, CancelToken, InferenceBackend, Metrics, PipelineAppConfig,
};

#[derive(Parser, Debug)]
#[command(
    name = "edge-pipeline",
    version,
    about = "Bounded frame pipeline for edge inference"
)]
struct Cli {
    /// UI mode for stderr status (auto|plain|pretty)
    #[arg(long, global = true, default_value = "auto", value_name = "MODE")]
    ui: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process every image in a folder, then exit
    Folder {
        /// Folder to scan for images
        #[arg(long, value_name = "PATH")]
        dir: Option<PathBuf>,
        /// Sort paths by name instead of directory order
        #[arg(long)]
        sorted: bool,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Capture from a camera until interrupted
    Camera {
        /// Camera index (/dev/videoN)
        #[arg(long)]
        index: Option<u32>,
        /// Explicit device path (overrides --index); stub:// for a synthetic camera
        #[arg(long, value_name = "PATH")]
        device: Option<String>,
        /// Requested capture width
        #[arg(long)]
        capture_width: Option<u32>,
        /// Requested capture height
        #[arg(long)]
        capture_height: Option<u32>,
        /// Requested capture rate (0 keeps the device default)
        #[arg(long)]
        capture_fps: Option<u32>,
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Preprocessed frames held in flight
    #[arg(long)]
    queue_size: Option<usize>,
    /// Keep at most this many frames per second (0 keeps every frame)
    #[arg(long)]
    fps: Option<f64>,
    /// Model input width
    #[arg(long)]
    width: Option<u32>,
    /// Model input height
    #[arg(long)]
    height: Option<u32>,
    /// Inference backend (dummy|motion)
    #[arg(long)]
    backend: Option<String>,
    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,
    /// Print a status line every N frames
    #[arg(long)]
    status_every: Option<u64>,
}

impl PipelineArgs {
    fn apply(&self, cfg: &mut PipelineAppConfig) {
        if let Some(queue_size) = self.queue_size {
            cfg.pipeline.queue_size = queue_size;
        }
        if let Some(fps) = self.fps {
            cfg.pipeline.target_fps = (fps > 0.0).then_some(fps);
        }
        if let Some(width) = self.width {
            cfg.pipeline.target_width = width;
        }
        if let Some(height) = self.height {
            cfg.pipeline.target_height = height;
        }
        if let Some(backend) = &self.backend {
            cfg.inference.backend = backend.clone();
        }
        if let Some(every) = self.status_every {
            cfg.status.every = every;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let is_tty = std::io::stderr().is_terminal();
    let ui = Ui::from_args(Some(&cli.ui), is_tty);

    let mut cfg = PipelineAppConfig::load()?;
    let pipeline_args = match &cli.command {
        Command::Folder {
            dir,
            sorted,
            pipeline,
        } => {
            if let Some(dir) = dir {
                cfg.image_dir = dir.clone();
            }
            cfg.sorted |= *sorted;
            pipeline
        }
        Command::Camera {
            index,
            device,
            capture_width,
            capture_height,
            capture_fps,
            pipeline,
        } => {
            if let Some(index) = index {
                cfg.camera.index = *index;
                cfg.camera.device = None;
            }
            if let Some(device) = device {
                cfg.camera.device = Some(device.clone());
            }
            if let Some(width) = capture_width {
                cfg.camera.width = *width;
            }
            if let Some(height) = capture_height {
                cfg.camera.height = *height;
            }
            if let Some(fps) = capture_fps {
                cfg.camera.fps = *fps;
            }
            pipeline
        }
    };
    pipeline_args.apply(&mut cfg);
    cfg.validate()?;

    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        log::info!("interrupt received, stopping pipeline");
        handler_token.cancel();
    })
    .context("install Ctrl-C handler")?;

    let mut backend = {
        let _stage = ui.stage("Load inference backend");
        let mut registry = BackendRegistry::with_builtin(cfg.inference.latency);
        let mut backend = registry.take(&cfg.inference.backend)?;
        backend.warm_up()?;
        backend
    };

    let source: Box<dyn FrameSource> = match &cli.command {
        Command::Folder { .. } => {
            let _stage = ui.stage("Discover images");
            let source = PathListSource::from_folder(&cfg.image_dir, cfg.discover_options())?;
            if source.is_empty() {
                log::warn!("no images found in {}", cfg.image_dir.display());
            } else {
                log::info!("{} image(s) in {}", source.len(), cfg.image_dir.display());
            }
            Box::new(source)
        }
        Command::Camera { .. } => {
            let _stage = ui.stage("Open camera");
            Box::new(CameraSource::open(cfg.camera_config())?)
        }
    };

    run(&cfg, &ui, source, backend.as_mut(), cancel, pipeline_args.max_frames)
}

fn run(
    cfg: &PipelineAppConfig,
    ui: &Ui,
    source: Box<dyn FrameSource>,
    backend: &mut dyn InferenceBackend,
    cancel: CancelToken,
    max_frames: Option<u64>,
) -> Result<()> {
    let mut pipeline = BoundedPipeline::new(cfg.pipeline_config())?.with_cancel_token(cancel.clone());
    pipeline.start(source)?;

    let mut metrics = Metrics::new(cfg.status.memory_scope);
    let status = ui.status_line(cfg.status.every);
    metrics.start();

    log::info!("running {} backend", backend.name());
    while let Some(frame) = pipeline.next_frame() {
        let prediction = match backend.infer(&frame) {
            Ok(prediction) => Some(prediction),
            Err(err) => {
                log::warn!("inference on frame {} failed: {:#}", frame.sequence, err);
                None
            }
        };
        drop(frame);

        let frames = metrics.record_frame();
        if status.due(frames) {
            let snapshot = metrics.snapshot();
            status.report(&snapshot, prediction.as_ref());
        }
        if max_frames.is_some_and(|max| frames >= max) {
            log::info!("reached --max-frames {}, stopping", frames);
            break;
        }
    }

    let interrupted = cancel.is_cancelled();
    let summary = pipeline.close()?;
    let snapshot = metrics.snapshot();
    if interrupted {
        log::info!("interrupted after {} frame(s)", snapshot.frames);
    }
    status.finish(&snapshot, &summary);

    match summary.failure {
        Some(failure) => Err(anyhow!("pipeline ended abnormally: {}", failure)),
        None => Ok(()),
    }
}
