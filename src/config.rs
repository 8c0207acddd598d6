use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::detect::DEFAULT_DUMMY_LATENCY;
use crate::ingest::{device_path_for_index, CameraConfig, DiscoverOptions};
use crate::metrics::MemoryScope;
use crate::pipeline::{PipelineConfig, DEFAULT_QUEUE_SIZE};
use crate::preprocess::DEFAULT_TARGET_SIZE;

const DEFAULT_IMAGE_DIR: &str = "data/images";
const DEFAULT_CAMERA_INDEX: u32 = 0;
const DEFAULT_CAPTURE_WIDTH: u32 = 640;
const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
const DEFAULT_CAPTURE_FPS: u32 = 30;
const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 30;
const DEFAULT_BACKEND: &str = "dummy";
const DEFAULT_STATUS_EVERY: u64 = 10;

#[derive(Debug, Deserialize, Default)]
struct PipelineAppConfigFile {
    image_dir: Option<PathBuf>,
    sorted: Option<bool>,
    pipeline: Option<PipelineConfigFile>,
    camera: Option<CameraConfigFile>,
    inference: Option<InferenceConfigFile>,
    status: Option<StatusConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    queue_size: Option<usize>,
    target_width: Option<u32>,
    target_height: Option<u32>,
    target_fps: Option<f64>,
    max_consecutive_failures: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    index: Option<u32>,
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct InferenceConfigFile {
    backend: Option<String>,
    latency_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct StatusConfigFile {
    every: Option<u64>,
    memory_scope: Option<MemoryScope>,
}

/// Settings for the `edge-pipeline` binary: defaults, then an optional
/// config file (`EDGE_PIPELINE_CONFIG`), then `EDGE_*` environment overrides.
#[derive(Debug, Clone)]
pub struct PipelineAppConfig {
    pub image_dir: PathBuf,
    pub sorted: bool,
    pub pipeline: PipelineSettings,
    pub camera: CameraSettings,
    pub inference: InferenceSettings,
    pub status: StatusSettings,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub queue_size: usize,
    pub target_width: u32,
    pub target_height: u32,
    /// `None` keeps every frame.
    pub target_fps: Option<f64>,
    pub max_consecutive_failures: u32,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub index: u32,
    /// Explicit device path; wins over `index` when set.
    pub device: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

#[derive(Debug, Clone)]
pub struct InferenceSettings {
    pub backend: String,
    pub latency: Duration,
}

#[derive(Debug, Clone)]
pub struct StatusSettings {
    /// Print a status line every N frames.
    pub every: u64,
    pub memory_scope: MemoryScope,
}

impl PipelineAppConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("EDGE_PIPELINE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineAppConfigFile) -> Self {
        let pipeline = file.pipeline.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let inference = file.inference.unwrap_or_default();
        let status = file.status.unwrap_or_default();

        Self {
            image_dir: file
                .image_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE_DIR)),
            sorted: file.sorted.unwrap_or(false),
            pipeline: PipelineSettings {
                queue_size: pipeline.queue_size.unwrap_or(DEFAULT_QUEUE_SIZE),
                target_width: pipeline.target_width.unwrap_or(DEFAULT_TARGET_SIZE.0),
                target_height: pipeline.target_height.unwrap_or(DEFAULT_TARGET_SIZE.1),
                target_fps: pipeline.target_fps,
                max_consecutive_failures: pipeline
                    .max_consecutive_failures
                    .unwrap_or(DEFAULT_MAX_CONSECUTIVE_FAILURES),
            },
            camera: CameraSettings {
                index: camera.index.unwrap_or(DEFAULT_CAMERA_INDEX),
                device: camera.device,
                width: camera.width.unwrap_or(DEFAULT_CAPTURE_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAPTURE_HEIGHT),
                fps: camera.fps.unwrap_or(DEFAULT_CAPTURE_FPS),
            },
            inference: InferenceSettings {
                backend: inference
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                latency: inference
                    .latency_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_DUMMY_LATENCY),
            },
            status: StatusSettings {
                every: status.every.unwrap_or(DEFAULT_STATUS_EVERY),
                memory_scope: status.memory_scope.unwrap_or_default(),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("EDGE_IMAGE_DIR") {
            if !dir.trim().is_empty() {
                self.image_dir = PathBuf::from(dir);
            }
        }
        if let Some(queue_size) = env_number("EDGE_QUEUE_SIZE")? {
            self.pipeline.queue_size = queue_size;
        }
        if let Some(fps) = env_number::<f64>("EDGE_TARGET_FPS")? {
            // A non-positive rate disables sampling.
            self.pipeline.target_fps = (fps > 0.0).then_some(fps);
        }
        if let Some(width) = env_number("EDGE_TARGET_WIDTH")? {
            self.pipeline.target_width = width;
        }
        if let Some(height) = env_number("EDGE_TARGET_HEIGHT")? {
            self.pipeline.target_height = height;
        }
        if let Some(index) = env_number("EDGE_CAMERA_INDEX")? {
            self.camera.index = index;
        }
        if let Ok(device) = std::env::var("EDGE_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = Some(device);
            }
        }
        if let Ok(backend) = std::env::var("EDGE_BACKEND") {
            if !backend.trim().is_empty() {
                self.inference.backend = backend.trim().to_string();
            }
        }
        if let Some(every) = env_number("EDGE_STATUS_EVERY")? {
            self.status.every = every;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.pipeline_config().validate()?;
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if self.status.every == 0 {
            return Err(anyhow!("status.every must be greater than zero"));
        }
        if self.inference.backend.trim().is_empty() {
            return Err(anyhow!("inference backend must not be empty"));
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            queue_size: self.pipeline.queue_size,
            target_size: (self.pipeline.target_width, self.pipeline.target_height),
            target_fps: self.pipeline.target_fps,
            max_consecutive_failures: self.pipeline.max_consecutive_failures,
        }
    }

    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            device: self
                .camera
                .device
                .clone()
                .unwrap_or_else(|| device_path_for_index(self.camera.index)),
            width: self.camera.width,
            height: self.camera.height,
            fps: self.camera.fps,
        }
    }

    pub fn discover_options(&self) -> DiscoverOptions {
        DiscoverOptions {
            sorted: self.sorted,
        }
    }
}

impl Default for PipelineAppConfig {
    fn default() -> Self {
        Self::from_file(PipelineAppConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<PipelineAppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_number<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a number, got '{}'", name, value)),
        _ => Ok(None),
    }
}
