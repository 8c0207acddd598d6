//! Live camera frame source.
//!
//! This module provides `CameraSource` for capturing frames from a local
//! camera. The camera source is responsible for:
//! - Opening the device at construction (an unavailable camera is fatal)
//! - Requesting the configured capture resolution and rate
//! - Blocking on capture, one frame per `next_frame` call
//! - Converting device pixel formats to interleaved RGB
//! - Releasing the device explicitly or on drop
//!
//! A live camera never reports end of input. Capture failures (e.g. a
//! disconnected device) are per-call errors; the caller decides whether to
//! retry.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

#[cfg(feature = "ingest-v4l2")]
use anyhow::Context;
#[cfg(feature = "ingest-v4l2")]
use ouroboros::self_referencing;

#[cfg(feature = "ingest-v4l2")]
use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{FrameSource, SourceStats};
use crate::frame::RawFrame;

/// Configuration for a camera source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0"), or "stub://<name>" for a synthetic camera.
    pub device: String,
    /// Requested capture width.
    pub width: u32,
    /// Requested capture height.
    pub height: u32,
    /// Requested capture rate. 0 leaves the device default; synthetic cameras
    /// are then unpaced.
    pub fps: u32,
}

impl CameraConfig {
    /// Camera addressed by its integer index.
    pub fn from_index(index: u32, width: u32, height: u32) -> Self {
        Self {
            device: device_path_for_index(index),
            width,
            height,
            ..Self::default()
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: device_path_for_index(0),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

pub fn device_path_for_index(index: u32) -> String {
    format!("/dev/video{}", index)
}

/// Camera frame source.
///
/// Uses V4L2 for real devices, with a synthetic fallback for `stub://` paths.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceCamera),
}

impl CameraSource {
    /// Open the camera described by `config`.
    ///
    /// Returns an error when the device cannot be opened. There is no retry.
    pub fn open(config: CameraConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!(
                "camera resolution must be non-zero (got {}x{})",
                config.width,
                config.height
            ));
        }
        if config.device.starts_with("stub://") {
            Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::open(config)),
            })
        } else {
            #[cfg(feature = "ingest-v4l2")]
            {
                Ok(Self {
                    backend: CameraBackend::Device(DeviceCamera::open(config)?),
                })
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                Err(anyhow!(
                    "could not open camera {}: capture requires the ingest-v4l2 feature",
                    config.device
                ))
            }
        }
    }

    pub fn is_released(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(camera) => camera.released,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.state.is_none(),
        }
    }

    pub fn config(&self) -> &CameraConfig {
        match &self.backend {
            CameraBackend::Synthetic(camera) => &camera.config,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => &camera.config,
        }
    }
}

impl FrameSource for CameraSource {
    fn describe(&self) -> String {
        format!("camera {}", self.config().device)
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let frame = match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.next_frame()?,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.next_frame()?,
        };
        Ok(Some(frame))
    }

    fn release(&mut self) {
        match &mut self.backend {
            CameraBackend::Synthetic(camera) => camera.release(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => camera.release(),
        }
    }

    fn stats(&self) -> SourceStats {
        let (frames_read, read_failures) = match &self.backend {
            CameraBackend::Synthetic(camera) => (camera.frame_count, 0),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(camera) => (camera.frame_count, camera.read_failures),
        };
        SourceStats {
            frames_read,
            read_failures,
            description: self.describe(),
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.release();
    }
}

// ----------------------------------------------------------------------------
// Synthetic camera (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticCamera {
    config: CameraConfig,
    frame_count: u64,
    /// Simulated scene state; changes every 50 frames.
    scene_state: u8,
    last_frame_at: Option<Instant>,
    released: bool,
}

impl SyntheticCamera {
    fn open(config: CameraConfig) -> Self {
        log::info!(
            "CameraSource: opened {} ({}x{}, synthetic)",
            config.device,
            config.width,
            config.height
        );
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
            last_frame_at: None,
            released: false,
        }
    }

    fn next_frame(&mut self) -> Result<RawFrame> {
        if self.released {
            return Err(anyhow!("camera {} has been released", self.config.device));
        }
        self.pace();

        let sequence = self.frame_count;
        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels();
        RawFrame::new(pixels, self.config.width, self.config.height, 3, sequence)
    }

    /// Emulate a device delivering frames at `config.fps`.
    fn pace(&mut self) {
        if self.config.fps > 0 {
            let interval = Duration::from_secs(1) / self.config.fps;
            if let Some(last) = self.last_frame_at {
                let elapsed = last.elapsed();
                if elapsed < interval {
                    std::thread::sleep(interval - elapsed);
                }
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    fn generate_synthetic_pixels(&mut self) -> Vec<u8> {
        let pixel_count = self.config.width as usize * self.config.height as usize * 3;
        if self.frame_count.is_multiple_of(50) {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            log::info!("CameraSource: released {}", self.config.device);
        }
    }
}

// ----------------------------------------------------------------------------
// V4L2 camera
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
struct DeviceCamera {
    config: CameraConfig,
    state: Option<DeviceState>,
    format: PixelFormat,
    frame_count: u64,
    read_failures: u64,
    active_width: u32,
    active_height: u32,
}

#[cfg(feature = "ingest-v4l2")]
#[self_referencing]
struct DeviceState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

#[cfg(feature = "ingest-v4l2")]
impl DeviceCamera {
    fn open(config: CameraConfig) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&config.device)
            .with_context(|| format!("open camera {}", config.device))?;
        let mut format = device.format().context("read camera format")?;
        format.width = config.width;
        format.height = config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "CameraSource: failed to set format on {}: {}",
                    config.device,
                    err
                );
                device
                    .format()
                    .context("read camera format after set failure")?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "camera {} delivers unsupported pixel format {}",
                config.device,
                format.fourcc
            )
        })?;

        if config.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(config.fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "CameraSource: failed to set fps on {}: {}",
                    config.device,
                    err
                );
            }
        }

        let state = DeviceStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create camera buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "CameraSource: opened {} ({}x{} {:?})",
            config.device,
            format.width,
            format.height,
            pixel_format
        );

        Ok(Self {
            active_width: format.width,
            active_height: format.height,
            config,
            state: Some(state),
            format: pixel_format,
            frame_count: 0,
            read_failures: 0,
        })
    }

    fn next_frame(&mut self) -> Result<RawFrame> {
        use v4l::io::traits::CaptureStream;

        let (width, height, format) = (self.active_width, self.active_height, self.format);
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| anyhow!("camera {} has been released", self.config.device))?;

        let captured = state.with_mut(|fields| -> Result<Vec<u8>> {
            let (buf, meta) = fields.stream.next().context("capture camera frame")?;
            let used = meta.bytesused as usize;
            let end = if used == 0 || used > buf.len() {
                buf.len()
            } else {
                used
            };
            normalize_to_rgb(&buf[..end], width, height, format)
        });

        let pixels = match captured {
            Ok(pixels) => pixels,
            Err(err) => {
                self.read_failures += 1;
                return Err(err);
            }
        };

        let sequence = self.frame_count;
        self.frame_count += 1;
        RawFrame::new(pixels, width, height, 3, sequence)
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!("CameraSource: released {}", self.config.device);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
