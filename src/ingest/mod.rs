//! Frame ingestion sources.
//!
//! This module provides the sources a pipeline pulls raw frames from:
//! - Image folders, decoded on demand from a discovered path list
//! - Live cameras (V4L2 devices; feature: ingest-v4l2)
//! - Synthetic `stub://` cameras (testing)
//!
//! All sources produce `RawFrame` instances through the `FrameSource` trait.
//! The ingestion layer is responsible for:
//! - Discovering inputs without reading pixel data
//! - Decoding exactly one frame per `next_frame` call
//! - Reporting per-frame failures as errors the caller may skip
//!
//! The ingestion layer MUST NOT:
//! - Buffer decoded frames ahead of the caller
//! - Resize or normalize pixels (see `preprocess`)

pub mod discover;
pub mod file;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod v4l2;

use anyhow::Result;

use crate::frame::RawFrame;

pub use discover::{discover_image_paths, is_image_path, DiscoverOptions, IMAGE_EXTENSIONS};
pub use file::PathListSource;
pub use v4l2::{device_path_for_index, CameraConfig, CameraSource};

/// A source of raw frames.
///
/// - `Ok(Some(frame))`: the next frame.
/// - `Ok(None)`: end of input; no further frames will be produced.
/// - `Err(_)`: this read failed. The failure is local to the call; callers may
///   keep reading.
pub trait FrameSource: Send {
    /// Human-readable description for logs and events.
    fn describe(&self) -> String;

    /// Read the next frame. May block (e.g. on camera capture).
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;

    /// Release any underlying device. Called once when the producer exits.
    fn release(&mut self) {}

    /// Read statistics.
    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        (**self).next_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_read: u64,
    pub read_failures: u64,
    pub description: String,
}
