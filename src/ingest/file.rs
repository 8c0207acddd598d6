//! Image folder frame source.
//!
//! This module provides `PathListSource` for ingesting still images from a
//! predetermined, ordered list of paths. The source is responsible for:
//! - Decoding one image per `next_frame` call, in list order
//! - Converting decoded images to interleaved RGB
//! - Reporting undecodable files as per-call errors
//!
//! The source MUST NOT:
//! - Decode ahead of the caller
//! - Stop at the first unreadable file

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::discover::{discover_image_paths, DiscoverOptions};
use super::{FrameSource, SourceStats};
use crate::frame::RawFrame;

/// Sequential read-on-demand source over a fixed path list.
pub struct PathListSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    frames_read: u64,
    read_failures: u64,
}

impl PathListSource {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            cursor: 0,
            frames_read: 0,
            read_failures: 0,
        }
    }

    /// Discover images in `folder` and read them in discovery order.
    pub fn from_folder(folder: impl AsRef<Path>, options: DiscoverOptions) -> Result<Self> {
        Ok(Self::new(discover_image_paths(folder, options)?))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for PathListSource {
    fn describe(&self) -> String {
        format!("path list ({} images)", self.paths.len())
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };
        let sequence = self.cursor as u64;
        // Advance first so a bad file is skipped on the next call.
        self.cursor += 1;

        match read_image(path, sequence) {
            Ok(frame) => {
                self.frames_read += 1;
                Ok(Some(frame))
            }
            Err(err) => {
                self.read_failures += 1;
                Err(err)
            }
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_read: self.frames_read,
            read_failures: self.read_failures,
            description: self.describe(),
        }
    }
}

/// Decode a single image file into an RGB `RawFrame`.
pub fn read_image(path: &Path, sequence: u64) -> Result<RawFrame> {
    let image = image::open(path).with_context(|| format!("decode image {}", path.display()))?;
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    RawFrame::new(rgb.into_raw(), width, height, 3, sequence)
        .with_context(|| format!("wrap decoded image {}", path.display()))
}
