//! Frame types that flow through the pipeline.
//!
//! - `RawFrame`: a decoded 8-bit image (height × width × channels, interleaved).
//! - `ProcessedFrame`: a resized, normalized `f32` tensor ready for a model.
//!
//! Neither type implements `Clone`. A frame is owned by the stage that last
//! produced it and moves to the next stage; nothing aliases it across the
//! producer/consumer boundary.

use anyhow::{anyhow, Result};
use std::time::Instant;

/// Dimensions of an interleaved frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameShape {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl FrameShape {
    pub fn new(width: u32, height: u32, channels: u8) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }

    /// Number of samples (`width * height * channels`), or `None` on overflow.
    pub fn sample_count(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(self.channels as usize))
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.channels == 0
    }

    fn expect_len(&self, actual: usize, what: &str) -> Result<()> {
        if self.is_empty() {
            return Err(anyhow!(
                "{} has empty shape {}x{}x{}",
                what,
                self.width,
                self.height,
                self.channels
            ));
        }
        let expected = self
            .sample_count()
            .ok_or_else(|| anyhow!("{} dimensions overflow", what))?;
        if actual != expected {
            return Err(anyhow!(
                "{} length mismatch: expected {}, got {}",
                what,
                expected,
                actual
            ));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// RawFrame: decoded 8-bit image
// ----------------------------------------------------------------------------

/// Decoded image as produced by a `FrameSource`.
pub struct RawFrame {
    data: Vec<u8>,

    pub width: u32,
    pub height: u32,
    pub channels: u8,

    /// Position of this frame in its source (path index or capture count).
    pub sequence: u64,

    /// Monotonic capture instant, carried through preprocessing for latency.
    capture_instant: Instant,
}

impl RawFrame {
    /// Wrap interleaved samples. Fails when the buffer does not match the shape.
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, sequence: u64) -> Result<Self> {
        FrameShape::new(width, height, channels).expect_len(data.len(), "raw frame")?;
        Ok(Self {
            data,
            width,
            height,
            channels,
            sequence,
            capture_instant: Instant::now(),
        })
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape::new(self.width, self.height, self.channels)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Give up ownership of the sample buffer.
    pub fn into_pixels(self) -> Vec<u8> {
        self.data
    }

    pub fn captured_at(&self) -> Instant {
        self.capture_instant
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// ProcessedFrame: model-ready tensor
// ----------------------------------------------------------------------------

/// Resized, normalized frame. Samples are `f32` in `[0, 1]`, laid out H×W×C.
pub struct ProcessedFrame {
    data: Vec<f32>,

    pub width: u32,
    pub height: u32,
    pub channels: u8,

    /// Sequence number of the `RawFrame` this was produced from.
    pub sequence: u64,

    capture_instant: Instant,
}

impl ProcessedFrame {
    pub(crate) fn new(
        data: Vec<f32>,
        shape: FrameShape,
        sequence: u64,
        capture_instant: Instant,
    ) -> Result<Self> {
        shape.expect_len(data.len(), "processed frame")?;
        Ok(Self {
            data,
            width: shape.width,
            height: shape.height,
            channels: shape.channels,
            sequence,
            capture_instant,
        })
    }

    pub fn shape(&self) -> FrameShape {
        FrameShape::new(self.width, self.height, self.channels)
    }

    pub fn samples(&self) -> &[f32] {
        &self.data
    }

    /// Sample at column `x`, row `y`, channel `c`.
    pub fn get(&self, x: u32, y: u32, c: u8) -> Option<f32> {
        if x >= self.width || y >= self.height || c >= self.channels {
            return None;
        }
        let idx = ((y as usize * self.width as usize) + x as usize) * self.channels as usize
            + c as usize;
        self.data.get(idx).copied()
    }

    /// Planar C×H×W copy of the samples.
    ///
    /// Most vision models take NCHW input; the pipeline keeps the interleaved
    /// layout and converts on demand.
    pub fn to_chw(&self) -> Vec<f32> {
        let plane = self.width as usize * self.height as usize;
        let channels = self.channels as usize;
        let mut out = vec![0.0f32; self.data.len()];
        for (pixel, chunk) in self.data.chunks_exact(channels).enumerate() {
            for (c, &value) in chunk.iter().enumerate() {
                out[c * plane + pixel] = value;
            }
        }
        out
    }

    /// Mean of all samples (0.0 for an empty tensor).
    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.data.iter().map(|&v| v as f64).sum();
        (sum / self.data.len() as f64) as f32
    }

    /// When the source frame was captured.
    pub fn captured_at(&self) -> Instant {
        self.capture_instant
    }
}

impl std::fmt::Debug for ProcessedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("channels", &self.channels)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_frame_rejects_length_mismatch() {
        assert!(RawFrame::new(vec![0u8; 11], 2, 2, 3, 0).is_err());
        assert!(RawFrame::new(vec![0u8; 12], 2, 2, 3, 0).is_ok());
    }

    #[test]
    fn raw_frame_rejects_empty_shape() {
        assert!(RawFrame::new(Vec::new(), 0, 4, 3, 0).is_err());
        assert!(RawFrame::new(Vec::new(), 4, 4, 0, 0).is_err());
    }

    #[test]
    fn chw_layout_groups_channels() -> Result<()> {
        // 2x1 RGB: pixel0 = (1,2,3), pixel1 = (4,5,6)
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let frame = ProcessedFrame::new(data, FrameShape::new(2, 1, 3), 0, Instant::now())?;
        assert_eq!(frame.to_chw(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(frame.get(1, 0, 2), Some(6.0));
        assert_eq!(frame.get(2, 0, 0), None);
        Ok(())
    }

    #[test]
    fn mean_of_samples() -> Result<()> {
        let frame = ProcessedFrame::new(
            vec![0.0, 0.5, 1.0, 0.5],
            FrameShape::new(2, 2, 1),
            3,
            Instant::now(),
        )?;
        assert!((frame.mean() - 0.5).abs() < 1e-6);
        assert_eq!(frame.sequence, 3);
        Ok(())
    }
}
