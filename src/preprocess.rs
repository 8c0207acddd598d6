//! Raw frame → model-ready tensor.
//!
//! The steps run in a fixed order: resize on 8-bit data (bilinear), convert to
//! `f32`, scale by 1/255. Normalizing before resizing interpolates over a
//! different numeric range and is not equivalent.

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, LumaA, Pixel, Rgb, Rgba};

use crate::frame::{FrameShape, ProcessedFrame, RawFrame};

/// Default model input size (width, height).
pub const DEFAULT_TARGET_SIZE: (u32, u32) = (224, 224);

const INV_255: f32 = 1.0 / 255.0;

/// Preprocessing parameters bound to one target size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Result<Self> {
        if target_width == 0 || target_height == 0 {
            return Err(anyhow!(
                "target size must be non-zero (got {}x{})",
                target_width,
                target_height
            ));
        }
        Ok(Self {
            target_width,
            target_height,
        })
    }

    /// Target size as (width, height).
    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    pub fn process(&self, frame: RawFrame) -> Result<ProcessedFrame> {
        preprocess(frame, self.target_size())
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_TARGET_SIZE.0,
            target_height: DEFAULT_TARGET_SIZE.1,
        }
    }
}

/// Resize `frame` to `target_size` (width, height) and normalize to `[0, 1]`.
pub fn preprocess(frame: RawFrame, target_size: (u32, u32)) -> Result<ProcessedFrame> {
    let (target_width, target_height) = target_size;
    if target_width == 0 || target_height == 0 {
        return Err(anyhow!(
            "target size must be non-zero (got {}x{})",
            target_width,
            target_height
        ));
    }

    let shape = frame.shape();
    if shape.is_empty() {
        return Err(anyhow!(
            "frame {} is empty ({}x{}x{})",
            frame.sequence,
            shape.width,
            shape.height,
            shape.channels
        ));
    }
    let sequence = frame.sequence;
    let captured_at = frame.captured_at();

    // 1. resize on u8 samples
    let resized = resize_u8(frame.into_pixels(), shape, target_width, target_height)
        .with_context(|| format!("resize frame {}", sequence))?;

    // 2 + 3. widen to f32 and scale into [0, 1]
    let samples: Vec<f32> = resized.into_iter().map(|v| v as f32 * INV_255).collect();

    ProcessedFrame::new(
        samples,
        FrameShape::new(target_width, target_height, shape.channels),
        sequence,
        captured_at,
    )
}

fn resize_u8(pixels: Vec<u8>, shape: FrameShape, width: u32, height: u32) -> Result<Vec<u8>> {
    if !(1..=4).contains(&shape.channels) {
        return Err(anyhow!("unsupported channel count {}", shape.channels));
    }
    if shape.width == width && shape.height == height {
        return Ok(pixels);
    }
    match shape.channels {
        1 => resize_as::<Luma<u8>>(pixels, shape, width, height),
        2 => resize_as::<LumaA<u8>>(pixels, shape, width, height),
        3 => resize_as::<Rgb<u8>>(pixels, shape, width, height),
        4 => resize_as::<Rgba<u8>>(pixels, shape, width, height),
        other => Err(anyhow!("unsupported channel count {}", other)),
    }
}

fn resize_as<P>(pixels: Vec<u8>, shape: FrameShape, width: u32, height: u32) -> Result<Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let source = ImageBuffer::<P, Vec<u8>>::from_raw(shape.width, shape.height, pixels)
        .ok_or_else(|| anyhow!("pixel buffer does not match {}x{}", shape.width, shape.height))?;
    Ok(imageops::resize(&source, width, height, FilterType::Triangle).into_raw())
}
