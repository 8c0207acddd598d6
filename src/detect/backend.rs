use anyhow::Result;

use super::prediction::Prediction;
use crate::frame::ProcessedFrame;

/// Model backend trait.
///
/// Backends run on the consumer thread, one frame at a time, in delivery
/// order. They borrow the frame and must not keep references to its samples
/// past the `infer` call.
pub trait InferenceBackend: Send {
    /// Backend identifier, used for registry lookup.
    fn name(&self) -> &'static str;

    /// Run inference on a model-ready frame.
    fn infer(&mut self, frame: &ProcessedFrame) -> Result<Prediction>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
