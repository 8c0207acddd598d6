use anyhow::Result;
use std::time::{Duration, Instant};

use crate::detect::backend::InferenceBackend;
use crate::detect::prediction::Prediction;
use crate::frame::ProcessedFrame;

/// Simulated model latency.
pub const DEFAULT_DUMMY_LATENCY: Duration = Duration::from_millis(30);

/// Placeholder model: sleeps for a fixed latency and scores the frame by its
/// mean sample value.
pub struct DummyBackend {
    latency: Duration,
}

impl DummyBackend {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new(DEFAULT_DUMMY_LATENCY)
    }
}

impl InferenceBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "dummy"
    }

    fn infer(&mut self, frame: &ProcessedFrame) -> Result<Prediction> {
        let started = Instant::now();
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        Ok(Prediction {
            score: frame.mean(),
            motion_detected: false,
            latency: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RawFrame;
    use crate::preprocess::preprocess;

    #[test]
    fn scores_by_mean_after_latency() -> Result<()> {
        let raw = RawFrame::new(vec![255u8; 2 * 2 * 3], 2, 2, 3, 0)?;
        let frame = preprocess(raw, (2, 2))?;
        let mut backend = DummyBackend::new(Duration::from_millis(10));

        let prediction = backend.infer(&frame)?;
        assert!((prediction.score - 1.0).abs() < 1e-6);
        assert!(prediction.latency >= Duration::from_millis(10));
        assert!(!prediction.motion_detected);
        Ok(())
    }
}
