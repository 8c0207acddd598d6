use anyhow::Result;
use sha2::{Digest, Sha256};
use std::time::Instant;

use crate::detect::backend::InferenceBackend;
use crate::detect::prediction::Prediction;
use crate::frame::ProcessedFrame;

/// Score reported when consecutive frames differ.
const MOTION_SCORE: f32 = 0.85;

/// Frame-difference detector. Flags motion when a frame's digest differs from
/// the previous frame's.
#[derive(Default)]
pub struct MotionBackend {
    last_hash: Option<[u8; 32]>,
}

impl MotionBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InferenceBackend for MotionBackend {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn infer(&mut self, frame: &ProcessedFrame) -> Result<Prediction> {
        let started = Instant::now();
        let mut hasher = Sha256::new();
        for sample in frame.samples() {
            hasher.update(sample.to_le_bytes());
        }
        let current_hash: [u8; 32] = hasher.finalize().into();

        let motion = self.last_hash.is_some_and(|prev| prev != current_hash);
        self.last_hash = Some(current_hash);

        Ok(Prediction {
            score: if motion { MOTION_SCORE } else { 0.0 },
            motion_detected: motion,
            latency: started.elapsed(),
        })
    }
}
