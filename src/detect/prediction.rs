use std::time::Duration;

/// Output of one `InferenceBackend::infer` call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Prediction {
    /// Backend-defined score in [0, 1].
    pub score: f32,
    /// Frame content changed since the previous frame.
    pub motion_detected: bool,
    /// Wall time spent inside `infer`.
    pub latency: Duration,
}
