//! Inference stand-ins run by the consumer on each processed frame.

mod backend;
mod backends;
mod prediction;
mod registry;

pub use backend::InferenceBackend;
pub use backends::{DummyBackend, MotionBackend, DEFAULT_DUMMY_LATENCY};
pub use prediction::Prediction;
pub use registry::BackendRegistry;
