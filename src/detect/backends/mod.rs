pub mod dummy;
pub mod motion;

pub use dummy::{DummyBackend, DEFAULT_DUMMY_LATENCY};
pub use motion::MotionBackend;
