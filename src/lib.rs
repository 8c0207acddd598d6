//! Edge Frame Pipeline
//!
//! Streams frames from an image folder or a live camera into an inference
//! loop on a resource-constrained device, without holding the whole input in
//! memory.
//!
//! # Architecture
//!
//! The pipeline keeps three guarantees:
//!
//! 1. **Bounded memory**: at most `queue_size` preprocessed frames are in
//!    flight; a producer facing a slow consumer blocks.
//! 2. **Source order**: frames are delivered in the order the source
//!    produced them, minus frames that failed or were sampled out.
//! 3. **Clean termination**: the consumer always observes end of stream,
//!    including when the source fails or panics, and `close()` always joins
//!    the producer thread.
//!
//! # Module Structure
//!
//! - `frame`: Raw and model-ready frame types
//! - `ingest`: Frame sources (image folders, V4L2 cameras)
//! - `sampler`: Time-based frame-rate limiting
//! - `preprocess`: Resize and normalize to `f32` in [0, 1]
//! - `pipeline`: Bounded producer/consumer pipeline with cancellation
//! - `metrics`: FPS and memory sampling
//! - `detect`: Inference backend trait and stand-in backends
//! - `config`, `ui`: Binary configuration and console output

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod preprocess;
pub mod sampler;
pub mod ui;

pub use config::PipelineAppConfig;
pub use detect::{BackendRegistry, DummyBackend, InferenceBackend, MotionBackend, Prediction};
pub use frame::{FrameShape, ProcessedFrame, RawFrame};
pub use ingest::{
    discover_image_paths, CameraConfig, CameraSource, DiscoverOptions, FrameSource,
    PathListSource, SourceStats,
};
pub use metrics::{MemoryScope, Metrics, MetricsSnapshot};
pub use pipeline::{
    BoundedPipeline, CancelToken, PipelineConfig, PipelineEvent, PipelineState, ProducerSummary,
};
pub use preprocess::{preprocess, Preprocessor};
pub use sampler::RateSampler;
