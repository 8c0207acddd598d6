//! Bounded producer/consumer frame pipeline.
//!
//! One background producer thread reads frames from a `FrameSource`, samples
//! them, preprocesses them, and pushes them through a fixed-capacity channel.
//! The caller is the single consumer and pulls frames lazily.
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────────────┐   ┌────────────┐   ┌──────────┐
//! │ FrameSource  │──▶│ producer thread          │──▶│  bounded   │──▶│ consumer │
//! │ (file/camera)│   │ read → sample → resize/  │   │  channel   │   │ (caller) │
//! └──────────────┘   │ normalize → enqueue      │   │ (k slots)  │   └──────────┘
//!                    └──────────────────────────┘   └────────────┘
//! ```
//!
//! - Enqueue blocks while the channel is full (backpressure): at most
//!   `queue_size` processed frames are in flight.
//! - Dequeue blocks while the channel is empty and the producer is running.
//! - Both blocking points also wake on cancellation.
//! - Delivery order equals source order (one producer, one FIFO).
//! - Per-frame failures are skipped and reported as `PipelineEvent`s.
//! - The producer always ends the stream, including when the source panics.
//!
//! Sampling happens on the producer after a frame is read and before it is
//! preprocessed, so dropped frames cost a read but no resize and no slot.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::frame::ProcessedFrame;
use crate::ingest::FrameSource;
use crate::preprocess::{Preprocessor, DEFAULT_TARGET_SIZE};
use crate::sampler::RateSampler;

/// Default channel capacity.
pub const DEFAULT_QUEUE_SIZE: usize = 4;

// ----------------------------------------------------------------------------
// Configuration and state
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Channel capacity (processed frames in flight). Must be at least 1.
    pub queue_size: usize,
    /// Model input size (width, height).
    pub target_size: (u32, u32),
    /// Keep at most this many frames per second. `None` keeps every frame.
    pub target_fps: Option<f64>,
    /// End the stream after this many consecutive read failures.
    /// 0 never gives up.
    pub max_consecutive_failures: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            target_size: DEFAULT_TARGET_SIZE,
            target_fps: None,
            max_consecutive_failures: 0,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_size == 0 {
            return Err(anyhow!("queue_size must be at least 1"));
        }
        if self.target_size.0 == 0 || self.target_size.1 == 0 {
            return Err(anyhow!(
                "target size must be non-zero (got {}x{})",
                self.target_size.0,
                self.target_size.1
            ));
        }
        if let Some(fps) = self.target_fps {
            if fps.is_nan() {
                return Err(anyhow!("target_fps must be a number"));
            }
        }
        Ok(())
    }
}

/// Lifecycle of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Created, producer not started.
    Idle,
    /// Producer running.
    Running,
    /// Producer finished; frames may remain in the channel.
    Draining,
    /// End of stream observed or pipeline closed. No further frames.
    Closed,
}

/// What the producer did over its lifetime.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProducerSummary {
    /// Frames enqueued for the consumer.
    pub produced: u64,
    pub read_failures: u64,
    pub preprocess_failures: u64,
    /// Frames dropped by the rate sampler.
    pub sampled_out: u64,
    /// The producer stopped because of cancellation or an abandoned consumer.
    pub cancelled: bool,
    /// Set when the producer ended abnormally (panic, dead source).
    pub failure: Option<String>,
}

/// Observations emitted by the producer.
#[derive(Clone, Debug, PartialEq)]
pub enum PipelineEvent {
    /// The source failed to deliver a frame. The stream continues.
    ReadFailed {
        attempt: u64,
        source: String,
        error: String,
    },
    /// A frame could not be preprocessed and was dropped.
    PreprocessFailed { sequence: u64, error: String },
    /// The rate sampler dropped a frame.
    SampledOut { sequence: u64 },
    /// The producer ended abnormally. The stream still ends cleanly.
    ProducerFailed { error: String },
    /// The producer exited.
    Finished { summary: ProducerSummary },
}

/// Callback invoked on the producer thread for each `PipelineEvent`.
pub type EventHook = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

/// Default hook: forward events to the `log` facade.
pub fn log_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::ReadFailed {
            attempt,
            source,
            error,
        } => log::warn!("pipeline: read #{} from {} failed: {}", attempt, source, error),
        PipelineEvent::PreprocessFailed { sequence, error } => {
            log::warn!("pipeline: frame {} dropped: {}", sequence, error)
        }
        PipelineEvent::SampledOut { sequence } => {
            log::trace!("pipeline: frame {} sampled out", sequence)
        }
        PipelineEvent::ProducerFailed { error } => log::error!("pipeline: producer failed: {}", error),
        PipelineEvent::Finished { summary } => log::debug!(
            "pipeline: producer finished (produced={} read_failures={} preprocess_failures={} sampled_out={} cancelled={})",
            summary.produced,
            summary.read_failures,
            summary.preprocess_failures,
            summary.sampled_out,
            summary.cancelled
        ),
    }
}

// ----------------------------------------------------------------------------
// CancelToken
// ----------------------------------------------------------------------------

/// Cloneable cancellation signal.
///
/// Cancelling disconnects an internal channel, which wakes every thread
/// blocked on the pipeline (producer on a full queue, consumer on an empty
/// one). Safe to trigger from a signal handler thread.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (trigger, signal) = bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            let mut trigger = self
                .inner
                .trigger
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            trigger.take();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Becomes ready (disconnected) once cancelled.
    fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// BoundedPipeline: consumer side
// ----------------------------------------------------------------------------

enum Message {
    Frame(ProcessedFrame),
    EndOfStream(ProducerSummary),
}

/// Single-producer, single-consumer prefetching pipeline.
///
/// ```rust,no_run
/// use edge_pipeline::ingest::{DiscoverOptions, PathListSource};
/// use edge_pipeline::pipeline::{BoundedPipeline, PipelineConfig};
///
/// # fn main() -> anyhow::Result<()> {
/// let source = PathListSource::from_folder("data/images", DiscoverOptions::default())?;
/// let mut pipeline = BoundedPipeline::new(PipelineConfig::default())?;
/// pipeline.start(source)?;
/// for frame in pipeline.frames() {
///     println!("frame {} mean={:.3}", frame.sequence, frame.mean());
/// }
/// let summary = pipeline.close()?;
/// println!("{} frames, {} unreadable", summary.produced, summary.read_failures);
/// # Ok(())
/// # }
/// ```
pub struct BoundedPipeline {
    config: PipelineConfig,
    preprocessor: Preprocessor,
    state: PipelineState,
    receiver: Option<Receiver<Message>>,
    producer: Option<JoinHandle<ProducerSummary>>,
    cancel: CancelToken,
    hook: EventHook,
    summary: Option<ProducerSummary>,
}

impl BoundedPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let preprocessor = Preprocessor::new(config.target_size.0, config.target_size.1)?;
        Ok(Self {
            config,
            preprocessor,
            state: PipelineState::Idle,
            receiver: None,
            producer: None,
            cancel: CancelToken::new(),
            hook: Arc::new(log_event),
            summary: None,
        })
    }

    /// Replace the event hook. Must be called before `start`.
    pub fn with_event_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&PipelineEvent) + Send + Sync + 'static,
    {
        self.hook = Arc::new(hook);
        self
    }

    /// Use an externally owned cancellation token (e.g. one a Ctrl-C handler
    /// triggers). Must be called before `start`.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Spawn the producer over `source`. Idle → Running.
    pub fn start<S>(&mut self, source: S) -> Result<()>
    where
        S: FrameSource + 'static,
    {
        if self.state != PipelineState::Idle {
            return Err(anyhow!(
                "pipeline already started (state {:?})",
                self.state
            ));
        }

        let (tx, rx) = bounded(self.config.queue_size);
        let producer = Producer {
            source,
            preprocessor: self.preprocessor,
            sampler: self.config.target_fps.map(RateSampler::new),
            tx,
            cancel: self.cancel.clone(),
            hook: self.hook.clone(),
            max_consecutive_failures: self.config.max_consecutive_failures,
        };

        let description = producer.source.describe();
        let handle = std::thread::Builder::new()
            .name("frame-producer".to_string())
            .spawn(move || producer.run())
            .context("spawn frame producer thread")?;

        log::info!(
            "pipeline: started on {} (queue_size={}, target={}x{}, fps={})",
            description,
            self.config.queue_size,
            self.config.target_size.0,
            self.config.target_size.1,
            self.config
                .target_fps
                .map(|fps| format!("{:.2}", fps))
                .unwrap_or_else(|| "unlimited".to_string())
        );

        self.receiver = Some(rx);
        self.producer = Some(handle);
        self.state = PipelineState::Running;
        Ok(())
    }

    /// Block for the next frame.
    ///
    /// Returns `None` once the end-of-stream marker has been seen, when the
    /// pipeline is cancelled, or before `start`. After the first `None` from a
    /// started pipeline, every later call returns `None`.
    pub fn next_frame(&mut self) -> Option<ProcessedFrame> {
        if !matches!(self.state, PipelineState::Running | PipelineState::Draining) {
            return None;
        }
        let receiver = self.receiver.as_ref()?;

        let received = select! {
            recv(receiver) -> message => Received::Message(message.ok()),
            recv(self.cancel.signal()) -> _ => Received::Cancelled,
        };

        match received {
            Received::Message(Some(Message::Frame(frame))) => Some(frame),
            Received::Message(Some(Message::EndOfStream(summary))) => {
                self.summary = Some(summary);
                self.state = PipelineState::Closed;
                None
            }
            Received::Message(None) => {
                // Producer thread gone without a marker.
                self.summary.get_or_insert_with(|| ProducerSummary {
                    failure: Some("producer exited without end-of-stream marker".to_string()),
                    ..ProducerSummary::default()
                });
                self.state = PipelineState::Closed;
                None
            }
            Received::Cancelled => {
                self.state = PipelineState::Closed;
                None
            }
        }
    }

    /// Iterate over frames until end of stream.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { pipeline: self }
    }

    pub fn state(&self) -> PipelineState {
        match self.state {
            PipelineState::Running
                if self
                    .producer
                    .as_ref()
                    .is_some_and(|handle| handle.is_finished()) =>
            {
                PipelineState::Draining
            }
            state => state,
        }
    }

    /// Frames currently buffered in the channel (0..=capacity).
    ///
    /// The end-of-stream marker is not counted as a frame but, while it sits
    /// in the channel, it occupies one slot.
    pub fn occupancy(&self) -> usize {
        self.receiver.as_ref().map_or(0, |rx| rx.len())
    }

    pub fn capacity(&self) -> usize {
        self.config.queue_size
    }

    /// Producer summary, once known (end of stream seen or pipeline closed).
    pub fn summary(&self) -> Option<&ProducerSummary> {
        self.summary.as_ref()
    }

    /// Stop the producer and wait for it to exit.
    ///
    /// Wakes a producer blocked on a full channel, drops buffered frames,
    /// joins the thread, and returns its summary. Safe to call more than once.
    pub fn close(&mut self) -> Result<ProducerSummary> {
        self.cancel.cancel();
        self.receiver = None;

        if let Some(handle) = self.producer.take() {
            let joined = handle
                .join()
                .map_err(|_| anyhow!("frame producer thread panicked"));
            self.state = PipelineState::Closed;
            self.summary = Some(joined?);
        }
        self.state = PipelineState::Closed;
        Ok(self.summary.clone().unwrap_or_default())
    }
}

impl Drop for BoundedPipeline {
    fn drop(&mut self) {
        if self.producer.is_some() {
            if let Err(err) = self.close() {
                log::error!("pipeline: {}", err);
            }
        }
    }
}

enum Received {
    Message(Option<Message>),
    Cancelled,
}

/// Iterator over a pipeline's frames. See `BoundedPipeline::frames`.
pub struct Frames<'a> {
    pipeline: &'a mut BoundedPipeline,
}

impl Iterator for Frames<'_> {
    type Item = ProcessedFrame;

    fn next(&mut self) -> Option<Self::Item> {
        self.pipeline.next_frame()
    }
}

// ----------------------------------------------------------------------------
// Producer
// ----------------------------------------------------------------------------

struct Producer<S> {
    source: S,
    preprocessor: Preprocessor,
    sampler: Option<RateSampler>,
    tx: Sender<Message>,
    cancel: CancelToken,
    hook: EventHook,
    max_consecutive_failures: u32,
}

enum Enqueue {
    Delivered,
    /// Cancelled, or the consumer dropped its end.
    Stopped,
}

impl<S: FrameSource> Producer<S> {
    /// Thread body. Every exit path ends the stream.
    fn run(mut self) -> ProducerSummary {
        let mut summary = ProducerSummary::default();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.produce(&mut summary)));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(format!("{:#}", err)),
            Err(payload) => Some(format!("source panicked: {}", panic_message(payload.as_ref()))),
        };
        if let Some(error) = failure {
            self.emit(&PipelineEvent::ProducerFailed {
                error: error.clone(),
            });
            summary.failure = Some(error);
        }

        let released = panic::catch_unwind(AssertUnwindSafe(|| self.source.release()));
        if released.is_err() {
            log::error!("pipeline: source panicked while releasing");
        }

        self.emit(&PipelineEvent::Finished {
            summary: summary.clone(),
        });
        self.end_stream(summary.clone());
        summary
    }

    fn produce(&mut self, summary: &mut ProducerSummary) -> Result<()> {
        let mut attempt: u64 = 0;
        let mut consecutive_failures: u32 = 0;

        loop {
            // The camera read is not interruptible; cancellation lands here.
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                return Ok(());
            }

            let read = self.source.next_frame();
            attempt += 1;
            let raw = match read {
                Ok(Some(frame)) => {
                    consecutive_failures = 0;
                    frame
                }
                Ok(None) => return Ok(()),
                Err(err) => {
                    summary.read_failures += 1;
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    self.emit(&PipelineEvent::ReadFailed {
                        attempt,
                        source: self.source.describe(),
                        error: format!("{:#}", err),
                    });
                    if self.max_consecutive_failures > 0
                        && consecutive_failures >= self.max_consecutive_failures
                    {
                        return Err(anyhow!(
                            "{} consecutive read failures from {}",
                            consecutive_failures,
                            self.source.describe()
                        ));
                    }
                    continue;
                }
            };

            if let Some(sampler) = self.sampler.as_mut() {
                if !sampler.allow() {
                    summary.sampled_out += 1;
                    self.emit(&PipelineEvent::SampledOut {
                        sequence: raw.sequence,
                    });
                    continue;
                }
            }

            let sequence = raw.sequence;
            let processed = match self.preprocessor.process(raw) {
                Ok(frame) => frame,
                Err(err) => {
                    summary.preprocess_failures += 1;
                    self.emit(&PipelineEvent::PreprocessFailed {
                        sequence,
                        error: format!("{:#}", err),
                    });
                    continue;
                }
            };

            match self.enqueue(Message::Frame(processed)) {
                Enqueue::Delivered => summary.produced += 1,
                Enqueue::Stopped => {
                    summary.cancelled = true;
                    return Ok(());
                }
            }
        }
    }

    /// Blocking send that also wakes on cancellation.
    fn enqueue(&self, message: Message) -> Enqueue {
        select! {
            send(self.tx, message) -> sent => match sent {
                Ok(()) => Enqueue::Delivered,
                Err(_) => Enqueue::Stopped,
            },
            recv(self.cancel.signal()) -> _ => Enqueue::Stopped,
        }
    }

    fn end_stream(&self, summary: ProducerSummary) {
        let marker = Message::EndOfStream(summary);
        if self.cancel.is_cancelled() {
            // Nobody is waiting; never block on a full channel here.
            let _ = self.tx.try_send(marker);
            return;
        }
        let _ = self.enqueue(marker);
    }

    /// Call the hook. A panicking hook is logged and otherwise ignored so the
    /// stream still ends with its marker.
    fn emit(&self, event: &PipelineEvent) {
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| (self.hook)(event)));
        if let Err(payload) = delivered {
            log::error!(
                "pipeline: event hook panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::RawFrame;
    use crate::ingest::SourceStats;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    /// Source yielding `total` small frames; listed indices fail to read.
    struct ScriptedSource {
        total: u64,
        next: u64,
        failing: Vec<u64>,
        reads: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(total: u64) -> Self {
            Self {
                total,
                next: 0,
                failing: Vec::new(),
                reads: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing(mut self, failing: &[u64]) -> Self {
            self.failing = failing.to_vec();
            self
        }
    }

    impl FrameSource for ScriptedSource {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        fn next_frame(&mut self) -> Result<Option<RawFrame>> {
            if self.next >= self.total {
                return Ok(None);
            }
            let sequence = self.next;
            self.next += 1;
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.failing.contains(&sequence) {
                return Err(anyhow!("frame {} unreadable", sequence));
            }
            Ok(Some(RawFrame::new(vec![sequence as u8; 4 * 4 * 3], 4, 4, 3, sequence)?))
        }

        fn stats(&self) -> SourceStats {
            SourceStats::default()
        }
    }

    fn small_config(queue_size: usize) -> PipelineConfig {
        PipelineConfig {
            queue_size,
            target_size: (2, 2),
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn delivers_in_order_and_terminates() -> Result<()> {
        let mut pipeline = BoundedPipeline::new(small_config(2))?;
        pipeline.start(ScriptedSource::new(10))?;

        let sequences: Vec<u64> = pipeline.frames().map(|f| f.sequence).collect();
        assert_eq!(sequences, (0..10).collect::<Vec<_>>());
        assert_eq!(pipeline.state(), PipelineState::Closed);
        assert!(pipeline.next_frame().is_none());

        let summary = pipeline.close()?;
        assert_eq!(summary.produced, 10);
        assert!(!summary.cancelled);
        assert!(summary.failure.is_none());
        Ok(())
    }

    #[test]
    fn read_failures_are_skipped_and_reported() -> Result<()> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let mut pipeline = BoundedPipeline::new(small_config(3))?.with_event_hook(move |event| {
            if let PipelineEvent::ReadFailed { attempt, .. } = event {
                sink.lock().unwrap().push(*attempt);
            }
        });
        pipeline.start(ScriptedSource::new(6).failing(&[1, 4]))?;

        let sequences: Vec<u64> = pipeline.frames().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![0, 2, 3, 5]);
        let summary = pipeline.summary().cloned().expect("summary after end of stream");
        assert_eq!(summary.read_failures, 2);
        assert_eq!(summary.produced, 4);
        assert_eq!(*events.lock().unwrap(), vec![2, 5]);
        Ok(())
    }

    #[test]
    fn producer_blocks_when_queue_is_full() -> Result<()> {
        let source = ScriptedSource::new(100);
        let reads = source.reads.clone();
        let mut pipeline = BoundedPipeline::new(small_config(3))?;
        pipeline.start(source)?;

        // Give the producer time to fill the channel.
        let deadline = Instant::now() + Duration::from_secs(2);
        while pipeline.occupancy() < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        std::thread::sleep(Duration::from_millis(50));

        assert_eq!(pipeline.occupancy(), 3);
        assert!(pipeline.occupancy() <= pipeline.capacity());
        // Three queued plus at most one held while blocked on send.
        assert!(reads.load(Ordering::SeqCst) <= 4);
        assert_eq!(pipeline.state(), PipelineState::Running);

        let first = pipeline.next_frame().expect("frame");
        assert_eq!(first.sequence, 0);
        Ok(())
    }

    #[test]
    fn close_wakes_blocked_producer() -> Result<()> {
        let mut pipeline = BoundedPipeline::new(small_config(1))?;
        pipeline.start(ScriptedSource::new(1_000))?;
        assert!(pipeline.next_frame().is_some());

        let started = Instant::now();
        let summary = pipeline.close()?;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(summary.cancelled);
        assert!(summary.produced < 1_000);
        assert_eq!(pipeline.state(), PipelineState::Closed);
        assert!(pipeline.next_frame().is_none());
        Ok(())
    }

    #[test]
    fn external_cancel_wakes_waiting_consumer() -> Result<()> {
        struct Stalled;
        impl FrameSource for Stalled {
            fn describe(&self) -> String {
                "stalled".to_string()
            }
            fn next_frame(&mut self) -> Result<Option<RawFrame>> {
                std::thread::sleep(Duration::from_millis(20));
                Err(anyhow!("no signal"))
            }
            fn stats(&self) -> SourceStats {
                SourceStats::default()
            }
        }

        let token = CancelToken::new();
        let mut pipeline = BoundedPipeline::new(small_config(2))?
            .with_cancel_token(token.clone())
            .with_event_hook(|_| {});
        pipeline.start(Stalled)?;

        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            token.cancel();
        });
        assert!(pipeline.next_frame().is_none());
        canceller.join().unwrap();

        let summary = pipeline.close()?;
        assert!(summary.cancelled);
        assert!(summary.read_failures > 0);
        Ok(())
    }

    #[test]
    fn consecutive_failure_limit_ends_stream() -> Result<()> {
        let config = PipelineConfig {
            max_consecutive_failures: 3,
            ..small_config(2)
        };
        let mut pipeline = BoundedPipeline::new(config)?.with_event_hook(|_| {});
        pipeline.start(ScriptedSource::new(10).failing(&[2, 3, 4]))?;

        let sequences: Vec<u64> = pipeline.frames().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![0, 1]);
        let summary = pipeline.close()?;
        assert_eq!(summary.read_failures, 3);
        assert!(summary.failure.is_some());
        Ok(())
    }

    #[test]
    fn panicking_source_still_ends_stream() -> Result<()> {
        struct Exploding {
            next: u64,
        }
        impl FrameSource for Exploding {
            fn describe(&self) -> String {
                "exploding".to_string()
            }
            fn next_frame(&mut self) -> Result<Option<RawFrame>> {
                if self.next == 2 {
                    panic!("sensor on fire");
                }
                let sequence = self.next;
                self.next += 1;
                Ok(Some(RawFrame::new(vec![0u8; 3], 1, 1, 3, sequence)?))
            }
            fn stats(&self) -> SourceStats {
                SourceStats::default()
            }
        }

        let mut pipeline = BoundedPipeline::new(small_config(4))?.with_event_hook(|_| {});
        pipeline.start(Exploding { next: 0 })?;

        assert_eq!(pipeline.frames().count(), 2);
        let summary = pipeline.close()?;
        let failure = summary.failure.expect("failure recorded");
        assert!(failure.contains("sensor on fire"), "{failure}");
        Ok(())
    }

    #[test]
    fn panicking_hook_does_not_lose_end_of_stream() -> Result<()> {
        let mut pipeline = BoundedPipeline::new(small_config(2))?.with_event_hook(|event| {
            if matches!(event, PipelineEvent::Finished { .. }) {
                panic!("hook exploded");
            }
        });
        pipeline.start(ScriptedSource::new(2))?;

        assert_eq!(pipeline.frames().count(), 2);
        let seen = pipeline.summary().cloned().expect("end-of-stream summary");
        assert_eq!(seen.produced, 2);
        assert!(seen.failure.is_none());

        let summary = pipeline.close()?;
        assert_eq!(summary.produced, 2);
        assert!(summary.failure.is_none());
        Ok(())
    }

    #[test]
    fn sampler_runs_before_enqueue() -> Result<()> {
        // Far below the producer's rate: only the first frame passes.
        let config = PipelineConfig {
            target_fps: Some(0.001),
            ..small_config(2)
        };
        let mut pipeline = BoundedPipeline::new(config)?.with_event_hook(|_| {});
        pipeline.start(ScriptedSource::new(20))?;

        let sequences: Vec<u64> = pipeline.frames().map(|f| f.sequence).collect();
        assert_eq!(sequences, vec![0]);
        let summary = pipeline.close()?;
        assert_eq!(summary.sampled_out, 19);
        assert_eq!(summary.produced, 1);
        Ok(())
    }

    #[test]
    fn start_twice_is_an_error() -> Result<()> {
        let mut pipeline = BoundedPipeline::new(small_config(1))?;
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(pipeline.next_frame().is_none());
        pipeline.start(ScriptedSource::new(1))?;
        assert!(pipeline.start(ScriptedSource::new(1)).is_err());
        Ok(())
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(BoundedPipeline::new(small_config(0)).is_err());
        let config = PipelineConfig {
            target_size: (0, 10),
            ..PipelineConfig::default()
        };
        assert!(BoundedPipeline::new(config).is_err());
    }

    #[test]
    fn drained_pipeline_reports_draining() -> Result<()> {
        let mut pipeline = BoundedPipeline::new(small_config(4))?;
        pipeline.start(ScriptedSource::new(2))?;

        let deadline = Instant::now() + Duration::from_secs(2);
        while pipeline.state() != PipelineState::Draining && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(pipeline.state(), PipelineState::Draining);
        assert_eq!(pipeline.frames().count(), 2);
        assert_eq!(pipeline.state(), PipelineState::Closed);
        Ok(())
    }
}
