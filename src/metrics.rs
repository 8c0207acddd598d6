//! Throughput and memory metrics.

use serde::Deserialize;
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Which memory figure a snapshot reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    /// Resident set size of this process.
    #[default]
    Process,
    /// Memory in use across the whole system.
    System,
}

impl MemoryScope {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "process" | "rss" => Some(Self::Process),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::System => "system",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetricsSnapshot {
    pub frames: u64,
    pub fps: f64,
    /// Megabytes (MiB) per `MemoryScope`. 0.0 when unavailable.
    pub memory_mb: f64,
    pub elapsed: Duration,
}

/// Frame counter with wall-clock FPS and memory sampling.
pub struct Metrics {
    frames: u64,
    started: Instant,
    scope: MemoryScope,
    system: System,
    pid: Option<Pid>,
    last_memory_mb: f64,
}

impl Metrics {
    pub fn new(scope: MemoryScope) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(err) => {
                log::warn!("metrics: process id unavailable, memory reads as 0: {}", err);
                None
            }
        };
        Self {
            frames: 0,
            started: Instant::now(),
            scope,
            system: System::new(),
            pid,
            last_memory_mb: 0.0,
        }
    }

    /// Re-arm the timer without touching the frame count.
    pub fn start(&mut self) {
        self.started = Instant::now();
    }

    /// Zero the frame count and re-arm the timer.
    pub fn reset(&mut self) {
        self.frames = 0;
        self.last_memory_mb = 0.0;
        self.start();
    }

    /// Count one processed frame. Returns the new total.
    pub fn record_frame(&mut self) -> u64 {
        self.frames += 1;
        self.frames
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Memory figure from the most recent snapshot.
    pub fn last_memory_mb(&self) -> f64 {
        self.last_memory_mb
    }

    pub fn snapshot(&mut self) -> MetricsSnapshot {
        let elapsed = self.started.elapsed();
        let memory_mb = self.sample_memory_mb();
        self.last_memory_mb = memory_mb;
        MetricsSnapshot {
            frames: self.frames,
            fps: fps(self.frames, elapsed),
            memory_mb,
            elapsed,
        }
    }

    /// `record_frame` followed by `snapshot`.
    pub fn update(&mut self) -> MetricsSnapshot {
        self.record_frame();
        self.snapshot()
    }

    fn sample_memory_mb(&mut self) -> f64 {
        match self.scope {
            MemoryScope::Process => {
                let Some(pid) = self.pid else {
                    return 0.0;
                };
                if !self.system.refresh_process(pid) {
                    return 0.0;
                }
                self.system
                    .process(pid)
                    .map_or(0.0, |process| process.memory() as f64 / BYTES_PER_MB)
            }
            MemoryScope::System => {
                self.system.refresh_memory();
                self.system.used_memory() as f64 / BYTES_PER_MB
            }
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(MemoryScope::default())
    }
}

/// Frames per second over `elapsed`. Zero for an empty interval.
pub fn fps(frames: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        0.0
    } else {
        frames as f64 / secs
    }
}
