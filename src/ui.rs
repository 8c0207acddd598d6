use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::detect::Prediction;
use crate::metrics::MetricsSnapshot;
use crate::pipeline::ProducerSummary;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = spinner();
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Status display for a running pipeline.
    pub fn status_line(&self, every: u64) -> StatusLine {
        let spinner = self.use_pretty().then(spinner);
        StatusLine {
            every: every.max(1),
            spinner,
        }
    }
}

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_draw_target(ProgressDrawTarget::stderr());
    spinner.enable_steady_tick(Duration::from_millis(120));
    let style = ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Periodic frame/FPS/memory line. A spinner on a TTY, one plain line per
/// report otherwise.
pub struct StatusLine {
    every: u64,
    spinner: Option<ProgressBar>,
}

impl StatusLine {
    /// True when `frames` falls on a reporting boundary.
    pub fn due(&self, frames: u64) -> bool {
        frames > 0 && frames.is_multiple_of(self.every)
    }

    pub fn report(&self, snapshot: &MetricsSnapshot, prediction: Option<&Prediction>) {
        let line = format_status(snapshot, prediction);
        match &self.spinner {
            Some(spinner) => spinner.set_message(line),
            None => eprintln!("{line}"),
        }
    }

    pub fn finish(self, snapshot: &MetricsSnapshot, summary: &ProducerSummary) {
        let line = format_summary(snapshot, summary);
        match &self.spinner {
            Some(spinner) => spinner.finish_with_message(line),
            None => eprintln!("{line}"),
        }
    }
}

pub fn format_status(snapshot: &MetricsSnapshot, prediction: Option<&Prediction>) -> String {
    let mut line = format!(
        "frames={} fps={:.2} mem={:.1}MB",
        snapshot.frames, snapshot.fps, snapshot.memory_mb
    );
    if let Some(prediction) = prediction {
        line.push_str(&format!(" score={:.3}", prediction.score));
        if prediction.motion_detected {
            line.push_str(" motion");
        }
    }
    line
}

pub fn format_summary(snapshot: &MetricsSnapshot, summary: &ProducerSummary) -> String {
    let mut line = format!(
        "done: {} frames in {} ({:.2} fps, {:.1}MB); read_failures={} preprocess_failures={} sampled_out={}",
        snapshot.frames,
        format_duration(snapshot.elapsed),
        snapshot.fps,
        snapshot.memory_mb,
        summary.read_failures,
        summary.preprocess_failures,
        summary.sampled_out
    );
    if summary.cancelled {
        line.push_str(" (cancelled)");
    }
    if let Some(failure) = &summary.failure {
        line.push_str(&format!(" failure: {}", failure));
    }
    line
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(frames: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            frames,
            fps: 12.5,
            memory_mb: 48.0,
            elapsed: Duration::from_millis(1600),
        }
    }

    #[test]
    fn status_due_every_n_frames() {
        let status = Ui::new(UiMode::Plain, false).status_line(10);
        assert!(!status.due(0));
        assert!(!status.due(9));
        assert!(status.due(10));
        assert!(status.due(20));
    }

    #[test]
    fn status_line_includes_prediction() {
        let prediction = Prediction {
            score: 0.5,
            motion_detected: true,
            latency: Duration::ZERO,
        };
        let line = format_status(&snapshot(10), Some(&prediction));
        assert_eq!(line, "frames=10 fps=12.50 mem=48.0MB score=0.500 motion");
    }

    #[test]
    fn summary_mentions_cancellation_and_failure() {
        let summary = ProducerSummary {
            cancelled: true,
            failure: Some("camera gone".to_string()),
            read_failures: 3,
            ..ProducerSummary::default()
        };
        let line = format_summary(&snapshot(4), &summary);
        assert!(line.starts_with("done: 4 frames in 1.60s"));
        assert!(line.contains("read_failures=3"));
        assert!(line.contains("(cancelled)"));
        assert!(line.ends_with("failure: camera gone"));
    }

    #[test]
    fn plain_mode_never_uses_spinner() {
        let ui = Ui::from_args(Some("plain"), true);
        assert!(!ui.use_pretty());
        assert!(Ui::from_args(None, true).use_pretty());
        assert!(!Ui::from_args(Some("pretty"), false).use_pretty());
    }
}
