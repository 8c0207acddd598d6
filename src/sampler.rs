//! Wall-clock frame-rate sampler.
//!
//! `RateSampler` decides whether a frame is worth keeping based on the time
//! since the last kept frame. It does not count frames and it never sleeps:
//! a source slower than the target keeps every frame, a faster source has
//! frames dropped until the kept rate converges on the target.

use std::time::{Duration, Instant};

/// Time-based frame decimator.
///
/// Calls take `&mut self`; an instance shared between threads must be
/// serialized by the caller.
#[derive(Clone, Debug)]
pub struct RateSampler {
    interval: Duration,
    /// `None` means no frame has been allowed yet.
    last_allowed: Option<Instant>,
    allowed: u64,
    dropped: u64,
}

impl RateSampler {
    /// Sampler targeting `target_fps` kept frames per second.
    ///
    /// A non-positive or non-finite rate gives a zero interval, so every
    /// frame is allowed.
    pub fn new(target_fps: f64) -> Self {
        let interval = if target_fps.is_finite() && target_fps > 0.0 {
            Duration::try_from_secs_f64(1.0 / target_fps).unwrap_or(Duration::MAX)
        } else {
            Duration::ZERO
        };
        Self::with_interval(interval)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_allowed: None,
            allowed: 0,
            dropped: 0,
        }
    }

    /// Minimum spacing between two allowed frames.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Decide for a frame observed at `now`.
    ///
    /// A `now` earlier than the last allowed instant counts as zero elapsed
    /// time; the last allowed instant only moves when a frame is allowed.
    pub fn allow_at(&mut self, now: Instant) -> bool {
        let due = match self.last_allowed {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if due {
            self.last_allowed = Some(now);
            self.allowed += 1;
        } else {
            self.dropped += 1;
        }
        due
    }

    /// Decide for a frame observed now.
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Forget the last allowed instant; the next call is allowed.
    pub fn reset(&mut self) {
        self.last_allowed = None;
    }

    pub fn allowed(&self) -> u64 {
        self.allowed
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_is_always_allowed() {
        let mut sampler = RateSampler::new(1.0);
        assert!(sampler.allow_at(Instant::now()));
    }

    #[test]
    fn allowed_calls_are_spaced_by_interval() {
        let mut sampler = RateSampler::new(4.0);
        let t = Instant::now();
        let interval = Duration::from_millis(250);
        let eps = Duration::from_millis(10);

        assert!(sampler.allow_at(t));
        assert!(!sampler.allow_at(t + eps));
        assert!(sampler.allow_at(t + interval));
        assert!(!sampler.allow_at(t + interval + eps));

        assert_eq!(sampler.allowed(), 2);
        assert_eq!(sampler.dropped(), 2);
    }

    #[test]
    fn dropped_frames_do_not_move_the_reference() {
        let mut sampler = RateSampler::new(10.0);
        let t = Instant::now();
        assert!(sampler.allow_at(t));
        // Many drops in between must not push the next allowed frame later.
        for ms in (10..100).step_by(10) {
            assert!(!sampler.allow_at(t + Duration::from_millis(ms)));
        }
        assert!(sampler.allow_at(t + Duration::from_millis(100)));
    }

    #[test]
    fn slow_source_keeps_every_frame() {
        let mut sampler = RateSampler::new(5.0);
        let t = Instant::now();
        for i in 0..10 {
            assert!(sampler.allow_at(t + Duration::from_millis(300 * i)));
        }
        assert_eq!(sampler.dropped(), 0);
    }

    #[test]
    fn fast_source_converges_on_target() {
        let mut sampler = RateSampler::new(5.0);
        let t = Instant::now();
        // 30 fps source for two seconds.
        let kept = (0..60)
            .filter(|i| sampler.allow_at(t + Duration::from_micros(33_334 * i)))
            .count();
        assert!((9..=11).contains(&kept), "kept {kept} frames");
    }

    #[test]
    fn non_positive_rate_allows_everything() {
        for fps in [0.0, -3.0, f64::NAN] {
            let mut sampler = RateSampler::new(fps);
            assert_eq!(sampler.interval(), Duration::ZERO);
            let t = Instant::now();
            for _ in 0..5 {
                assert!(sampler.allow_at(t));
            }
        }
    }

    #[test]
    fn backward_clock_is_treated_as_no_elapsed_time() {
        let mut sampler = RateSampler::new(2.0);
        let t = Instant::now() + Duration::from_secs(10);
        assert!(sampler.allow_at(t));
        assert!(!sampler.allow_at(t - Duration::from_secs(5)));
        assert!(sampler.allow_at(t + Duration::from_millis(500)));
    }

    #[test]
    fn reset_allows_next_frame() {
        let mut sampler = RateSampler::new(1.0);
        let t = Instant::now();
        assert!(sampler.allow_at(t));
        assert!(!sampler.allow_at(t));
        sampler.reset();
        assert!(sampler.allow_at(t));
    }
}
