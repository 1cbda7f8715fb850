//! Backoff policy: decides how long to wait after a failed delivery.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with a cap.
///
/// `current` only grows on failure (doubling, capped at `max`) and returns
/// to `initial` on `reset`.
///
/// Example with initial=1s, max=30s (before jitter):
/// - failure 1: 1s
/// - failure 2: 2s
/// - failure 3: 4s
/// - ...
/// - failure 6+: 30s
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// 1s initial, 30s cap.
    pub fn default_v1() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// The un-jittered delay the next failure will use.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// Delay to wait after this failure, then double the base.
    ///
    /// Returns `jitter(min(max, current))`; afterwards
    /// `current = min(max, 2 * current)`.
    pub fn next_delay<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let base = self.current.min(self.max);
        self.current = self.current.saturating_mul(2).min(self.max);
        jitter(base, rng)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::default_v1()
    }
}

/// Symmetric ±20% jitter at millisecond resolution.
///
/// `delta = floor(ms * 0.2)`; the result is uniform over
/// `[ms - delta, ms + delta]`.
pub fn jitter<R: Rng + ?Sized>(delay: Duration, rng: &mut R) -> Duration {
    let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX / 2);
    let delta = ms / 5;
    if delta == 0 {
        return Duration::from_millis(ms);
    }
    let offset = rng.gen_range(0..=delta * 2);
    Duration::from_millis(ms - delta + offset)
}
