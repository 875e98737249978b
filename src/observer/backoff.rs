//! Exponential backoff timers for observer recovery.

use rand::Rng;
use std::time::Duration;

/// Doubling delay between `initial` and `max`.
///
/// The timer is "maxed" once the current delay reaches the ceiling; callers
/// use that as the signal that a failure category has exhausted its budget.
#[derive(Debug, Clone)]
pub struct BackoffTimer {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl BackoffTimer {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn increase(&mut self) {
        self.current = self.current.saturating_mul(2).min(self.max);
    }

    pub fn is_maxed(&self) -> bool {
        self.current >= self.max
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// The delay to sleep now, then advance the timer.
    pub fn next_delay(&mut self) -> Duration {
        let delay = with_jitter(self.current);
        self.increase();
        delay
    }
}

/// Add up to 10% random jitter to `delay`.
pub fn with_jitter(delay: Duration) -> Duration {
    let jitter_range = delay.as_millis() as u64 / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };
    delay + Duration::from_millis(jitter)
}
