//! Time source and tick pacing.
//!
//! The loop never calls `Instant::now` or `thread::sleep` directly; it goes
//! through a `Clock`, so tests can drive it with `ManualClock` and no real
//! delays.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `Instant` and `thread::sleep`.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Virtual clock. `sleep` advances time instantly; `advance` simulates work.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Soft rate limiter: each tick is padded out to `interval`.
///
/// Ticks that overrun are not compensated; the next tick simply starts late.
pub struct TickScheduler {
    interval: Duration,
    tick_started: Duration,
}

impl TickScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            tick_started: Duration::ZERO,
        }
    }

    /// Mark the start of a tick.
    pub fn begin(&mut self, clock: &dyn Clock) {
        self.tick_started = clock.now();
    }

    /// Budget left in the current tick.
    pub fn remaining(&self, clock: &dyn Clock) -> Duration {
        let spent = clock.now().saturating_sub(self.tick_started);
        self.interval.saturating_sub(spent)
    }

    /// Sleep away the rest of the tick budget.
    pub fn finish(&self, clock: &dyn Clock) {
        let remaining = self.remaining(clock);
        clock.sleep(remaining);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_pads_short_ticks() {
        let clock = ManualClock::new();
        let mut ticks = TickScheduler::new(Duration::from_millis(30));

        ticks.begin(&clock);
        clock.advance(Duration::from_millis(12));
        assert_eq!(ticks.remaining(&clock), Duration::from_millis(18));
        ticks.finish(&clock);
        assert_eq!(clock.now(), Duration::from_millis(30));
    }

    #[test]
    fn scheduler_never_sleeps_after_overrun() {
        let clock = ManualClock::new();
        let mut ticks = TickScheduler::new(Duration::from_millis(10));

        ticks.begin(&clock);
        clock.advance(Duration::from_millis(25));
        assert_eq!(ticks.remaining(&clock), Duration::ZERO);
        ticks.finish(&clock);
        assert_eq!(clock.now(), Duration::from_millis(25));
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        other.sleep(Duration::from_secs(2));
        assert_eq!(clock.now(), Duration::from_secs(2));
    }
}
