use std::time::Duration;

/// Fixed-interval timer for the cached-transform refresh.
///
/// Advanced by the caller's frame delta, so the refresh rate is tied to
/// wall-clock time rather than frame count. A long frame that spans several
/// intervals fires once and starts the next interval from zero.
#[derive(Debug, Clone)]
pub struct RefreshTimer {
    interval: Duration,
    elapsed: Duration,
    fired: u64,
}

impl RefreshTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            elapsed: Duration::ZERO,
            fired: 0,
        }
    }

    /// Add `dt` and report whether the interval has elapsed.
    pub fn advance(&mut self, dt: Duration) -> bool {
        self.elapsed += dt;
        if self.elapsed < self.interval {
            return false;
        }
        self.elapsed = Duration::ZERO;
        self.fired += 1;
        true
    }

    pub fn reset(&mut self) {
        self.elapsed = Duration::ZERO;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time left until the next refresh.
    pub fn remaining(&self) -> Duration {
        self.interval.saturating_sub(self.elapsed)
    }

    /// How many times the timer has fired.
    pub fn fired(&self) -> u64 {
        self.fired
    }
}
