//! Drift-free periodic scheduling.
//!
//! The control loop must hold a 10 Hz cadence without accumulating
//! error from per-tick work time, so wake-ups are scheduled against an
//! absolute deadline (`last_wake + period`) rather than a relative
//! `sleep(period)`. If a tick overruns, the next deadline still
//! advances by exactly one period: cumulative drift stays bounded
//! instead of growing with every tick.

use std::time::{Duration, Instant};

/// Absolute-deadline tick source.
pub struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    /// Start a ticker whose first deadline is one period from now.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next: Instant::now() + period,
        }
    }

    /// Sleep until the next deadline, then advance it by one period.
    ///
    /// When the caller has overrun the deadline, returns immediately
    /// and the schedule catches up on absolute time rather than
    /// resetting from "now".
    pub fn wait(&mut self) {
        let now = Instant::now();
        if let Some(remaining) = self.next.checked_duration_since(now) {
            std::thread::sleep(remaining);
        }
        self.next += self.period;
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}
