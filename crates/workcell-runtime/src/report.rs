//! Log-noise control for the periodic control loop.
//!
//! The loop produces the same outcome on every tick while nothing changes
//! (the same order, the same missing part, the same target). Two small
//! helpers keep the log readable:
//!
//! - [`ReportLatch`] reports an outcome the first time it is seen and then
//!   stays quiet until a *different* outcome is observed.
//! - [`Throttle`] lets a periodic message through at most once per interval.
//!
//! # Example
//!
//! ```rust
//! use workcell_runtime::report::ReportLatch;
//!
//! let mut latch = ReportLatch::new();
//!
//! assert!(latch.observe("not_found:gear_part"));
//! assert!(!latch.observe("not_found:gear_part")); // repeat → quiet
//! assert!(latch.observe("target:gear_part"));     // changed → report
//! ```

use std::time::{Duration, Instant};

// ─────────────────────────────────────────────────────────────────────────────
// ReportLatch
// ─────────────────────────────────────────────────────────────────────────────

/// Remembers the last reported outcome key.
#[derive(Debug, Default)]
pub struct ReportLatch {
    last: Option<String>,
}

impl ReportLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key` as this tick's outcome.
    ///
    /// Returns `true` when it differs from the previous outcome and should
    /// therefore be reported.
    pub fn observe(&mut self, key: &str) -> bool {
        if self.last.as_deref() == Some(key) {
            return false;
        }
        self.last = Some(key.to_string());
        true
    }

    /// Forget the last outcome so the next one is always reported.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Throttle
// ─────────────────────────────────────────────────────────────────────────────

/// Rate limiter for periodic log lines.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last_fired: Option<Instant>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
        }
    }

    /// Returns `true` (and restarts the interval) when at least `interval`
    /// has passed since the last time this returned `true`.
    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    fn ready_at(&mut self, now: Instant) -> bool {
        match self.last_fired {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last_fired = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latch_reports_first_occurrence() {
        let mut latch = ReportLatch::new();
        assert!(latch.observe("idle:no_orders"));
    }

    #[test]
    fn latch_suppresses_repeats() {
        let mut latch = ReportLatch::new();
        assert!(latch.observe("not_found:piston_rod_part"));
        for _ in 0..5 {
            assert!(!latch.observe("not_found:piston_rod_part"));
        }
    }

    #[test]
    fn latch_reports_again_after_change() {
        let mut latch = ReportLatch::new();
        assert!(latch.observe("a"));
        assert!(latch.observe("b"));
        assert!(latch.observe("a")); // flapping outcomes are each reported
    }

    #[test]
    fn latch_reset_rearms() {
        let mut latch = ReportLatch::new();
        assert!(latch.observe("a"));
        latch.reset();
        assert!(latch.observe("a"));
    }

    #[test]
    fn throttle_fires_immediately_then_waits() {
        let mut throttle = Throttle::new(Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(throttle.ready_at(t0));
        assert!(!throttle.ready_at(t0 + Duration::from_secs(3)));
        assert!(!throttle.ready_at(t0 + Duration::from_millis(9_999)));
        assert!(throttle.ready_at(t0 + Duration::from_secs(10)));
        assert!(!throttle.ready_at(t0 + Duration::from_secs(11)));
    }

    #[test]
    fn zero_interval_never_throttles() {
        let mut throttle = Throttle::new(Duration::ZERO);
        assert!(throttle.ready());
        assert!(throttle.ready());
    }
}
