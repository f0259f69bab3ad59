//! Leading and trailing edge throttle driven by caller-supplied time.

use std::time::{Duration, Instant};

/// Collapses bursts of requests into at most one firing per interval.
///
/// The first request in a quiet period fires immediately. Requests arriving
/// inside the interval are remembered and fire once from [`Throttle::poll`]
/// when the interval has elapsed.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval: Duration,
    last_fired: Option<Instant>,
    pending: bool,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
            pending: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Records a request. Returns `true` if it should be acted on now.
    pub fn request(&mut self, now: Instant) -> bool {
        if self.window_elapsed(now) {
            self.fire(now);
            true
        } else {
            self.pending = true;
            false
        }
    }

    /// Returns `true` once when a deferred request is due.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.pending && self.window_elapsed(now) {
            self.fire(now);
            true
        } else {
            false
        }
    }

    /// Fires a pending request regardless of the interval.
    pub fn flush(&mut self, now: Instant) -> bool {
        if self.pending {
            self.fire(now);
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    fn window_elapsed(&self, now: Instant) -> bool {
        self.last_fired
            .map_or(true, |last| now.saturating_duration_since(last) >= self.interval)
    }

    fn fire(&mut self, now: Instant) {
        self.last_fired = Some(now);
        self.pending = false;
    }
}
