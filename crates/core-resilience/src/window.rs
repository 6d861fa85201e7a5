//! Sliding failure window
//!
//! Bounded, time-ordered history of recent outcomes for one breaker. Entries
//! are evicted oldest-first once the window exceeds its capacity or, when a
//! horizon is configured, once they are older than the horizon. Eviction looks
//! only at position and age, never at whether the entry was a success.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct FailureWindow {
    capacity: usize,
    horizon: Option<Duration>,
    entries: VecDeque<(Instant, bool)>,
    failures: usize,
}

impl FailureWindow {
    pub fn new(capacity: usize, horizon: Option<Duration>) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            horizon,
            entries: VecDeque::with_capacity(capacity),
            failures: 0,
        }
    }

    /// Append an outcome observed at `now`
    pub fn record(&mut self, success: bool, now: Instant) {
        self.entries.push_back((now, success));
        if !success {
            self.failures += 1;
        }
        self.evict(now);
    }

    /// Drop entries beyond capacity or older than the horizon
    pub fn evict(&mut self, now: Instant) {
        while self.entries.len() > self.capacity {
            self.pop_oldest();
        }
        if let Some(horizon) = self.horizon {
            while let Some(&(at, _)) = self.entries.front() {
                if now.saturating_duration_since(at) > horizon {
                    self.pop_oldest();
                } else {
                    break;
                }
            }
        }
    }

    fn pop_oldest(&mut self) {
        if let Some((_, success)) = self.entries.pop_front() {
            if !success {
                self.failures = self.failures.saturating_sub(1);
            }
        }
    }

    /// Failed entries divided by total entries; 0.0 when empty
    pub fn failure_rate(&self) -> f64 {
        if self.entries.is_empty() {
            0.0
        } else {
            self.failures as f64 / self.entries.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.failures = 0;
    }
}
