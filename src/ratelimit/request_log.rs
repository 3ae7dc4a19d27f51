//! Per-client admission history.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Timestamps of the admissions a client made inside the trailing window.
///
/// Timestamps are recorded in arrival order while the limiter's lock is held,
/// so the front of the queue is always the oldest admission.
#[derive(Debug, Default, Clone)]
pub struct RequestLog {
    admitted: VecDeque<Instant>,
}

impl RequestLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every admission that has left the window `(now - window, now]`.
    ///
    /// Returns the number of timestamps removed.
    pub fn prune(&mut self, now: Instant, window: Duration) -> usize {
        let before = self.admitted.len();
        while let Some(&oldest) = self.admitted.front() {
            if !is_expired(oldest, now, window) {
                break;
            }
            self.admitted.pop_front();
        }
        before - self.admitted.len()
    }

    /// Record an admission at `at`.
    pub fn record(&mut self, at: Instant) {
        self.admitted.push_back(at);
    }

    /// Count admissions still inside the window without pruning.
    pub fn count_valid(&self, now: Instant, window: Duration) -> usize {
        self.admitted
            .iter()
            .filter(|&&at| !is_expired(at, now, window))
            .count()
    }

    /// The oldest recorded admission.
    pub fn oldest(&self) -> Option<Instant> {
        self.admitted.front().copied()
    }

    /// Number of stored timestamps, expired or not.
    pub fn len(&self) -> usize {
        self.admitted.len()
    }

    /// Whether no timestamps are stored.
    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty()
    }
}

/// A timestamp exactly `window` old is outside the window.
fn is_expired(at: Instant, now: Instant, window: Duration) -> bool {
    now.saturating_duration_since(at) >= window
}
