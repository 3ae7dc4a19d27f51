//! Core sliding-window rate limiter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, trace};

use super::clock::{Clock, SystemClock};
use super::reclaimer::{Reclaimer, ReclaimerState};
use super::request_log::RequestLog;
use crate::config::RateLimitingConfig;
use crate::error::{Result, TurnstileError};

/// Outcome of a single admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request was admitted
    pub allowed: bool,
    /// Admissions left in the current window after this call
    pub remaining: usize,
    /// Time until the oldest counted admission leaves the window (denials only)
    pub retry_after: Option<Duration>,
}

/// State shared between the limiter and its reclaimer task.
pub(crate) struct LimiterState<C: Clock> {
    /// Admission history indexed by client key
    logs: RwLock<HashMap<String, RequestLog>>,
    window: Duration,
    max_requests: usize,
    clock: C,
}

impl<C: Clock> LimiterState<C> {
    pub(crate) fn new(window: Duration, max_requests: usize, clock: C) -> Self {
        Self {
            logs: RwLock::new(HashMap::new()),
            window,
            max_requests,
            clock,
        }
    }

    /// Prune, decide and record for one client in a single critical section.
    pub(crate) fn decide(&self, client: &str) -> RateLimitDecision {
        let mut logs = self.logs.write();
        // Read under the lock so timestamps land in the log in order.
        let now = self.clock.now();

        let log = logs.entry(client.to_owned()).or_default();
        log.prune(now, self.window);

        let valid = log.len();
        trace!(
            client = %client,
            valid = valid,
            max = self.max_requests,
            "Checking rate limit"
        );

        if valid < self.max_requests {
            log.record(now);
            return RateLimitDecision {
                allowed: true,
                remaining: self.max_requests - valid - 1,
                retry_after: None,
            };
        }

        let retry_after = log
            .oldest()
            .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(oldest)));
        drop(logs);

        debug!(
            client = %client,
            retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
            "Rate limit exceeded"
        );

        RateLimitDecision {
            allowed: false,
            remaining: 0,
            retry_after,
        }
    }

    /// Prune every log and drop clients with nothing left in the window.
    ///
    /// Returns the number of clients removed.
    pub(crate) fn sweep(&self) -> usize {
        let (removed, remaining) = {
            let mut logs = self.logs.write();
            let now = self.clock.now();
            let before = logs.len();

            logs.retain(|client, log| {
                log.prune(now, self.window);
                if log.is_empty() {
                    debug!(client = %client, "Reclaimed idle client");
                    false
                } else {
                    true
                }
            });

            (before - logs.len(), logs.len())
        };

        debug!(removed = removed, remaining = remaining, "Reclaimer sweep complete");
        removed
    }

    pub(crate) fn request_count(&self, client: &str) -> usize {
        let logs = self.logs.read();
        let now = self.clock.now();
        logs.get(client)
            .map(|log| log.count_valid(now, self.window))
            .unwrap_or(0)
    }

    pub(crate) fn tracked_clients(&self) -> usize {
        self.logs.read().len()
    }
}

/// Per-client sliding-window rate limiter.
///
/// Each client may be admitted at most `max_requests` times in any trailing
/// window of length `window`. The limiter is thread-safe and is meant to be
/// shared (typically behind an `Arc`) by every request handler.
///
/// Construction spawns a reclaimer task on the current tokio runtime that
/// periodically removes clients whose history has aged out. The task stops on
/// [`shutdown`](Self::shutdown) or when the limiter is dropped.
pub struct SlidingWindowLimiter<C: Clock = SystemClock> {
    state: Arc<LimiterState<C>>,
    reclaimer: Reclaimer,
}

impl SlidingWindowLimiter<SystemClock> {
    /// Create a limiter whose reclaimer runs once per window.
    ///
    /// Fails if either parameter is zero or no tokio runtime is available.
    pub fn new(window: Duration, max_requests: usize) -> Result<Self> {
        Self::build(window, max_requests, window, SystemClock)
    }

    /// Create a limiter from a configuration section.
    pub fn with_config(config: &RateLimitingConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> SlidingWindowLimiter<C> {
    /// Create a limiter that reads time from `clock`.
    pub fn with_clock(config: &RateLimitingConfig, clock: C) -> Result<Self> {
        config.validate()?;
        Self::build(
            config.window(),
            config.max_requests,
            config.cleanup_interval(),
            clock,
        )
    }

    fn build(
        window: Duration,
        max_requests: usize,
        cleanup_interval: Duration,
        clock: C,
    ) -> Result<Self> {
        if window.is_zero() {
            return Err(TurnstileError::InvalidWindow);
        }
        if max_requests == 0 {
            return Err(TurnstileError::InvalidMaxRequests);
        }

        let state = Arc::new(LimiterState::new(window, max_requests, clock));
        let reclaimer = Reclaimer::spawn(state.clone(), cleanup_interval)?;

        info!(
            window_ms = window.as_millis() as u64,
            max_requests = max_requests,
            cleanup_interval_ms = cleanup_interval.as_millis() as u64,
            "Rate limiter initialized"
        );

        Ok(Self { state, reclaimer })
    }

    /// Decide whether `client` may make another request now.
    ///
    /// Admitted requests are recorded; denied ones are not.
    pub fn allow(&self, client: &str) -> bool {
        self.state.decide(client).allowed
    }

    /// Like [`allow`](Self::allow) but reports remaining quota and retry hints.
    pub fn check(&self, client: &str) -> RateLimitDecision {
        self.state.decide(client)
    }

    /// Admissions currently counted against `client`.
    pub fn request_count(&self, client: &str) -> usize {
        self.state.request_count(client)
    }

    /// Number of clients held in memory, including ones whose history has
    /// expired but has not been reclaimed yet.
    pub fn tracked_clients(&self) -> usize {
        self.state.tracked_clients()
    }

    /// Run one reclamation pass now. Returns the number of clients removed.
    pub fn sweep(&self) -> usize {
        self.state.sweep()
    }

    /// Length of the sliding window.
    pub fn window(&self) -> Duration {
        self.state.window
    }

    /// Admissions allowed per client per window.
    pub fn max_requests(&self) -> usize {
        self.state.max_requests
    }

    /// Period of the reclaimer task.
    pub fn cleanup_interval(&self) -> Duration {
        self.reclaimer.period()
    }

    /// Current reclaimer lifecycle state.
    pub fn reclaimer_state(&self) -> ReclaimerState {
        self.reclaimer.state()
    }

    /// Stop the reclaimer. Returns `false` if it was already stopped.
    ///
    /// `allow` keeps working afterwards; idle clients are simply no longer
    /// evicted.
    pub fn shutdown(&self) -> bool {
        self.reclaimer.shutdown()
    }

    /// Stop the reclaimer and wait for its task to exit.
    pub async fn close(&self) {
        self.reclaimer.shutdown_and_wait().await;
    }
}

impl<C: Clock> std::fmt::Debug for SlidingWindowLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("window", &self.state.window)
            .field("max_requests", &self.state.max_requests)
            .field("tracked_clients", &self.tracked_clients())
            .field("reclaimer", &self.reclaimer)
            .finish()
    }
}
