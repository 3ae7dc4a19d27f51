//! Background task that evicts idle clients from the limiter's map.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::clock::Clock;
use super::limiter::LimiterState;
use crate::error::{Result, TurnstileError};

/// Lifecycle of the reclaimer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimerState {
    /// Sweeping on its period
    Running,
    /// Shut down; no further sweeps happen
    Stopped,
}

/// Handle to the periodic sweep task.
///
/// Dropping the handle stops the task.
pub(crate) struct Reclaimer {
    period: Duration,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Reclaimer {
    /// Spawn the sweep task on the current tokio runtime.
    pub(crate) fn spawn<C: Clock>(state: Arc<LimiterState<C>>, period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(TurnstileError::InvalidCleanupInterval);
        }

        let runtime = Handle::try_current().map_err(|e| {
            TurnstileError::Runtime(format!("reclaimer needs a tokio runtime: {}", e))
        })?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = runtime.spawn(run(state, period, stop_rx));

        info!(period_ms = period.as_millis() as u64, "Reclaimer started");

        Ok(Self {
            period,
            stop_tx: Mutex::new(Some(stop_tx)),
            task: Mutex::new(Some(task)),
        })
    }

    /// The sweep period.
    pub(crate) fn period(&self) -> Duration {
        self.period
    }

    pub(crate) fn state(&self) -> ReclaimerState {
        let signalled = self.stop_tx.lock().is_none();
        let finished = self
            .task
            .lock()
            .as_ref()
            .map_or(true, |task| task.is_finished());

        if signalled || finished {
            ReclaimerState::Stopped
        } else {
            ReclaimerState::Running
        }
    }

    /// Signal the task to stop. Returns `false` if it was already signalled.
    pub(crate) fn shutdown(&self) -> bool {
        match self.stop_tx.lock().take() {
            Some(stop_tx) => {
                // The task may already be gone with its runtime.
                let _ = stop_tx.send(());
                info!("Reclaimer stopped");
                true
            }
            None => false,
        }
    }

    /// Signal the task to stop and wait for it to exit.
    pub(crate) async fn shutdown_and_wait(&self) {
        self.shutdown();

        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Reclaimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reclaimer")
            .field("period", &self.period)
            .field("state", &self.state())
            .finish()
    }
}

async fn run<C: Clock>(
    state: Arc<LimiterState<C>>,
    period: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    // First sweep happens one full period after start.
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                state.sweep();
            }
        }
    }

    debug!("Reclaimer task exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::{ManualClock, SystemClock};

    fn state() -> Arc<LimiterState<SystemClock>> {
        Arc::new(LimiterState::new(Duration::from_secs(1), 3, SystemClock))
    }

    #[test]
    fn test_spawn_rejects_zero_period() {
        let result = Reclaimer::spawn(state(), Duration::ZERO);
        assert!(matches!(result, Err(TurnstileError::InvalidCleanupInterval)));
    }

    #[test]
    fn test_spawn_outside_runtime_fails() {
        let result = Reclaimer::spawn(state(), Duration::from_secs(1));
        assert!(matches!(result, Err(TurnstileError::Runtime(_))));
    }

    #[tokio::test]
    async fn test_lifecycle_running_to_stopped() {
        let reclaimer = Reclaimer::spawn(state(), Duration::from_millis(50)).unwrap();
        assert_eq!(reclaimer.state(), ReclaimerState::Running);
        assert_eq!(reclaimer.period(), Duration::from_millis(50));

        reclaimer.shutdown_and_wait().await;
        assert_eq!(reclaimer.state(), ReclaimerState::Stopped);

        // Stopped is terminal
        assert!(!reclaimer.shutdown());
        assert_eq!(reclaimer.state(), ReclaimerState::Stopped);
    }

    #[tokio::test]
    async fn test_sweeps_on_its_period() {
        let clock = ManualClock::new();
        let state = Arc::new(LimiterState::new(Duration::from_secs(1), 3, clock.clone()));
        let _reclaimer = Reclaimer::spawn(state.clone(), Duration::from_millis(20)).unwrap();

        assert!(state.decide("client").allowed);
        clock.advance(Duration::from_secs(1));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(state.tracked_clients(), 0);
    }

    #[tokio::test]
    async fn test_drop_stops_task() {
        let shared = state();
        let reclaimer = Reclaimer::spawn(shared.clone(), Duration::from_millis(10)).unwrap();
        assert_eq!(Arc::strong_count(&shared), 2);

        drop(reclaimer);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The exited task released its reference to the state
        assert_eq!(Arc::strong_count(&shared), 1);
    }
}
