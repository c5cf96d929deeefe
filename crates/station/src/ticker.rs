//! Periodic timer display for the station screen.
//!
//! [`PhaseTicker`] recomputes the [`TimerDisplay`] from the client state on
//! every tick and on every state change, and publishes it on a `watch`
//! channel. The task stops when its cancellation token fires or the ticker
//! is dropped.

use std::sync::Arc;
use std::time::Duration;

use mes_core::clock::Clock;
use mes_core::phase_timer::TimerDisplay;
use mes_core::state_store::StateStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to the running ticker task.
pub struct PhaseTicker {
    display: watch::Receiver<TimerDisplay>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

fn compute(state: &StateStore, clock: &dyn Clock) -> TimerDisplay {
    let s = state.snapshot();
    TimerDisplay::compute(
        s.phase,
        s.phase_changed_at,
        s.operator_session_started_at,
        &s.accumulated,
        clock.now(),
    )
}

impl PhaseTicker {
    /// Start ticking every `period`. The task is tied to a child of `cancel`.
    pub fn spawn(
        state: Arc<StateStore>,
        clock: Arc<dyn Clock>,
        period: Duration,
        cancel: &CancellationToken,
    ) -> Self {
        let (tx, display) = watch::channel(compute(&state, clock.as_ref()));
        let cancel = cancel.child_token();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut changes = state.subscribe();
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = interval.tick() => {}
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                let next = compute(&state, clock.as_ref());
                tx.send_if_modified(|current| {
                    if *current == next {
                        false
                    } else {
                        *current = next;
                        true
                    }
                });
            }
            tracing::debug!("Phase ticker stopped");
        });

        Self {
            display,
            cancel,
            handle: Some(handle),
        }
    }

    /// Receiver notified whenever the display changes.
    pub fn display(&self) -> watch::Receiver<TimerDisplay> {
        self.display.clone()
    }

    pub fn current(&self) -> TimerDisplay {
        self.display.borrow().clone()
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Phase ticker task failed");
            }
        }
    }
}

impl Drop for PhaseTicker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
