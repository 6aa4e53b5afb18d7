//! Periodic trigger and deferred worker.
//!
//! The scheduler runs two cooperating tokio tasks:
//!
//! ```text
//!  trigger task                          worker task
//!  ────────────                          ───────────
//!  sleep_until(deadline)
//!  busy? ── yes ──> skip tick
//!    │ no
//!  busy = true
//!  tick.notify_one() ─────────────────>  tick.notified()
//!  deadline += period                    step.produce()
//!                                        busy = false
//! ```
//!
//! The trigger never synthesizes, locks the store or allocates; it only flips
//! the `busy` flag and hands off through a single-permit `Notify`. If the worker
//! is still busy with the previous tick the new tick is skipped, so work never
//! queues up behind a starved worker.
//!
//! Deadlines advance from the last *intended* fire time, not from when the
//! trigger actually woke, so small wake-up latencies do not accumulate. The
//! period is re-read after every firing, so a period change applies from the
//! next deadline on.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::Instrument;

use crate::config::SharedSettings;
use crate::production::Produce;

/// Lifecycle state of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Trigger disarmed.
    Stopped,
    /// Trigger armed and firing.
    Running,
}

/// Counters describing trigger activity.
#[derive(Debug, Default)]
pub struct TickCounters {
    fired: AtomicU64,
    skipped: AtomicU64,
}

impl TickCounters {
    /// Number of times the trigger fired.
    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }

    /// Number of firings dropped because the worker was still busy.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// Handle to the running trigger and worker tasks.
pub(crate) struct Scheduler {
    state_tx: watch::Sender<SchedulerState>,
    trigger: JoinHandle<()>,
    worker: JoinHandle<()>,
    busy: Arc<AtomicBool>,
    counters: Arc<TickCounters>,
}

impl Scheduler {
    /// Arm the trigger on `runtime` and transition to `Running`.
    pub(crate) fn start(
        runtime: &Handle,
        step: Arc<dyn Produce>,
        settings: Arc<SharedSettings>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(SchedulerState::Running);
        let tick = Arc::new(Notify::new());
        let busy = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(TickCounters::default());

        let worker = runtime.spawn(
            run_worker(state_rx.clone(), step, tick.clone(), busy.clone())
                .instrument(tracing::info_span!("simtemp.worker")),
        );
        let trigger = runtime.spawn(
            run_trigger(state_rx, settings, tick, busy.clone(), counters.clone())
                .instrument(tracing::info_span!("simtemp.trigger")),
        );

        Self {
            state_tx,
            trigger,
            worker,
            busy,
            counters,
        }
    }

    pub(crate) fn state(&self) -> SchedulerState {
        *self.state_tx.borrow()
    }

    pub(crate) fn counters(&self) -> Arc<TickCounters> {
        self.counters.clone()
    }

    /// Disarm without waiting for the tasks.
    pub(crate) fn signal_stop(&self) {
        self.state_tx.send_replace(SchedulerState::Stopped);
    }

    /// Disarm the trigger and wait for both tasks, including any in-flight
    /// production step, to finish.
    ///
    /// Returns `false` if either task ended abnormally. A tick handed off
    /// too late for the worker to pick up is counted as skipped.
    pub(crate) async fn stop(self) -> bool {
        self.signal_stop();
        let mut clean = true;
        if let Err(e) = self.trigger.await {
            tracing::error!(error = %e, "trigger task ended abnormally");
            clean = false;
        }
        if let Err(e) = self.worker.await {
            tracing::error!(error = %e, "worker task ended abnormally");
            clean = false;
        }
        if clean && self.busy.swap(false, Ordering::AcqRel) {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("tick handed off during stop was dropped");
        }
        clean
    }
}

async fn run_trigger(
    mut state_rx: watch::Receiver<SchedulerState>,
    settings: Arc<SharedSettings>,
    tick: Arc<Notify>,
    busy: Arc<AtomicBool>,
    counters: Arc<TickCounters>,
) {
    let mut deadline = Instant::now() + settings.snapshot().period;
    loop {
        tokio::select! {
            _ = sleep_until(deadline) => {}
            changed = state_rx.changed() => {
                if changed.is_err() || *state_rx.borrow() != SchedulerState::Running {
                    break;
                }
                continue;
            }
        }
        if *state_rx.borrow() != SchedulerState::Running {
            break;
        }

        counters.fired.fetch_add(1, Ordering::Relaxed);
        if busy.swap(true, Ordering::AcqRel) {
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("worker still busy, tick skipped");
        } else {
            tick.notify_one();
        }

        let period = settings.snapshot().period;
        deadline += period;
        let now = Instant::now();
        if deadline <= now {
            // Fell behind by more than a period: realign rather than burst.
            deadline = now + period;
        }
    }
    tracing::debug!("trigger disarmed");
}

async fn run_worker(
    mut state_rx: watch::Receiver<SchedulerState>,
    step: Arc<dyn Produce>,
    tick: Arc<Notify>,
    busy: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            // A tick handed off before stop is still produced.
            biased;
            _ = tick.notified() => {
                step.produce();
                busy.store(false, Ordering::Release);
            }
            changed = state_rx.changed() => {
                if changed.is_err() || *state_rx.borrow() != SchedulerState::Running {
                    break;
                }
            }
        }
    }
    tracing::debug!("worker drained");
}
