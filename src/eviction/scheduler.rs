//! Periodic driver for [`EvictionCycle`].
//!
//! ```text
//!            start()                       stop()
//!  Stopped ───────────► Running ─────────────────────► Stopped
//!     ▲                    │
//!     └── cycle error ─────┘   (operator alerted; stays Stopped until start)
//! ```
//!
//! The first cycle runs as soon as the loop starts. A cycle that has begun
//! always runs to completion; `stop` only takes effect between cycles.

use crate::collab::Notice;
use crate::eviction::cycle::{EvictionCycle, EvictionError};
use crate::sheets::SheetTransport;
use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Result of a lifecycle request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    AlreadyRunning,
    Stopped,
    AlreadyStopped,
}

impl Transition {
    /// Text for whoever asked
    pub fn notice(&self) -> &'static str {
        match self {
            Transition::Started => "Started the eviction loop.",
            Transition::AlreadyRunning => "The eviction loop is already running.",
            Transition::Stopped => "Stopped the eviction loop.",
            Transition::AlreadyStopped => "The eviction loop is stopped.",
        }
    }
}

struct RunningLoop {
    generation: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct SchedulerState {
    running: Option<RunningLoop>,
    generation: u64,
}

/// Starts and stops the eviction loop
pub struct EvictionScheduler<T: SheetTransport> {
    cycle: Arc<EvictionCycle<T>>,
    interval: Duration,
    state: Arc<Mutex<SchedulerState>>,
}

impl<T: SheetTransport> EvictionScheduler<T> {
    pub fn new(cycle: EvictionCycle<T>) -> Self {
        Self::with_interval(cycle, DEFAULT_INTERVAL)
    }

    pub fn with_interval(cycle: EvictionCycle<T>, interval: Duration) -> Self {
        EvictionScheduler {
            cycle: Arc::new(cycle),
            interval,
            state: Arc::new(Mutex::new(SchedulerState::default())),
        }
    }

    pub fn cycle(&self) -> &EvictionCycle<T> {
        &self.cycle
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running.is_some()
    }

    /// Start the loop unless it is already running. Must be called from
    /// within a tokio runtime.
    pub fn start(&self) -> Transition {
        let mut state = self.state.lock();
        if state.running.is_some() {
            return Transition::AlreadyRunning;
        }
        state.generation += 1;
        let generation = state.generation;
        let token = CancellationToken::new();

        let handle = tokio::spawn(run_loop(
            self.cycle.clone(),
            self.interval,
            token.clone(),
            self.state.clone(),
            generation,
        ));
        state.running = Some(RunningLoop {
            generation,
            token,
            handle,
        });
        info!(table = self.cycle.table(), interval = ?self.interval, "eviction loop started");
        Transition::Started
    }

    /// Cancel the loop and wait for an in-flight cycle to finish
    pub async fn stop(&self) -> Transition {
        let Some(running) = self.state.lock().running.take() else {
            return Transition::AlreadyStopped;
        };
        running.token.cancel();
        if let Err(e) = running.handle.await {
            error!(error = %e, "eviction loop task failed");
        }
        Transition::Stopped
    }
}

async fn run_loop<T: SheetTransport>(
    cycle: Arc<EvictionCycle<T>>,
    interval: Duration,
    token: CancellationToken,
    state: Arc<Mutex<SchedulerState>>,
    generation: u64,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!(table = cycle.table(), "eviction loop stopped");
                break;
            }
            _ = ticker.tick() => {
                let outcome = AssertUnwindSafe(cycle.run_once())
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| Err(EvictionError::Aborted("cycle panicked".to_string())));
                match outcome {
                    Ok(report) => {
                        debug!(table = cycle.table(), scanned = report.scanned, removed = report.removed, "eviction tick");
                    }
                    Err(e) => {
                        error!(table = cycle.table(), error = %e, "eviction cycle failed, loop halted");
                        cycle.alert_operator(Notice::LoopHalted { error: e.to_string() }).await;
                        break;
                    }
                }
            }
        }
    }

    let mut state = state.lock();
    if state
        .running
        .as_ref()
        .is_some_and(|r| r.generation == generation)
    {
        state.running = None;
    }
}
