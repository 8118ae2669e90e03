//! Background durability check engine
//!
//! The engine ticks at a fixed rate and runs one check cycle per tick until
//! its cancellation token fires. It then stops ticking, waits for checks
//! already in flight, and closes the backend.

use crate::backend::{close_all, ObjectBackend};
use crate::error::{EngineError, ShutdownError};
use crate::service::check_object;
use crate::service::reference::ReferenceStore;
use crate::status::{CheckRecord, StatusStore};
use chrono::Utc;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// How ticks relate to checks still running
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckMode {
    /// A tick waits for the previous check; commits stay in sequence order
    #[default]
    SingleFlight,
    /// Every tick starts its own check, even if earlier ones are still running
    Overlapping,
}

impl std::str::FromStr for CheckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single-flight" | "single" | "serial" => Ok(CheckMode::SingleFlight),
            "overlapping" | "overlap" => Ok(CheckMode::Overlapping),
            _ => Err(format!("Unknown check mode: {}", s)),
        }
    }
}

/// Lifecycle of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    ShuttingDown,
    Stopped,
}

/// What a single check needs; cheap to clone into spawned checks
#[derive(Clone)]
struct CheckContext {
    backend: Arc<dyn ObjectBackend>,
    reference: Arc<ReferenceStore>,
    object_path: Arc<str>,
    status: Arc<StatusStore>,
}

impl CheckContext {
    /// Run check `sequence` and commit its record
    async fn run(&self, sequence: u64) -> CheckRecord {
        info!("Checking the file (check #{})", sequence);
        let outcome = check_object(self.backend.as_ref(), &self.object_path, &self.reference).await;

        let record = match outcome {
            Ok(()) => CheckRecord::success(sequence, Utc::now()),
            Err(e) => {
                warn!("Durability check #{} failed: {}", sequence, e);
                CheckRecord::failure(sequence, Utc::now(), e.to_string())
            }
        };
        let summary = self.status.record(record.clone());
        if record.success {
            info!(
                "Durability check #{} successful ({}/{} passed, {:.2}%)",
                sequence, summary.successes, summary.attempts, summary.success_percentage
            );
        }
        record
    }
}

/// Longest accepted check interval
pub const MAX_CHECK_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// How long shutdown waits for checks in flight before aborting them
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Background durability check engine
pub struct CheckEngine {
    context: CheckContext,
    interval: Duration,
    mode: CheckMode,
    shutdown_grace: Duration,
    last_sequence: u64,
    state: watch::Sender<EngineState>,
}

impl CheckEngine {
    pub fn new(
        backend: Arc<dyn ObjectBackend>,
        reference: ReferenceStore,
        object_path: &str,
        status: Arc<StatusStore>,
        interval: Duration,
        mode: CheckMode,
    ) -> Self {
        if interval > MAX_CHECK_INTERVAL {
            warn!("Check interval {:?} capped to {:?}", interval, MAX_CHECK_INTERVAL);
        }
        let (state, _) = watch::channel(EngineState::Idle);
        Self {
            context: CheckContext {
                backend,
                reference: Arc::new(reference),
                object_path: Arc::from(object_path),
                status,
            },
            interval: interval.min(MAX_CHECK_INTERVAL),
            mode,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            last_sequence: 0,
            state,
        }
    }

    /// Bound the wait for checks still running at shutdown
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Watch lifecycle transitions
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    fn transition(&self, next: EngineState) {
        info!("Check engine {:?}", next);
        self.state.send_replace(next);
    }

    fn next_sequence(&mut self) -> u64 {
        self.last_sequence += 1;
        self.last_sequence
    }

    /// Tick until `cancel` fires, then drain and close the backend
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), ShutdownError> {
        info!(
            "Starting durability checks on {} every {}s ({:?})",
            self.context.object_path,
            self.interval.as_secs(),
            self.mode
        );

        // First check one full interval after start, then on every boundary
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        if self.mode == CheckMode::SingleFlight {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }
        let mut in_flight: JoinSet<CheckRecord> = JoinSet::new();
        self.transition(EngineState::Running);

        loop {
            // Single-flight leaves the ticker unpolled while a check runs
            let accepting = self.mode == CheckMode::Overlapping || in_flight.is_empty();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Got termination signal, shutting down");
                    break;
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        error!("Check task failed: {}", e);
                    }
                }
                _ = ticker.tick(), if accepting => {
                    let sequence = self.next_sequence();
                    let context = self.context.clone();
                    in_flight.spawn(async move { context.run(sequence).await });
                }
            }
        }

        self.transition(EngineState::ShuttingDown);
        drop(ticker);
        self.drain(&mut in_flight).await;

        let summary = self.context.status.summary();
        info!(
            "Ran {} durability check(s), {} passed ({:.2}%)",
            summary.attempts, summary.successes, summary.success_percentage
        );

        let result = close_all(self.context.backend.as_ref()).await;
        self.transition(EngineState::Stopped);
        result
    }

    /// Wait for checks in flight, aborting whatever outlives the grace period
    async fn drain(&self, in_flight: &mut JoinSet<CheckRecord>) {
        if in_flight.is_empty() {
            return;
        }
        info!("Waiting up to {:?} for {} check(s) in flight", self.shutdown_grace, in_flight.len());

        let finished = time::timeout(self.shutdown_grace, async {
            while let Some(joined) = in_flight.join_next().await {
                if let Err(e) = joined {
                    error!("Check task failed: {}", e);
                }
            }
        })
        .await;

        if finished.is_err() {
            warn!("Abandoning {} check(s) still running after {:?}", in_flight.len(), self.shutdown_grace);
            in_flight.abort_all();
            while in_flight.join_next().await.is_some() {}
        }
    }

    /// Start the engine on the runtime
    pub fn spawn(self, cancel: CancellationToken) -> EngineHandle {
        let state = self.subscribe();
        let task = tokio::spawn(self.run(cancel));
        EngineHandle { task, state }
    }
}

/// Running engine
pub struct EngineHandle {
    task: JoinHandle<Result<(), ShutdownError>>,
    state: watch::Receiver<EngineState>,
}

impl EngineHandle {
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Wait for the engine to finish its shutdown sequence
    pub async fn wait(self) -> Result<(), EngineError> {
        self.task.await??;
        Ok(())
    }
}
