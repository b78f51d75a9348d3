//! Status poller.
//!
//! Keeps at most one observation loop per watched entity. Each loop reads the
//! entity's status on a fixed interval, publishes it on the notification
//! channel, and exits once the entity stops running or disappears.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use autoflow_core::{Batch, BatchId, BatchStatus, CoreError, RunStatusView, TaskId};

use crate::coordinator::ExecutionCoordinator;
use crate::orchestrator::BatchOrchestrator;

/// Entity observed by a poll loop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WatchKey {
    Task(TaskId),
    Batch(BatchId),
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Task(id) => write!(f, "task:{id}"),
            Self::Batch(id) => write!(f, "batch:{id}"),
        }
    }
}

/// Status snapshot published by a poll loop.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusUpdate {
    Task {
        task_id: TaskId,
        #[serde(flatten)]
        status: RunStatusView,
    },
    Batch {
        #[serde(flatten)]
        batch: Batch,
    },
}

impl StatusUpdate {
    /// Event name used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Task { .. } => "task",
            Self::Batch { .. } => "batch",
        }
    }

    /// True when observation can stop.
    pub fn is_final(&self) -> bool {
        match self {
            Self::Task { status, .. } => !status.running,
            Self::Batch { batch } => batch.status != BatchStatus::Running,
        }
    }
}

struct LoopEntry {
    generation: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct LoopTable {
    next_generation: u64,
    entries: HashMap<WatchKey, LoopEntry>,
}

/// Registry of observation loops.
pub struct StatusPoller {
    coordinator: Arc<ExecutionCoordinator>,
    orchestrator: Arc<BatchOrchestrator>,
    loops: Arc<Mutex<LoopTable>>,
    updates: broadcast::Sender<StatusUpdate>,
    task_interval: Duration,
    batch_interval: Duration,
}

impl StatusPoller {
    pub fn new(
        coordinator: Arc<ExecutionCoordinator>,
        orchestrator: Arc<BatchOrchestrator>,
        task_interval: Duration,
        batch_interval: Duration,
        capacity: usize,
    ) -> Self {
        let (updates, _) = broadcast::channel(capacity);
        Self {
            coordinator,
            orchestrator,
            loops: Arc::new(Mutex::new(LoopTable::default())),
            updates,
            task_interval,
            batch_interval,
        }
    }

    /// Subscribe to published status updates.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.updates.subscribe()
    }

    /// Start observing `key`, replacing any loop already observing it.
    ///
    /// Once this returns, the replaced loop publishes nothing further.
    pub async fn watch(&self, key: WatchKey) {
        let mut table = self.loops.lock().await;
        if let Some(previous) = table.entries.remove(&key) {
            previous.cancel.cancel();
            debug!(key = %key, "Replacing poll loop");
        }

        table.next_generation += 1;
        let generation = table.next_generation;
        let cancel = CancellationToken::new();
        table.entries.insert(
            key.clone(),
            LoopEntry {
                generation,
                cancel: cancel.clone(),
            },
        );
        drop(table);

        let period = match key {
            WatchKey::Task(_) => self.task_interval,
            WatchKey::Batch(_) => self.batch_interval,
        };
        let poll = PollLoop {
            key: key.clone(),
            generation,
            cancel,
            period,
            coordinator: self.coordinator.clone(),
            orchestrator: self.orchestrator.clone(),
            loops: self.loops.clone(),
            updates: self.updates.clone(),
        };
        tokio::spawn(poll.run());
        debug!(key = %key, generation, "Poll loop started");
    }

    /// Stop observing `key`.
    pub async fn stop(&self, key: &WatchKey) -> bool {
        match self.loops.lock().await.entries.remove(key) {
            Some(entry) => {
                entry.cancel.cancel();
                debug!(key = %key, "Poll loop stopped");
                true
            }
            None => false,
        }
    }

    pub async fn is_watching(&self, key: &WatchKey) -> bool {
        self.loops.lock().await.entries.contains_key(key)
    }

    pub async fn active_keys(&self) -> Vec<WatchKey> {
        self.loops.lock().await.entries.keys().cloned().collect()
    }
}

struct PollLoop {
    key: WatchKey,
    generation: u64,
    cancel: CancellationToken,
    period: Duration,
    coordinator: Arc<ExecutionCoordinator>,
    orchestrator: Arc<BatchOrchestrator>,
    loops: Arc<Mutex<LoopTable>>,
    updates: broadcast::Sender<StatusUpdate>,
}

impl PollLoop {
    async fn run(self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let update = match self.read().await {
                Ok(update) => update,
                Err(e) => {
                    debug!(key = %self.key, error = %e, "Watched entity unavailable");
                    break;
                }
            };
            let is_final = update.is_final();

            {
                // A replaced loop must not publish once `watch` has returned.
                let _table = self.loops.lock().await;
                if self.cancel.is_cancelled() {
                    break;
                }
                let receivers = self.updates.send(update).unwrap_or(0);
                trace!(key = %self.key, receivers, "Status published");
            }

            if is_final {
                break;
            }
        }

        let mut table = self.loops.lock().await;
        if table
            .entries
            .get(&self.key)
            .is_some_and(|entry| entry.generation == self.generation)
        {
            table.entries.remove(&self.key);
            debug!(key = %self.key, "Poll loop finished");
        }
    }

    async fn read(&self) -> Result<StatusUpdate, CoreError> {
        match &self.key {
            WatchKey::Task(task_id) => {
                let status = self.coordinator.status(task_id).await?;
                Ok(StatusUpdate::Task {
                    task_id: task_id.clone(),
                    status,
                })
            }
            WatchKey::Batch(batch_id) => {
                let batch = self.orchestrator.get(batch_id).await?;
                Ok(StatusUpdate::Batch { batch })
            }
        }
    }
}
