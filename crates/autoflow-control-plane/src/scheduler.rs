//! Repeat scheduler for batches.
//!
//! Each schedule owns one timer loop. A tick starts the batch unless a
//! previous run is still active, in which case the tick is skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use autoflow_core::{BatchId, Conflict, CoreError, Schedule};

use crate::orchestrator::BatchOrchestrator;

struct ScheduleEntry {
    schedule: Schedule,
    cancel: CancellationToken,
    generation: u64,
}

#[derive(Default)]
struct BookEntries {
    by_batch: HashMap<BatchId, ScheduleEntry>,
    next_generation: u64,
}

/// Active schedules keyed by batch.
#[derive(Clone, Default)]
pub struct ScheduleBook {
    entries: Arc<Mutex<BookEntries>>,
}

impl ScheduleBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a schedule and stop its timer.
    pub async fn remove(&self, batch_id: &BatchId) -> bool {
        match self.entries.lock().await.by_batch.remove(batch_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn get(&self, batch_id: &BatchId) -> Option<Schedule> {
        self.entries
            .lock()
            .await
            .by_batch
            .get(batch_id)
            .map(|entry| entry.schedule.clone())
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.by_batch.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.by_batch.is_empty()
    }

    /// Install a schedule, stopping the timer of any schedule it replaces.
    ///
    /// Returns the generation tag of the new entry.
    async fn install(&self, schedule: Schedule, cancel: CancellationToken) -> u64 {
        let batch_id = schedule.batch_id.clone();
        let mut entries = self.entries.lock().await;
        entries.next_generation += 1;
        let generation = entries.next_generation;
        let previous = entries.by_batch.insert(
            batch_id.clone(),
            ScheduleEntry {
                schedule,
                cancel,
                generation,
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
            debug!(batch_id = %batch_id, "Replaced existing schedule");
        }
        generation
    }

    /// Record a fire against the current entry, or only against
    /// `generation` when one is given.
    async fn record_fire(&self, batch_id: &BatchId, generation: Option<u64>, skipped: bool) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.by_batch.get_mut(batch_id) {
            if generation.map_or(true, |g| g == entry.generation) {
                entry.schedule.record_fire(Utc::now(), skipped);
            }
        }
    }

    async fn remove_generation(&self, batch_id: &BatchId, generation: Option<u64>) {
        let mut entries = self.entries.lock().await;
        let current = entries
            .by_batch
            .get(batch_id)
            .is_some_and(|entry| generation.map_or(true, |g| g == entry.generation));
        if current {
            if let Some(entry) = entries.by_batch.remove(batch_id) {
                entry.cancel.cancel();
            }
        }
    }
}

/// Result of one scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The batch was started.
    Started,
    /// The batch was still running; nothing was started.
    Skipped,
    /// The batch no longer exists; the schedule was removed.
    Dropped,
}

/// Attaches repeat timers to batches.
#[derive(Clone)]
pub struct Scheduler {
    orchestrator: Arc<BatchOrchestrator>,
    book: ScheduleBook,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<BatchOrchestrator>, book: ScheduleBook) -> Self {
        Self { orchestrator, book }
    }

    /// Attach (or replace) the repeat schedule of a batch.
    ///
    /// The first tick fires one interval after this call.
    pub async fn set_schedule(
        &self,
        batch_id: &BatchId,
        interval_seconds: i64,
    ) -> Result<Schedule, CoreError> {
        let schedule = Schedule::new(batch_id.clone(), interval_seconds)?;
        self.orchestrator.get(batch_id).await?;

        let period = Duration::from_secs(schedule.interval_seconds);
        let cancel = CancellationToken::new();
        let generation = self.book.install(schedule.clone(), cancel.clone()).await;

        let scheduler = self.clone();
        let id = batch_id.clone();
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if scheduler.fire(&id, Some(generation)).await == TickOutcome::Dropped {
                            break;
                        }
                    }
                }
            }
            debug!(batch_id = %id, generation, "Schedule timer stopped");
        });

        info!(batch_id = %batch_id, interval_seconds = schedule.interval_seconds, "Schedule set");
        Ok(schedule)
    }

    /// Remove the schedule of a batch.
    pub async fn clear_schedule(&self, batch_id: &BatchId) -> bool {
        let removed = self.book.remove(batch_id).await;
        if removed {
            info!(batch_id = %batch_id, "Schedule cleared");
        }
        removed
    }

    pub async fn get_schedule(&self, batch_id: &BatchId) -> Option<Schedule> {
        self.book.get(batch_id).await
    }

    /// Number of active schedules.
    pub async fn active_count(&self) -> usize {
        self.book.len().await
    }

    /// Fire one tick for a batch.
    pub async fn tick(&self, batch_id: &BatchId) -> TickOutcome {
        self.fire(batch_id, None).await
    }

    /// Fire a tick on behalf of the timer with tag `generation`.
    ///
    /// A timer that has been replaced still starts the batch but leaves
    /// the newer schedule's bookkeeping alone.
    async fn fire(&self, batch_id: &BatchId, generation: Option<u64>) -> TickOutcome {
        match self.orchestrator.start(batch_id).await {
            Ok(()) => {
                self.book.record_fire(batch_id, generation, false).await;
                info!(batch_id = %batch_id, "Scheduled batch run started");
                TickOutcome::Started
            }
            Err(CoreError::Conflict(Conflict::BatchRunning)) => {
                self.book.record_fire(batch_id, generation, true).await;
                debug!(batch_id = %batch_id, "Previous run still active, tick skipped");
                TickOutcome::Skipped
            }
            Err(e) if e.is_not_found() => {
                self.book.remove_generation(batch_id, generation).await;
                warn!(batch_id = %batch_id, "Scheduled batch no longer exists, schedule dropped");
                TickOutcome::Dropped
            }
            Err(e) => {
                self.book.record_fire(batch_id, generation, true).await;
                warn!(batch_id = %batch_id, error = %e, "Scheduled batch could not start");
                TickOutcome::Skipped
            }
        }
    }
}
