//! Batch orchestrator.
//!
//! Drives the items of a batch through the execution coordinator, either one
//! at a time or all at once, and aggregates their outcomes into the batch
//! status.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use autoflow_core::{
    Batch, BatchId, BatchStatus, Conflict, CoreError, ExecutionContext, ExecutionMode, TaskId,
    ValidationError,
};

use crate::coordinator::ExecutionCoordinator;
use crate::registry::TaskRegistry;
use crate::scheduler::ScheduleBook;

/// Parameters for a new batch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewBatch {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<TaskId>,
    #[serde(flatten)]
    pub context: ExecutionContext,
    #[serde(default)]
    pub mode: ExecutionMode,
}

#[derive(Default)]
struct BatchStore {
    by_id: HashMap<BatchId, Batch>,
    order: Vec<BatchId>,
}

/// Creates, starts and tracks batches.
pub struct BatchOrchestrator {
    batches: Arc<RwLock<BatchStore>>,
    registry: Arc<TaskRegistry>,
    coordinator: Arc<ExecutionCoordinator>,
    schedules: ScheduleBook,
}

impl BatchOrchestrator {
    pub fn new(
        registry: Arc<TaskRegistry>,
        coordinator: Arc<ExecutionCoordinator>,
        schedules: ScheduleBook,
    ) -> Self {
        Self {
            batches: Arc::new(RwLock::new(BatchStore::default())),
            registry,
            coordinator,
            schedules,
        }
    }

    /// Create a pending batch.
    ///
    /// Every referenced task must exist and be enabled.
    pub async fn create(&self, request: NewBatch) -> Result<Batch, CoreError> {
        if request.tasks.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }

        let entries = {
            let tasks = self.registry.read().await;
            let mut entries = Vec::with_capacity(request.tasks.len());
            for id in request.tasks {
                let task = tasks
                    .get(&id)
                    .ok_or_else(|| ValidationError::UnknownTask(id.clone()))?;
                if task.disabled {
                    return Err(ValidationError::DisabledTask(id).into());
                }
                let name = task.name.clone();
                entries.push((id, name));
            }
            entries
        };

        let name = if request.name.trim().is_empty() {
            format!("Batch of {} tasks", entries.len())
        } else {
            request.name
        };
        let batch = Batch::new(name, entries, request.context, request.mode)?;

        let mut batches = self.batches.write().await;
        batches.order.push(batch.id.clone());
        batches.by_id.insert(batch.id.clone(), batch.clone());

        info!(
            batch_id = %batch.id,
            items = batch.items.len(),
            mode = ?batch.mode,
            "Batch created"
        );
        Ok(batch)
    }

    /// Start a batch in the background.
    ///
    /// A terminal batch is reset and run again.
    pub async fn start(&self, id: &BatchId) -> Result<(), CoreError> {
        let (mode, context, items) = {
            let mut batches = self.batches.write().await;
            let batch = batches
                .by_id
                .get_mut(id)
                .ok_or_else(|| CoreError::BatchNotFound(id.clone()))?;
            batch.begin_run()?;
            let items: Vec<(usize, TaskId)> = batch
                .items
                .iter()
                .map(|item| (item.index, item.task.clone()))
                .collect();
            (batch.mode, batch.context.clone(), items)
        };

        info!(batch_id = %id, mode = ?mode, items = items.len(), "Batch started");

        let driver = BatchDriver {
            batch_id: id.clone(),
            batches: self.batches.clone(),
            coordinator: self.coordinator.clone(),
            context,
        };
        tokio::spawn(driver.run(mode, items));
        Ok(())
    }

    pub async fn get(&self, id: &BatchId) -> Result<Batch, CoreError> {
        self.batches
            .read()
            .await
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::BatchNotFound(id.clone()))
    }

    /// All batches in creation order.
    pub async fn list(&self) -> Vec<Batch> {
        let batches = self.batches.read().await;
        batches
            .order
            .iter()
            .filter_map(|id| batches.by_id.get(id))
            .cloned()
            .collect()
    }

    /// Remove a batch and its schedule. Refused while the batch is running.
    pub async fn delete(&self, id: &BatchId) -> Result<(), CoreError> {
        {
            let mut batches = self.batches.write().await;
            let batch = batches
                .by_id
                .get(id)
                .ok_or_else(|| CoreError::BatchNotFound(id.clone()))?;
            if batch.status == BatchStatus::Running {
                return Err(Conflict::BatchRunning.into());
            }
            batches.by_id.remove(id);
            batches.order.retain(|b| b != id);
        }

        if self.schedules.remove(id).await {
            debug!(batch_id = %id, "Schedule removed with batch");
        }
        info!(batch_id = %id, "Batch deleted");
        Ok(())
    }

    /// Number of batches per status.
    pub async fn count_by_status(&self) -> HashMap<BatchStatus, usize> {
        let batches = self.batches.read().await;
        let mut counts = HashMap::new();
        for batch in batches.by_id.values() {
            *counts.entry(batch.status).or_insert(0) += 1;
        }
        counts
    }
}

/// Background driver for one batch run.
struct BatchDriver {
    batch_id: BatchId,
    batches: Arc<RwLock<BatchStore>>,
    coordinator: Arc<ExecutionCoordinator>,
    context: ExecutionContext,
}

impl BatchDriver {
    async fn run(self, mode: ExecutionMode, items: Vec<(usize, TaskId)>) {
        match mode {
            ExecutionMode::Sequential => {
                for (index, task_id) in items {
                    self.run_item(index, task_id).await;
                }
            }
            ExecutionMode::Parallel => {
                join_all(
                    items
                        .into_iter()
                        .map(|(index, task_id)| self.run_item(index, task_id)),
                )
                .await;
            }
        }

        if let Some(batch) = self.batches.read().await.by_id.get(&self.batch_id) {
            info!(
                batch_id = %self.batch_id,
                status = batch.status.as_str(),
                completed = batch.progress.completed,
                failed = batch.progress.failed,
                "Batch finished"
            );
        }
    }

    async fn run_item(&self, index: usize, task_id: TaskId) {
        if !self.update(|batch| batch.mark_running(index)).await {
            return;
        }

        let outcome = match self.coordinator.start(&task_id, self.context.clone()).await {
            Ok(handle) => {
                let outcome = handle.wait().await;
                if outcome.is_success() {
                    Ok(())
                } else {
                    Err(outcome
                        .error
                        .unwrap_or_else(|| "task failed".to_string()))
                }
            }
            Err(e) => {
                warn!(batch_id = %self.batch_id, task_id = %task_id, error = %e, "Batch item could not start");
                Err(e.to_string())
            }
        };

        debug!(batch_id = %self.batch_id, index, ok = outcome.is_ok(), "Batch item finished");
        self.update(|batch| batch.record_outcome(index, outcome)).await;
    }

    /// Apply `f` to the batch if it still exists.
    async fn update(&self, f: impl FnOnce(&mut Batch) -> bool) -> bool {
        let mut batches = self.batches.write().await;
        match batches.by_id.get_mut(&self.batch_id) {
            Some(batch) => f(batch),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use autoflow_core::{ItemStatus, Progress};

    use crate::coordinator::RunTable;
    use crate::engine::testing::{draft, Outcome, ScriptedEngine};

    struct Harness {
        registry: Arc<TaskRegistry>,
        coordinator: Arc<ExecutionCoordinator>,
        orchestrator: BatchOrchestrator,
        engine: Arc<ScriptedEngine>,
    }

    async fn harness(tasks: &[&str]) -> Harness {
        let runs = RunTable::new();
        let registry = Arc::new(TaskRegistry::new(runs.clone()));
        let engine = Arc::new(ScriptedEngine::new());
        let coordinator = Arc::new(ExecutionCoordinator::new(
            registry.clone(),
            runs,
            engine.clone(),
        ));
        let orchestrator =
            BatchOrchestrator::new(registry.clone(), coordinator.clone(), ScheduleBook::new());
        for id in tasks {
            registry.create(draft(id)).await.unwrap();
        }
        Harness {
            registry,
            coordinator,
            orchestrator,
            engine,
        }
    }

    fn new_batch(tasks: &[&str], mode: ExecutionMode) -> NewBatch {
        NewBatch {
            name: "nightly".into(),
            tasks: tasks.iter().map(|t| TaskId::new(*t)).collect(),
            context: ExecutionContext::for_company("ACME"),
            mode,
        }
    }

    async fn wait_terminal(orchestrator: &BatchOrchestrator, id: &BatchId) -> Batch {
        for _ in 0..500 {
            let batch = orchestrator.get(id).await.unwrap();
            if batch.is_terminal() {
                return batch;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("batch {id} did not finish");
    }

    #[tokio::test]
    async fn test_create_validates_tasks() {
        let h = harness(&["a.json", "b.json"]).await;

        let err = h
            .orchestrator
            .create(new_batch(&[], ExecutionMode::Sequential))
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::Validation(ValidationError::EmptyBatch));

        let err = h
            .orchestrator
            .create(new_batch(&["a.json", "x.json"], ExecutionMode::Sequential))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::Validation(ValidationError::UnknownTask(TaskId::new("x.json")))
        );

        h.registry.toggle(&TaskId::new("b.json"), true).await.unwrap();
        let err = h
            .orchestrator
            .create(new_batch(&["a.json", "b.json"], ExecutionMode::Sequential))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::Validation(ValidationError::DisabledTask(TaskId::new("b.json")))
        );
        assert!(h.orchestrator.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_captures_names_and_defaults_name() {
        let h = harness(&["a.json"]).await;
        let mut request = new_batch(&["a.json"], ExecutionMode::Sequential);
        request.name = "  ".into();
        let batch = h.orchestrator.create(request).await.unwrap();
        assert_eq!(batch.name, "Batch of 1 tasks");
        assert_eq!(batch.items[0].task_name, "Task a.json");
        assert_eq!(batch.status, BatchStatus::Pending);
    }

    #[tokio::test]
    async fn test_partial_failure_completes_batch() {
        let h = harness(&["a.json", "b.json", "c.json"]).await;
        h.engine.set("b.json", Outcome::Fail("captcha".into()));

        let batch = h
            .orchestrator
            .create(new_batch(
                &["a.json", "b.json", "c.json"],
                ExecutionMode::Sequential,
            ))
            .await
            .unwrap();
        h.orchestrator.start(&batch.id).await.unwrap();

        let done = wait_terminal(&h.orchestrator, &batch.id).await;
        assert_eq!(done.status, BatchStatus::Completed);
        assert_eq!(
            done.progress,
            Progress {
                total: 3,
                completed: 2,
                failed: 1
            }
        );
        assert_eq!(done.items[1].status, ItemStatus::Failed);
        assert_eq!(done.items[1].error.as_deref(), Some("captcha"));
    }

    #[tokio::test]
    async fn test_all_failed_fails_batch() {
        let h = harness(&["a.json", "b.json"]).await;
        h.engine.set("a.json", Outcome::Fail("x".into()));
        h.engine.set("b.json", Outcome::Unreachable);

        let batch = h
            .orchestrator
            .create(new_batch(&["a.json", "b.json"], ExecutionMode::Parallel))
            .await
            .unwrap();
        h.orchestrator.start(&batch.id).await.unwrap();

        let done = wait_terminal(&h.orchestrator, &batch.id).await;
        assert_eq!(done.status, BatchStatus::Failed);
        assert_eq!(done.progress.failed, 2);
        assert_eq!(done.progress.completed, 0);
    }

    #[tokio::test]
    async fn test_sequential_runs_one_at_a_time() {
        let h = harness(&["a.json", "b.json"]).await;
        h.engine.hold("a.json");

        let batch = h
            .orchestrator
            .create(new_batch(&["a.json", "b.json"], ExecutionMode::Sequential))
            .await
            .unwrap();
        h.orchestrator.start(&batch.id).await.unwrap();

        h.engine.wait_started(1).await;
        let snapshot = h.orchestrator.get(&batch.id).await.unwrap();
        assert_eq!(snapshot.items[0].status, ItemStatus::Running);
        assert_eq!(snapshot.items[1].status, ItemStatus::Pending);

        h.engine.release("a.json");
        h.engine.wait_started(2).await;
        let snapshot = h.orchestrator.get(&batch.id).await.unwrap();
        assert!(snapshot.items[0].status.is_terminal());

        let done = wait_terminal(&h.orchestrator, &batch.id).await;
        assert_eq!(done.status, BatchStatus::Completed);
        assert_eq!(
            h.engine.started(),
            vec![TaskId::new("a.json"), TaskId::new("b.json")]
        );
        assert_eq!(h.engine.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_parallel_starts_all_items() {
        let h = harness(&["a.json", "b.json", "c.json"]).await;
        for id in ["a.json", "b.json", "c.json"] {
            h.engine.hold(id);
        }

        let batch = h
            .orchestrator
            .create(new_batch(
                &["a.json", "b.json", "c.json"],
                ExecutionMode::Parallel,
            ))
            .await
            .unwrap();
        h.orchestrator.start(&batch.id).await.unwrap();

        h.engine.wait_started(3).await;
        assert_eq!(h.engine.max_in_flight(), 3);

        for id in ["a.json", "b.json", "c.json"] {
            h.engine.release(id);
        }
        let done = wait_terminal(&h.orchestrator, &batch.id).await;
        assert_eq!(done.progress.completed, 3);
    }

    #[tokio::test]
    async fn test_item_already_running_is_recorded_failed() {
        let h = harness(&["a.json", "b.json"]).await;
        h.engine.hold("a.json");
        let standalone = h
            .coordinator
            .start(&TaskId::new("a.json"), ExecutionContext::default())
            .await
            .unwrap();

        let batch = h
            .orchestrator
            .create(new_batch(&["a.json", "b.json"], ExecutionMode::Sequential))
            .await
            .unwrap();
        h.orchestrator.start(&batch.id).await.unwrap();

        let done = wait_terminal(&h.orchestrator, &batch.id).await;
        assert_eq!(done.status, BatchStatus::Completed);
        assert_eq!(done.items[0].status, ItemStatus::Failed);
        assert_eq!(done.items[0].error.as_deref(), Some("already_running"));
        assert_eq!(done.items[1].status, ItemStatus::Completed);

        h.engine.release("a.json");
        standalone.wait().await;
    }

    #[tokio::test]
    async fn test_start_conflicts_while_running_and_restarts_after() {
        let h = harness(&["a.json"]).await;
        h.engine.hold("a.json");

        let batch = h
            .orchestrator
            .create(new_batch(&["a.json"], ExecutionMode::Sequential))
            .await
            .unwrap();
        h.orchestrator.start(&batch.id).await.unwrap();

        let err = h.orchestrator.start(&batch.id).await.unwrap_err();
        assert_eq!(err.conflict(), Some(Conflict::BatchRunning));
        let err = h.orchestrator.delete(&batch.id).await.unwrap_err();
        assert_eq!(err.conflict(), Some(Conflict::BatchRunning));

        h.engine.release("a.json");
        wait_terminal(&h.orchestrator, &batch.id).await;

        h.orchestrator.start(&batch.id).await.unwrap();
        let again = wait_terminal(&h.orchestrator, &batch.id).await;
        assert_eq!(again.run_count, 2);
        assert_eq!(again.progress.completed, 1);
    }

    #[tokio::test]
    async fn test_delete_and_not_found() {
        let h = harness(&["a.json"]).await;
        let batch = h
            .orchestrator
            .create(new_batch(&["a.json"], ExecutionMode::Sequential))
            .await
            .unwrap();

        h.orchestrator.delete(&batch.id).await.unwrap();
        assert!(h.orchestrator.get(&batch.id).await.unwrap_err().is_not_found());
        assert!(h.orchestrator.start(&batch.id).await.unwrap_err().is_not_found());
        assert!(h.orchestrator.delete(&batch.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_in_creation_order() {
        let h = harness(&["a.json"]).await;
        let first = h
            .orchestrator
            .create(new_batch(&["a.json"], ExecutionMode::Sequential))
            .await
            .unwrap();
        let second = h
            .orchestrator
            .create(new_batch(&["a.json"], ExecutionMode::Parallel))
            .await
            .unwrap();

        let ids: Vec<BatchId> = h.orchestrator.list().await.into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        let counts = h.orchestrator.count_by_status().await;
        assert_eq!(counts.get(&BatchStatus::Pending), Some(&2));
    }
}
