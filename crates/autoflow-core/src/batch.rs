//! Batches: ordered groups of task references executed together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Conflict, ValidationError};
use crate::ids::{BatchId, TaskId};
use crate::run::ExecutionContext;
use crate::status::{BatchStatus, ExecutionMode, ItemStatus};

/// Aggregate item counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Number of items; fixed at creation.
    pub total: usize,
    /// Items that finished successfully.
    pub completed: usize,
    /// Items that failed.
    pub failed: usize,
}

impl Progress {
    /// True once every item has a terminal outcome.
    pub fn is_done(&self) -> bool {
        self.completed + self.failed == self.total
    }
}

/// One task slot within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Position in execution order.
    pub index: usize,
    /// Referenced task.
    pub task: TaskId,
    /// Task name at the time the batch was created.
    pub task_name: String,
    /// Outcome of this item in the current run.
    pub status: ItemStatus,
    /// Why the item failed, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A named group of task references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub name: String,
    #[serde(flatten)]
    pub context: ExecutionContext,
    pub mode: ExecutionMode,
    pub status: BatchStatus,
    pub progress: Progress,
    pub items: Vec<BatchItem>,
    /// Number of times the batch has been started.
    pub run_count: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Batch {
    /// Create a pending batch with one item per `(task, name)` pair, in order.
    pub fn new(
        name: impl Into<String>,
        tasks: Vec<(TaskId, String)>,
        context: ExecutionContext,
        mode: ExecutionMode,
    ) -> Result<Self, ValidationError> {
        if tasks.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }

        let items: Vec<BatchItem> = tasks
            .into_iter()
            .enumerate()
            .map(|(index, (task, task_name))| BatchItem {
                index,
                task,
                task_name,
                status: ItemStatus::Pending,
                error: None,
            })
            .collect();

        Ok(Self {
            id: BatchId::generate(),
            name: name.into(),
            context,
            mode,
            status: BatchStatus::Pending,
            progress: Progress {
                total: items.len(),
                completed: 0,
                failed: 0,
            },
            items,
            run_count: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        })
    }

    /// Enter the Running state, resetting items and counters.
    ///
    /// A terminal batch may be started again.
    pub fn begin_run(&mut self) -> Result<(), Conflict> {
        if self.status == BatchStatus::Running {
            return Err(Conflict::BatchRunning);
        }
        for item in &mut self.items {
            item.status = ItemStatus::Pending;
            item.error = None;
        }
        self.progress.completed = 0;
        self.progress.failed = 0;
        self.status = BatchStatus::Running;
        self.run_count += 1;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        Ok(())
    }

    /// Move a pending item to Running.
    pub fn mark_running(&mut self, index: usize) -> bool {
        if self.status != BatchStatus::Running {
            return false;
        }
        match self.items.get_mut(index) {
            Some(item) if item.status == ItemStatus::Pending => {
                item.status = ItemStatus::Running;
                true
            }
            _ => false,
        }
    }

    /// Record the terminal outcome of an item.
    ///
    /// Each item is counted at most once per run. When the last item lands
    /// the batch becomes Failed if every item failed, otherwise Completed.
    pub fn record_outcome(&mut self, index: usize, outcome: Result<(), String>) -> bool {
        if self.status != BatchStatus::Running {
            return false;
        }
        let Some(item) = self.items.get_mut(index) else {
            return false;
        };
        if item.status.is_terminal() {
            return false;
        }

        match outcome {
            Ok(()) => {
                item.status = ItemStatus::Completed;
                self.progress.completed += 1;
            }
            Err(error) => {
                item.status = ItemStatus::Failed;
                item.error = Some(error);
                self.progress.failed += 1;
            }
        }

        if self.progress.is_done() {
            self.status = if self.progress.failed == self.progress.total {
                BatchStatus::Failed
            } else {
                BatchStatus::Completed
            };
            self.finished_at = Some(Utc::now());
        }
        true
    }

    /// True once the batch has finished a run.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(n: usize) -> Batch {
        let tasks = (0..n)
            .map(|i| (TaskId::new(format!("t{i}.json")), format!("Task {i}")))
            .collect();
        Batch::new(
            "nightly",
            tasks,
            ExecutionContext::for_company("ACME"),
            ExecutionMode::Sequential,
        )
        .unwrap()
    }

    #[test]
    fn test_empty_batch_rejected() {
        let err = Batch::new(
            "empty",
            vec![],
            ExecutionContext::default(),
            ExecutionMode::Sequential,
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::EmptyBatch);
    }

    #[test]
    fn test_new_batch_is_pending_and_ordered() {
        let b = batch(3);
        assert_eq!(b.status, BatchStatus::Pending);
        assert_eq!(b.progress.total, 3);
        assert_eq!(
            b.items.iter().map(|i| i.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(b.items.iter().all(|i| i.status == ItemStatus::Pending));
    }

    #[test]
    fn test_partial_failure_completes() {
        let mut b = batch(3);
        b.begin_run().unwrap();
        b.record_outcome(0, Ok(()));
        b.record_outcome(1, Err("timeout".into()));
        assert_eq!(b.status, BatchStatus::Running);
        b.record_outcome(2, Ok(()));
        assert_eq!(
            b.progress,
            Progress {
                total: 3,
                completed: 2,
                failed: 1
            }
        );
        assert_eq!(b.status, BatchStatus::Completed);
        assert!(b.finished_at.is_some());
    }

    #[test]
    fn test_all_failed_fails() {
        let mut b = batch(2);
        b.begin_run().unwrap();
        b.record_outcome(0, Err("a".into()));
        b.record_outcome(1, Err("b".into()));
        assert_eq!(
            b.progress,
            Progress {
                total: 2,
                completed: 0,
                failed: 2
            }
        );
        assert_eq!(b.status, BatchStatus::Failed);
        assert_eq!(b.items[1].error.as_deref(), Some("b"));
    }

    #[test]
    fn test_outcome_counted_once() {
        let mut b = batch(2);
        b.begin_run().unwrap();
        assert!(b.record_outcome(0, Ok(())));
        assert!(!b.record_outcome(0, Err("again".into())));
        assert_eq!(b.progress.completed, 1);
        assert_eq!(b.progress.failed, 0);
        assert!(b.progress.completed + b.progress.failed <= b.progress.total);
    }

    #[test]
    fn test_outcome_ignored_when_not_running() {
        let mut b = batch(1);
        assert!(!b.record_outcome(0, Ok(())));
        assert!(!b.mark_running(0));
        assert_eq!(b.progress.completed, 0);
    }

    #[test]
    fn test_begin_run_conflicts_while_running() {
        let mut b = batch(1);
        b.begin_run().unwrap();
        assert_eq!(b.begin_run(), Err(Conflict::BatchRunning));
    }

    #[test]
    fn test_restart_resets_progress() {
        let mut b = batch(2);
        b.begin_run().unwrap();
        b.record_outcome(0, Err("x".into()));
        b.record_outcome(1, Ok(()));
        assert!(b.is_terminal());

        b.begin_run().unwrap();
        assert_eq!(b.run_count, 2);
        assert_eq!(b.progress.completed + b.progress.failed, 0);
        assert_eq!(b.progress.total, 2);
        assert!(b.items.iter().all(|i| i.status == ItemStatus::Pending && i.error.is_none()));
    }

    #[test]
    fn test_serialized_shape() {
        let b = batch(1);
        let v = serde_json::to_value(&b).unwrap();
        assert_eq!(v["company_name"], "ACME");
        assert_eq!(v["status"], "pending");
        assert_eq!(v["mode"], "sequential");
        assert_eq!(v["progress"]["total"], 1);
        assert_eq!(v["items"][0]["task"], "t0.json");
        assert_eq!(v["items"][0]["index"], 0);
    }
}
