//! Task registry.

use std::collections::HashMap;

use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info};

use autoflow_core::{Conflict, CoreError, Task, TaskDraft, TaskId, TaskPatch};

use crate::coordinator::RunTable;

/// Tasks indexed by id, remembering insertion order.
#[derive(Default)]
pub struct TaskStore {
    by_id: HashMap<TaskId, Task>,
    order: Vec<TaskId>,
}

impl TaskStore {
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.by_id.get(id)
    }

    /// Tasks in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Store of task definitions.
pub struct TaskRegistry {
    tasks: RwLock<TaskStore>,
    runs: RunTable,
}

impl TaskRegistry {
    pub fn new(runs: RunTable) -> Self {
        Self {
            tasks: RwLock::new(TaskStore::default()),
            runs,
        }
    }

    /// Read access to the store, for callers that must check a task and act
    /// on it atomically.
    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, TaskStore> {
        self.tasks.read().await
    }

    /// Validate and insert a new task.
    pub async fn create(&self, draft: TaskDraft) -> Result<Task, CoreError> {
        let task = Task::from_draft(draft)?;

        let mut tasks = self.tasks.write().await;
        if tasks.by_id.contains_key(&task.id) {
            return Err(Conflict::TaskExists.into());
        }
        tasks.order.push(task.id.clone());
        tasks.by_id.insert(task.id.clone(), task.clone());

        info!(task_id = %task.id, actions = task.actions.len(), "Task created");
        Ok(task)
    }

    pub async fn get(&self, id: &TaskId) -> Result<Task, CoreError> {
        self.tasks
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::TaskNotFound(id.clone()))
    }

    /// All tasks in insertion order.
    pub async fn list(&self) -> Vec<Task> {
        self.tasks.read().await.iter().cloned().collect()
    }

    /// Replace the supplied fields of a task.
    pub async fn update(&self, id: &TaskId, patch: TaskPatch) -> Result<Task, CoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .by_id
            .get_mut(id)
            .ok_or_else(|| CoreError::TaskNotFound(id.clone()))?;
        task.apply(patch)?;

        info!(task_id = %id, "Task updated");
        Ok(task.clone())
    }

    /// Set the disabled flag. Setting the current value is a no-op.
    pub async fn toggle(&self, id: &TaskId, disabled: bool) -> Result<Task, CoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .by_id
            .get_mut(id)
            .ok_or_else(|| CoreError::TaskNotFound(id.clone()))?;

        if task.disabled != disabled {
            task.disabled = disabled;
            info!(task_id = %id, disabled, "Task toggled");
        } else {
            debug!(task_id = %id, disabled, "Task already in requested state");
        }
        Ok(task.clone())
    }

    /// Remove a task and its retained run.
    ///
    /// Refused while the task has a non-terminal run.
    pub async fn delete(&self, id: &TaskId) -> Result<(), CoreError> {
        let mut tasks = self.tasks.write().await;
        if !tasks.by_id.contains_key(id) {
            return Err(CoreError::TaskNotFound(id.clone()));
        }
        self.runs.release(id).await?;

        tasks.by_id.remove(id);
        tasks.order.retain(|t| t != id);

        info!(task_id = %id, "Task deleted");
        Ok(())
    }

    /// Number of tasks as `(enabled, disabled)`.
    pub async fn counts(&self) -> (usize, usize) {
        let tasks = self.tasks.read().await;
        let disabled = tasks.iter().filter(|t| t.disabled).count();
        (tasks.len() - disabled, disabled)
    }
}
