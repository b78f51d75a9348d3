//! Execution coordinator.
//!
//! Owns the per-task run table. At most one non-terminal run exists per task;
//! the last terminal run is retained until the task is started again or
//! deleted.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

use autoflow_core::{
    Conflict, CoreError, ExecutionContext, RunId, RunState, RunStatusView, TaskId, TaskRun,
};

use crate::engine::{ExecutionEngine, ExecutionRequest};
use crate::registry::TaskRegistry;

/// Buffer size of the per-run log channel.
const LOG_BUFFER: usize = 64;

/// Terminal outcome of a run, as observed by a [`RunHandle`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub state: RunState,
    pub error: Option<String>,
}

impl RunOutcome {
    fn running() -> Self {
        Self {
            state: RunState::Running,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }
}

struct RunSlot {
    run: TaskRun,
    outcome_tx: watch::Sender<RunOutcome>,
}

/// Current and retained runs, keyed by task.
#[derive(Clone, Default)]
pub struct RunTable {
    slots: Arc<Mutex<HashMap<TaskId, RunSlot>>>,
}

impl RunTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the task has a non-terminal run.
    pub async fn is_active(&self, task_id: &TaskId) -> bool {
        self.slots
            .lock()
            .await
            .get(task_id)
            .is_some_and(|slot| slot.run.state.is_active())
    }

    /// Tasks with a non-terminal run.
    pub async fn active_task_ids(&self) -> Vec<TaskId> {
        let slots = self.slots.lock().await;
        let mut ids: Vec<TaskId> = slots
            .iter()
            .filter(|(_, slot)| slot.run.state.is_active())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Count runs by state.
    pub async fn count_by_state(&self) -> HashMap<RunState, usize> {
        let slots = self.slots.lock().await;
        let mut counts = HashMap::new();
        for slot in slots.values() {
            *counts.entry(slot.run.state).or_insert(0) += 1;
        }
        counts
    }

    /// Discard the retained run of a task.
    ///
    /// Refused while the task's run is active.
    pub(crate) async fn release(&self, task_id: &TaskId) -> Result<(), Conflict> {
        let mut slots = self.slots.lock().await;
        if slots
            .get(task_id)
            .is_some_and(|slot| slot.run.state.is_active())
        {
            return Err(Conflict::TaskRunning);
        }
        slots.remove(task_id);
        Ok(())
    }

    async fn append_log(&self, task_id: &TaskId, run_id: &RunId, line: String) {
        let mut slots = self.slots.lock().await;
        match slots.get_mut(task_id) {
            Some(slot) if &slot.run.run_id == run_id => {
                slot.run.log(line);
            }
            _ => debug!(task_id = %task_id, run_id = %run_id, "Dropping log line for stale run"),
        }
    }

    /// Move the run to its terminal state. Returns `None` if the run is no
    /// longer the current one for the task.
    async fn finish(
        &self,
        task_id: &TaskId,
        run_id: &RunId,
        outcome: Result<Value, String>,
    ) -> Option<RunState> {
        let mut slots = self.slots.lock().await;
        let slot = slots.get_mut(task_id)?;
        if &slot.run.run_id != run_id {
            return None;
        }

        match outcome {
            Ok(result) => {
                slot.run.log("Task completed");
                slot.run.complete(result);
            }
            Err(message) => {
                slot.run.log(format!("Task failed: {message}"));
                slot.run.fail(message);
            }
        }

        let state = slot.run.state;
        slot.outcome_tx.send_replace(RunOutcome {
            state,
            error: slot.run.error.clone(),
        });
        Some(state)
    }
}

/// Handle to a started run.
#[derive(Debug)]
pub struct RunHandle {
    pub task_id: TaskId,
    pub run_id: RunId,
    outcome_rx: watch::Receiver<RunOutcome>,
}

impl RunHandle {
    /// Last observed state.
    pub fn state(&self) -> RunState {
        self.outcome_rx.borrow().state
    }

    /// Wait for the run to reach a terminal state.
    pub async fn wait(mut self) -> RunOutcome {
        let outcome = match self.outcome_rx.wait_for(|o| o.state.is_terminal()).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => RunOutcome {
                state: RunState::Failed,
                error: Some("run was discarded".to_string()),
            },
        };
        outcome
    }
}

/// Starts task runs and serves their status.
pub struct ExecutionCoordinator {
    registry: Arc<TaskRegistry>,
    runs: RunTable,
    engine: Arc<dyn ExecutionEngine>,
}

impl ExecutionCoordinator {
    pub fn new(
        registry: Arc<TaskRegistry>,
        runs: RunTable,
        engine: Arc<dyn ExecutionEngine>,
    ) -> Self {
        Self {
            registry,
            runs,
            engine,
        }
    }

    /// Run table shared with the registry.
    pub fn runs(&self) -> &RunTable {
        &self.runs
    }

    /// Start a run of `task_id`.
    ///
    /// Fails with not-found for an unknown task, and with a conflict if the
    /// task is disabled or already has a non-terminal run. The check and the
    /// insert happen under one lock, so concurrent starts admit exactly one.
    pub async fn start(
        &self,
        task_id: &TaskId,
        context: ExecutionContext,
    ) -> Result<RunHandle, CoreError> {
        // Lock order: registry, then run table.
        let tasks = self.registry.read().await;
        let task = tasks
            .get(task_id)
            .ok_or_else(|| CoreError::TaskNotFound(task_id.clone()))?;

        if task.disabled {
            warn!(task_id = %task_id, "Refusing to start disabled task");
            return Err(Conflict::Disabled.into());
        }

        let mut slots = self.runs.slots.lock().await;
        if slots
            .get(task_id)
            .is_some_and(|slot| slot.run.state.is_active())
        {
            debug!(task_id = %task_id, "Task already running");
            return Err(Conflict::AlreadyRunning.into());
        }

        let mut run = TaskRun::start(task_id.clone(), context.clone());
        run.log(format!(
            "Starting task '{}' ({} actions)",
            task.name,
            task.actions.len()
        ));
        if let Some(company) = &context.company_name {
            run.log(format!("Company: {company}"));
        }
        let run_id = run.run_id.clone();

        let (outcome_tx, outcome_rx) = watch::channel(RunOutcome::running());
        slots.insert(task_id.clone(), RunSlot { run, outcome_tx });

        let request = ExecutionRequest {
            run_id: run_id.clone(),
            task: task.clone(),
            company_name: context.company_name,
        };
        drop(slots);
        drop(tasks);

        info!(task_id = %task_id, run_id = %run_id, "Run started");
        self.dispatch(request);

        Ok(RunHandle {
            task_id: task_id.clone(),
            run_id,
            outcome_rx,
        })
    }

    /// Tasks that currently have a non-terminal run.
    pub async fn active_runs(&self) -> Vec<TaskId> {
        self.runs.active_task_ids().await
    }

    /// Status of the current or last run of a task.
    pub async fn status(&self, task_id: &TaskId) -> Result<RunStatusView, CoreError> {
        self.runs
            .slots
            .lock()
            .await
            .get(task_id)
            .map(|slot| slot.run.status())
            .ok_or_else(|| CoreError::RunNotFound(task_id.clone()))
    }

    /// Hand the run to the engine in the background.
    ///
    /// Engine errors and panics both end the run as Failed.
    fn dispatch(&self, request: ExecutionRequest) {
        let engine = self.engine.clone();
        let runs = self.runs.clone();
        let task_id = request.task.id.clone();
        let run_id = request.run_id.clone();

        tokio::spawn(async move {
            let (log_tx, mut log_rx) = mpsc::channel(LOG_BUFFER);
            let execution = tokio::spawn(async move { engine.execute(request, log_tx).await });

            while let Some(line) = log_rx.recv().await {
                runs.append_log(&task_id, &run_id, line).await;
            }

            let outcome = match execution.await {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(e)) => Err(e.to_string()),
                Err(e) => {
                    error!(task_id = %task_id, run_id = %run_id, error = %e, "Engine task aborted");
                    Err(format!("execution aborted: {e}"))
                }
            };

            match runs.finish(&task_id, &run_id, outcome).await {
                Some(state) => info!(task_id = %task_id, run_id = %run_id, state = ?state, "Run finished"),
                None => debug!(task_id = %task_id, run_id = %run_id, "Run superseded before finishing"),
            }
        });
    }
}
