//! Task runs and execution context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{RunId, TaskId};
use crate::status::RunState;

/// Caller-supplied context for one execution, e.g. the company being queried.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Company the task should be run against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
}

impl ExecutionContext {
    /// Context targeting a company.
    pub fn for_company(company_name: impl Into<String>) -> Self {
        Self {
            company_name: Some(company_name.into()),
        }
    }
}

/// One execution attempt of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRun {
    /// Unique run identifier.
    pub run_id: RunId,

    /// Task being executed.
    pub task_id: TaskId,

    /// Lifecycle state.
    pub state: RunState,

    /// Context the run was started with.
    pub context: ExecutionContext,

    /// Log lines, append-only while running.
    pub logs: Vec<String>,

    /// Engine result payload on success.
    pub result: Option<Value>,

    /// Error message on failure.
    pub error: Option<String>,

    /// When the run was accepted.
    pub started_at: DateTime<Utc>,

    /// When the run reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRun {
    /// Create a run in the Running state.
    pub fn start(task_id: TaskId, context: ExecutionContext) -> Self {
        Self {
            run_id: RunId::generate(),
            task_id,
            state: RunState::Running,
            context,
            logs: Vec::new(),
            result: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Append a log line. Ignored once the run is terminal.
    pub fn log(&mut self, line: impl Into<String>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.logs.push(line.into());
        true
    }

    /// Mark the run as completed. No-op if already terminal.
    pub fn complete(&mut self, result: Value) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = RunState::Completed;
        self.result = Some(result);
        self.finished_at = Some(Utc::now());
        true
    }

    /// Mark the run as failed. No-op if already terminal.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = RunState::Failed;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
        true
    }

    /// Client-facing status snapshot.
    pub fn status(&self) -> RunStatusView {
        RunStatusView {
            running: self.state.is_active(),
            state: self.state,
            run_id: self.run_id.clone(),
            logs: self.logs.clone(),
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

/// Status snapshot returned by the coordinator's status read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatusView {
    pub running: bool,
    pub state: RunState,
    pub run_id: RunId,
    pub logs: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunStatusView {
    /// True once the run is Completed or Failed.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
