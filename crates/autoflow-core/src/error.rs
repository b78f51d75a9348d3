//! Core domain errors.

use thiserror::Error;

use crate::ids::{BatchId, TaskId};

/// A malformed action, task or schedule definition.
///
/// Display strings are part of the wire contract (`missing_field: value`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is absent or empty.
    #[error("missing_field: {0}")]
    MissingField(String),

    /// The action `type` tag matches no known variant.
    #[error("unknown_type: {0}")]
    UnknownType(String),

    /// A field is present but has the wrong shape or an out-of-range value.
    #[error("invalid_field: {field} ({reason})")]
    InvalidField { field: String, reason: String },

    /// A batch must reference at least one task.
    #[error("empty_batch: at least one task is required")]
    EmptyBatch,

    /// A batch references a task that does not exist.
    #[error("unknown_task: {0}")]
    UnknownTask(TaskId),

    /// A batch references a disabled task.
    #[error("disabled_task: {0}")]
    DisabledTask(TaskId),

    /// Schedule interval must be between one second and one year.
    #[error("invalid_interval: {0} (must be between 1 and 31622400 seconds)")]
    InvalidInterval(i64),
}

impl ValidationError {
    /// Shorthand for a missing field error.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    /// Shorthand for an invalid field error.
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Why an operation was refused because of current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    /// The task is disabled and cannot be started.
    Disabled,
    /// The task already has a non-terminal run.
    AlreadyRunning,
    /// A task with the same identity already exists.
    TaskExists,
    /// The task cannot be deleted while a run is active.
    TaskRunning,
    /// The batch is currently running.
    BatchRunning,
}

impl Conflict {
    /// Wire name of the conflict.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::AlreadyRunning => "already_running",
            Self::TaskExists => "already_exists",
            Self::TaskRunning => "task_running",
            Self::BatchRunning => "batch_running",
        }
    }
}

impl std::fmt::Display for Conflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core domain errors for Autoflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Malformed input.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Task not found.
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// No run (current or retained) exists for the task.
    #[error("No run found for task: {0}")]
    RunNotFound(TaskId),

    /// Batch not found.
    #[error("Batch not found: {0}")]
    BatchNotFound(BatchId),

    /// Operation refused because of current state.
    #[error("{0}")]
    Conflict(Conflict),
}

impl CoreError {
    /// True for any of the not-found variants.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TaskNotFound(_) | Self::RunNotFound(_) | Self::BatchNotFound(_)
        )
    }

    /// Returns the conflict reason, if this is a conflict.
    pub fn conflict(&self) -> Option<Conflict> {
        match self {
            Self::Conflict(c) => Some(*c),
            _ => None,
        }
    }
}

impl From<Conflict> for CoreError {
    fn from(c: Conflict) -> Self {
        Self::Conflict(c)
    }
}
