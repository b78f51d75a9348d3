//! Status enums for task runs, batches and batch items.

use serde::{Deserialize, Serialize};

/// State of a TaskRun.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No run has been started.
    #[default]
    Idle,
    /// Dispatched to the execution engine and not yet finished.
    Running,
    /// Engine reported success.
    Completed,
    /// Engine reported failure, or could not be reached.
    Failed,
}

impl RunState {
    /// Returns true if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if the run occupies the task's concurrency slot.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Status of a Batch or of one of its items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Created (or reset) and not yet started.
    #[default]
    Pending,
    /// Items are being driven.
    Running,
    /// All items terminal and at least one succeeded.
    Completed,
    /// All items terminal and every one failed.
    Failed,
}

impl BatchStatus {
    /// Returns true if the status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Per-item status mirrors the batch status values.
pub type ItemStatus = BatchStatus;

/// How a batch drives its items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Items run one at a time in index order.
    #[default]
    Sequential,
    /// All items start at once.
    Parallel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_terminal() {
        assert!(!RunState::Idle.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Running.is_active());
    }

    #[test]
    fn test_batch_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&BatchStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(BatchStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn test_mode_defaults_to_sequential() {
        assert_eq!(ExecutionMode::default(), ExecutionMode::Sequential);
        let mode: ExecutionMode = serde_json::from_str("\"parallel\"").unwrap();
        assert_eq!(mode, ExecutionMode::Parallel);
    }
}
