//! Autoflow Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Storage
//! - Runtime specifics
//!
//! All types here represent the task, run and batch model of Autoflow.

pub mod action;
pub mod batch;
pub mod error;
pub mod ids;
pub mod run;
pub mod schedule;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use action::{Action, ActionKind, ActionSpec};
pub use batch::{Batch, BatchItem, Progress};
pub use error::{Conflict, CoreError, ValidationError};
pub use ids::{BatchId, RunId, TaskId};
pub use run::{ExecutionContext, RunStatusView, TaskRun};
pub use schedule::{Schedule, MAX_INTERVAL_SECONDS};
pub use status::{BatchStatus, ExecutionMode, ItemStatus, RunState};
pub use task::{Task, TaskDraft, TaskPatch};
