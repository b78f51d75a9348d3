//! Autoflow Control Plane Library
//!
//! This crate provides the control plane for Autoflow: the task registry,
//! run coordination, batch orchestration, repeat schedules, status polling
//! and the HTTP API over them.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod http;
pub mod metrics;
pub mod orchestrator;
pub mod poller;
pub mod registry;
pub mod scheduler;
pub mod state;

pub use config::Config;
pub use coordinator::{ExecutionCoordinator, RunHandle, RunOutcome, RunTable};
pub use engine::{EngineError, ExecutionEngine, ExecutionRequest, HttpEngine};
pub use orchestrator::{BatchOrchestrator, NewBatch};
pub use poller::{StatusPoller, StatusUpdate, WatchKey};
pub use registry::TaskRegistry;
pub use scheduler::{ScheduleBook, Scheduler, TickOutcome};
pub use state::AppState;
