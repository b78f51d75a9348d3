//! Shared application state.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::coordinator::{ExecutionCoordinator, RunTable};
use crate::engine::ExecutionEngine;
use crate::orchestrator::BatchOrchestrator;
use crate::poller::StatusPoller;
use crate::registry::TaskRegistry;
use crate::scheduler::{ScheduleBook, Scheduler};

/// Shared application state.
pub struct AppState {
    /// Configuration the server was started with.
    pub config: Config,

    /// Task definitions.
    pub registry: Arc<TaskRegistry>,

    /// Task runs.
    pub coordinator: Arc<ExecutionCoordinator>,

    /// Batches.
    pub orchestrator: Arc<BatchOrchestrator>,

    /// Batch repeat schedules.
    pub scheduler: Scheduler,

    /// Status observation loops and the notification channel.
    pub poller: StatusPoller,

    /// When the server started.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire up all services around `engine` and wrap them in an Arc.
    pub fn new(config: Config, engine: Arc<dyn ExecutionEngine>) -> Arc<Self> {
        let runs = RunTable::new();
        let registry = Arc::new(TaskRegistry::new(runs.clone()));
        let coordinator = Arc::new(ExecutionCoordinator::new(registry.clone(), runs, engine));

        let schedules = ScheduleBook::new();
        let orchestrator = Arc::new(BatchOrchestrator::new(
            registry.clone(),
            coordinator.clone(),
            schedules.clone(),
        ));
        let scheduler = Scheduler::new(orchestrator.clone(), schedules);

        let poller = StatusPoller::new(
            coordinator.clone(),
            orchestrator.clone(),
            config.task_poll_interval(),
            config.batch_poll_interval(),
            config.notification_capacity,
        );

        Arc::new(Self {
            config,
            registry,
            coordinator,
            orchestrator,
            scheduler,
            poller,
            started_at: Utc::now(),
        })
    }
}
