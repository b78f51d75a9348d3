//! HTTP request handlers.

mod batches;
mod events;
mod health;
mod tasks;

pub use batches::{
    clear_schedule, create_batch, delete_batch, get_batch, list_batches, set_schedule,
    start_batch,
};
pub use events::status_events;
pub use health::{health_check, metrics_handler};
pub use tasks::{
    create_task, delete_task, get_task, list_action_types, list_tasks, run_task, task_status,
    toggle_task, update_task,
};
