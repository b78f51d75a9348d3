//! Control plane configuration.

use std::time::Duration;

/// Control plane configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server bind address.
    pub http_bind_addr: String,

    /// Base URL of the execution engine.
    pub engine_url: String,

    /// Timeout for a single engine request (seconds).
    pub engine_timeout_secs: u64,

    /// Interval between task status polls (milliseconds).
    pub task_poll_interval_ms: u64,

    /// Interval between batch status polls (milliseconds).
    pub batch_poll_interval_ms: u64,

    /// Capacity of the status notification channel.
    pub notification_capacity: usize,
}

impl Config {
    pub fn task_poll_interval(&self) -> Duration {
        Duration::from_millis(self.task_poll_interval_ms)
    }

    pub fn batch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.batch_poll_interval_ms)
    }

    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_bind_addr: "127.0.0.1:8080".to_string(),
            engine_url: "http://127.0.0.1:8090".to_string(),
            engine_timeout_secs: 600,
            task_poll_interval_ms: 1000,
            batch_poll_interval_ms: 3000,
            notification_capacity: 256,
        }
    }
}
