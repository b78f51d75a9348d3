//! Execution engine boundary.
//!
//! The engine performs the browser automation for a task's actions. The
//! control plane only dispatches work to it and collects log lines and the
//! final outcome.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use autoflow_core::{RunId, Task};

/// Errors reported by an execution engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not be reached or answered with a protocol error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The engine ran the task and reported a failure.
    #[error("{0}")]
    Failed(String),
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Work handed to the engine for one run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRequest {
    pub run_id: RunId,
    pub task: Task,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
}

/// Something that can execute a task's action sequence.
///
/// Implementations stream log lines through `logs` while running and return
/// the result payload on success. Dropping `logs` early is allowed.
#[async_trait]
pub trait ExecutionEngine: Send + Sync + 'static {
    async fn execute(
        &self,
        request: ExecutionRequest,
        logs: mpsc::Sender<String>,
    ) -> Result<Value, EngineError>;
}

/// Reply body of the engine's `/execute` endpoint.
#[derive(Debug, Deserialize)]
struct EngineResponse {
    success: bool,
    #[serde(default)]
    logs: Vec<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Engine reached over HTTP.
#[derive(Clone)]
pub struct HttpEngine {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEngine {
    /// Create a client for the engine at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn execute_url(&self) -> String {
        format!("{}/execute", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl ExecutionEngine for HttpEngine {
    async fn execute(
        &self,
        request: ExecutionRequest,
        logs: mpsc::Sender<String>,
    ) -> Result<Value, EngineError> {
        let url = self.execute_url();
        info!(
            run_id = %request.run_id,
            task_id = %request.task.id,
            url = %url,
            "Dispatching run to execution engine"
        );

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(run_id = %request.run_id, status = %status, "Engine returned error status");
            return Err(EngineError::Transport(format!(
                "engine returned HTTP {status}"
            )));
        }

        let body: EngineResponse = response.json().await?;
        debug!(
            run_id = %request.run_id,
            log_lines = body.logs.len(),
            success = body.success,
            "Engine response received"
        );
        for line in body.logs {
            if logs.send(line).await.is_err() {
                break;
            }
        }

        if body.success {
            Ok(body.result.unwrap_or(Value::Null))
        } else {
            Err(EngineError::Failed(
                body.error
                    .unwrap_or_else(|| "engine reported failure".to_string()),
            ))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_url_trims_slash() {
        let engine = HttpEngine::new("http://engine:8090/", Duration::from_secs(1)).unwrap();
        assert_eq!(engine.execute_url(), "http://engine:8090/execute");
    }

    #[test]
    fn test_transport_error_display() {
        let err = EngineError::Transport("connection refused".into());
        assert_eq!(err.to_string(), "transport error: connection refused");
        assert_eq!(EngineError::Failed("captcha".into()).to_string(), "captcha");
    }

    #[tokio::test]
    async fn test_unreachable_engine_is_transport_error() {
        // Port 9 (discard) on localhost is assumed closed.
        let engine = HttpEngine::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let task = autoflow_core::Task::from_draft(
            serde_json::from_value(serde_json::json!({
                "_file": "t.json", "name": "t", "url": "https://example.com"
            }))
            .unwrap(),
        )
        .unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let request = ExecutionRequest {
            run_id: RunId::generate(),
            task,
            company_name: None,
        };
        let err = engine.execute(request, tx).await.unwrap_err();
        assert!(matches!(err, EngineError::Transport(_)));
    }
}
