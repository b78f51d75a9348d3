//! Autoflow Control Plane Server

use std::net::SocketAddr;
use std::sync::Arc;

use clap::builder::RangedU64ValueParser;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use autoflow_control_plane::{http, AppState, Config, HttpEngine};

/// Autoflow control plane server.
#[derive(Parser, Debug)]
#[command(name = "autoflow-control-plane", about = "Autoflow task and batch control plane")]
struct Args {
    /// HTTP server address
    #[arg(long, env = "AUTOFLOW_HTTP_ADDR", default_value = "127.0.0.1:8080")]
    http_addr: String,

    /// Base URL of the execution engine
    #[arg(long, env = "AUTOFLOW_ENGINE_URL", default_value = "http://127.0.0.1:8090")]
    engine_url: String,

    /// Timeout for one engine request, in seconds
    #[arg(long, env = "AUTOFLOW_ENGINE_TIMEOUT", default_value = "600",
          value_parser = clap::value_parser!(u64).range(1..))]
    engine_timeout_secs: u64,

    /// Task status poll interval, in milliseconds
    #[arg(long, env = "AUTOFLOW_TASK_POLL_MS", default_value = "1000",
          value_parser = clap::value_parser!(u64).range(1..))]
    task_poll_ms: u64,

    /// Batch status poll interval, in milliseconds
    #[arg(long, env = "AUTOFLOW_BATCH_POLL_MS", default_value = "3000",
          value_parser = clap::value_parser!(u64).range(1..))]
    batch_poll_ms: u64,

    /// Capacity of the status event channel
    #[arg(long, default_value = "256",
          value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    notification_capacity: usize,
}

impl Args {
    fn into_config(self) -> Config {
        Config {
            http_bind_addr: self.http_addr,
            engine_url: self.engine_url,
            engine_timeout_secs: self.engine_timeout_secs,
            task_poll_interval_ms: self.task_poll_ms,
            batch_poll_interval_ms: self.batch_poll_ms,
            notification_capacity: self.notification_capacity,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("autoflow_control_plane=info,tower_http=info")),
        )
        .with_target(true)
        .init();

    let config = args.into_config();
    let http_addr: SocketAddr = config.http_bind_addr.parse()?;

    let engine = HttpEngine::new(config.engine_url.clone(), config.engine_timeout())?;
    info!(engine_url = %config.engine_url, "Execution engine configured");

    let state = AppState::new(config, Arc::new(engine));
    let router = http::create_router(state);

    let listener = TcpListener::bind(http_addr).await?;
    info!("HTTP server listening on {}", http_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Autoflow control plane stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse() {
        let config = Args::try_parse_from(["autoflow-control-plane"])
            .unwrap()
            .into_config();
        assert_eq!(config.task_poll_interval_ms, 1000);
        assert_eq!(config.batch_poll_interval_ms, 3000);
        assert_eq!(config.notification_capacity, 256);
    }

    #[test]
    fn test_zero_values_rejected() {
        for flag in [
            "--engine-timeout-secs",
            "--task-poll-ms",
            "--batch-poll-ms",
            "--notification-capacity",
        ] {
            let parsed = Args::try_parse_from(["autoflow-control-plane", flag, "0"]);
            assert!(parsed.is_err(), "{flag} 0 was accepted");
        }
        assert!(Args::try_parse_from(["autoflow-control-plane", "--task-poll-ms", "250"]).is_ok());
    }
}
