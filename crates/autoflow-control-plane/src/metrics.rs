//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;
use std::sync::Arc;

use autoflow_core::{BatchStatus, RunState};

use crate::state::AppState;

/// Collect all metrics from AppState and format as Prometheus text.
pub async fn collect_metrics(state: &Arc<AppState>) -> String {
    let mut output = String::new();

    collect_task_metrics(state, &mut output).await;
    collect_run_metrics(state, &mut output).await;
    collect_batch_metrics(state, &mut output).await;
    collect_background_metrics(state, &mut output).await;

    output
}

/// Collect task definition counts.
async fn collect_task_metrics(state: &Arc<AppState>, output: &mut String) {
    let (enabled, disabled) = state.registry.counts().await;

    writeln!(
        output,
        "# HELP autoflow_tasks Number of task definitions by enabled state"
    )
    .ok();
    writeln!(output, "# TYPE autoflow_tasks gauge").ok();
    writeln!(output, "autoflow_tasks{{disabled=\"false\"}} {enabled}").ok();
    writeln!(output, "autoflow_tasks{{disabled=\"true\"}} {disabled}").ok();
}

/// Collect current and retained runs by state.
async fn collect_run_metrics(state: &Arc<AppState>, output: &mut String) {
    let counts = state.coordinator.runs().count_by_state().await;
    let count = |s: RunState| counts.get(&s).copied().unwrap_or(0);

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP autoflow_task_runs Current or last run of each task by state"
    )
    .ok();
    writeln!(output, "# TYPE autoflow_task_runs gauge").ok();
    for (label, s) in [
        ("running", RunState::Running),
        ("completed", RunState::Completed),
        ("failed", RunState::Failed),
    ] {
        writeln!(output, "autoflow_task_runs{{state=\"{label}\"}} {}", count(s)).ok();
    }
}

/// Collect batches by status.
async fn collect_batch_metrics(state: &Arc<AppState>, output: &mut String) {
    let counts = state.orchestrator.count_by_status().await;

    writeln!(output).ok();
    writeln!(output, "# HELP autoflow_batches Number of batches by status").ok();
    writeln!(output, "# TYPE autoflow_batches gauge").ok();
    for status in [
        BatchStatus::Pending,
        BatchStatus::Running,
        BatchStatus::Completed,
        BatchStatus::Failed,
    ] {
        let n = counts.get(&status).copied().unwrap_or(0);
        writeln!(
            output,
            "autoflow_batches{{status=\"{}\"}} {n}",
            status.as_str()
        )
        .ok();
    }
}

/// Collect schedule and poll loop gauges.
async fn collect_background_metrics(state: &Arc<AppState>, output: &mut String) {
    let schedules = state.scheduler.active_count().await;
    let pollers = state.poller.active_keys().await.len();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP autoflow_schedules_active Number of batches with a repeat schedule"
    )
    .ok();
    writeln!(output, "# TYPE autoflow_schedules_active gauge").ok();
    writeln!(output, "autoflow_schedules_active {schedules}").ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP autoflow_pollers_active Number of running status poll loops"
    )
    .ok();
    writeln!(output, "# TYPE autoflow_pollers_active gauge").ok();
    writeln!(output, "autoflow_pollers_active {pollers}").ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::testing::{draft, ScriptedEngine};

    #[tokio::test]
    async fn test_collect_metrics_empty_state() {
        let state = AppState::new(Config::default(), Arc::new(ScriptedEngine::new()));
        let output = collect_metrics(&state).await;

        assert!(output.contains("autoflow_tasks{disabled=\"false\"} 0"));
        assert!(output.contains("autoflow_task_runs{state=\"running\"} 0"));
        assert!(output.contains("autoflow_batches{status=\"pending\"} 0"));
        assert!(output.contains("autoflow_schedules_active 0"));
        assert!(output.contains("autoflow_pollers_active 0"));
    }

    #[tokio::test]
    async fn test_prometheus_format() {
        let state = AppState::new(Config::default(), Arc::new(ScriptedEngine::new()));
        let output = collect_metrics(&state).await;

        assert!(output.contains("# HELP autoflow_tasks"));
        assert!(output.contains("# TYPE autoflow_tasks gauge"));
        assert!(output.contains("# TYPE autoflow_batches gauge"));
    }

    #[tokio::test]
    async fn test_task_counts() {
        let state = AppState::new(Config::default(), Arc::new(ScriptedEngine::new()));
        state.registry.create(draft("a.json")).await.unwrap();
        state.registry.create(draft("b.json")).await.unwrap();
        state
            .registry
            .toggle(&autoflow_core::TaskId::new("b.json"), true)
            .await
            .unwrap();

        let output = collect_metrics(&state).await;
        assert!(output.contains("autoflow_tasks{disabled=\"false\"} 1"));
        assert!(output.contains("autoflow_tasks{disabled=\"true\"} 1"));
    }
}
