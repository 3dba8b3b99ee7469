//! Prometheus metrics export
//!
//! Provides metrics endpoint for monitoring and alerting

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::AppState;

/// Prometheus metrics recorder, installed once by [`init_metrics`]
static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize metrics system
pub fn init_metrics() -> Result<()> {
    METRICS_HANDLE.get_or_try_init(|| {
        PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full("dockside_terminal_session_duration_seconds".to_string()),
                &[1.0, 10.0, 60.0, 300.0, 900.0, 1800.0, 3600.0, 14400.0],
            )
            .context("Invalid histogram buckets")?
            .install_recorder()
            .context("Failed to install Prometheus recorder")
    })?;
    Ok(())
}

/// Record one shell probe attempt
pub fn record_shell_probe(shell: &str, usable: bool) {
    let outcome = if usable { "usable" } else { "unusable" };
    counter!("dockside_shell_probes_total", "shell" => shell.to_string(), "outcome" => outcome).increment(1);
}

/// Record a terminal session that started
pub fn record_terminal_opened(stack: &str) {
    counter!("dockside_terminal_sessions_opened_total", "stack" => stack.to_string()).increment(1);
    gauge!("dockside_terminal_sessions_active").increment(1.0);
}

/// Record a terminal session that closed
pub fn record_terminal_closed(stack: &str, duration_secs: f64) {
    counter!("dockside_terminal_sessions_closed_total", "stack" => stack.to_string()).increment(1);
    gauge!("dockside_terminal_sessions_active").decrement(1.0);
    histogram!("dockside_terminal_session_duration_seconds", "stack" => stack.to_string()).record(duration_secs);
}

/// Record a session that could not be started
pub fn record_terminal_start_failure(kind: &'static str) {
    counter!("dockside_terminal_start_failures_total", "kind" => kind).increment(1);
}

/// Record a failed container resolution
pub fn record_resolve_failure(reason: &'static str) {
    counter!("dockside_container_resolve_failures_total", "reason" => reason).increment(1);
}

/// Prometheus metrics endpoint handler
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // The registry is authoritative for the active gauge
    gauge!("dockside_terminal_sessions_active")
        .set(state.terminal_manager.session_count().await as f64);

    let metrics = METRICS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default();

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        metrics,
    )
}
