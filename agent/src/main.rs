//! Dockside agent - interactive terminals for Docker Compose services
//!
//! This is the main entry point for the Dockside agent.
//! It talks to the local Docker Engine and serves terminal sessions over WebSocket.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::http::HeaderName;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use dockside_agent::api::create_router;
use dockside_agent::config::AppConfig;
use dockside_agent::container::{ContainerRuntime, DockerRuntime};
use dockside_agent::logging::init_logging;
use dockside_agent::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_logging(&config.log_level, &config.log_dir)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Dockside agent"
    );

    // Initialize metrics system
    dockside_agent::metrics::init_metrics()?;
    info!("Prometheus metrics initialized");

    // Connect to the Docker Engine
    let runtime = Arc::new(DockerRuntime::connect(config.docker_host.as_deref())?);
    match runtime.version().await {
        Ok(version) => info!(docker_version = %version, "Docker Engine connected"),
        Err(e) => warn!(error = %e, "Docker Engine not reachable, terminals unavailable until it is"),
    }

    // Create shared application state
    let state = Arc::new(AppState::new(config.clone(), runtime));
    info!(
        shells = ?config.terminal.shells,
        audit_format = ?config.audit_format,
        "Terminal session manager initialized"
    );

    // Build the router with all routes and middleware
    let x_request_id = HeaderName::from_static("x-request-id");
    let app = create_router(state.clone()).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(x_request_id))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
    );

    // Bind to address
    let addr: SocketAddr = config.bind_address().parse()?;
    info!(%addr, "Listening on");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");

    // Upgraded sockets outlive the HTTP server; close their sessions
    state.terminal_manager.shutdown().await;

    info!("Dockside agent stopped");
    Ok(())
}

/// Handle shutdown signals gracefully
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
