//! API module for the Dockside agent
//!
//! Provides endpoints for:
//! - Interactive container terminals (WebSocket)
//! - Terminal session inspection and admin close
//! - Health checks and metrics

mod auth;
mod error;
mod handlers;

use std::sync::Arc;

use axum::{
    routing::{delete, get},
    Router,
};

use crate::AppState;

pub use auth::{create_jwt, AdminAuth, Claims, UserAuth};
pub use error::ApiError;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check (no auth)
        .route("/health", get(handlers::health::health_check))
        // Prometheus metrics (no auth for scraping)
        .route("/metrics", get(crate::metrics::metrics_handler))
        // API v1 routes
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
}

/// API v1 routes
fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/terminal/ws", get(handlers::terminal::terminal_websocket_handler))
        .route("/terminal/sessions", get(handlers::terminal::list_sessions))
        .route(
            "/terminal/sessions/:session_id",
            delete(handlers::terminal::close_session),
        )
}
