//! Dockside agent library
//!
//! Host-side agent for Docker Compose stacks. Serves interactive shells
//! inside running service containers over WebSocket.

use std::sync::Arc;

pub mod api;
pub mod audit;
pub mod config;
pub mod container;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod terminal;

/// Application state shared across all handlers
pub struct AppState {
    pub config: config::AppConfig,
    pub runtime: Arc<dyn container::ContainerRuntime>,
    pub resolver: Arc<container::ContainerResolver>,
    pub terminal_manager: Arc<terminal::SessionManager>,
    pub audit_logger: Arc<audit::AuditLogger>,
}

impl AppState {
    pub fn new(config: config::AppConfig, runtime: Arc<dyn container::ContainerRuntime>) -> Self {
        let resolver = Arc::new(container::ContainerResolver::new(runtime.clone()));
        let terminal_manager = Arc::new(terminal::SessionManager::new(
            runtime.clone(),
            config.terminal.clone(),
        ));
        let audit_logger = Arc::new(audit::AuditLogger::new(config.audit_format));

        Self {
            config,
            runtime,
            resolver,
            terminal_manager,
            audit_logger,
        }
    }
}
