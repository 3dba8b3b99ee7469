//! Resolution of (stack, service) to a single running container

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use super::runtime::{ContainerFilter, ContainerInfo, ContainerRuntime};

/// Compose label carrying the owning stack (project) name
pub const STACK_LABEL: &str = "com.docker.compose.project";

/// Compose label carrying the service name
pub const SERVICE_LABEL: &str = "com.docker.compose.service";

/// Container resolution failures
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no container found for service '{service}' in stack '{stack}'")]
    NotFound { stack: String, service: String },

    #[error("no running container for service '{service}' in stack '{stack}'")]
    NoRunningContainer { stack: String, service: String },

    #[error("container {container_id} belongs to stack '{actual}', not '{expected}'")]
    StackMismatch {
        container_id: String,
        expected: String,
        actual: String,
    },

    #[error("failed to list containers")]
    Runtime(#[source] anyhow::Error),
}

impl ResolveError {
    /// Short message for clients
    pub fn summary(&self) -> &'static str {
        match self {
            ResolveError::NotFound { .. } => "Container not found",
            ResolveError::NoRunningContainer { .. } => "No running container",
            ResolveError::StackMismatch { .. } => "Container does not belong to stack",
            ResolveError::Runtime(_) => "Failed to look up container",
        }
    }

    /// Free-text context for clients; runtime internals stay in the logs
    pub fn context(&self) -> String {
        match self {
            ResolveError::Runtime(_) => "the container runtime did not answer".to_string(),
            other => other.to_string(),
        }
    }
}

/// Finds the container a terminal session should attach to
pub struct ContainerResolver {
    runtime: Arc<dyn ContainerRuntime>,
}

impl ContainerResolver {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Resolve exactly one running container of `service` in `stack`
    ///
    /// The first running match is re-checked against the stack label even
    /// though the listing was filtered on it, so a container whose labels
    /// changed between listing and selection is refused.
    pub async fn resolve(
        &self,
        stack: &str,
        service: &str,
        container_name: Option<&str>,
    ) -> Result<ContainerInfo, ResolveError> {
        let mut filter = ContainerFilter::default()
            .label(STACK_LABEL, stack)
            .label(SERVICE_LABEL, service);
        if let Some(name) = container_name.filter(|n| !n.is_empty()) {
            filter = filter.name(name);
        }

        let containers = self
            .runtime
            .list_containers(&filter)
            .await
            .map_err(ResolveError::Runtime)?;

        if containers.is_empty() {
            return Err(ResolveError::NotFound {
                stack: stack.to_string(),
                service: service.to_string(),
            });
        }

        let container = containers
            .into_iter()
            .find(ContainerInfo::is_running)
            .ok_or_else(|| ResolveError::NoRunningContainer {
                stack: stack.to_string(),
                service: service.to_string(),
            })?;

        let actual = container.label(STACK_LABEL).unwrap_or_default();
        if actual != stack {
            warn!(
                container_id = %container.id,
                expected = stack,
                actual,
                "Container stack label does not match requested stack"
            );
            return Err(ResolveError::StackMismatch {
                container_id: container.id.clone(),
                expected: stack.to_string(),
                actual: actual.to_string(),
            });
        }

        debug!(
            stack,
            service,
            container_id = %container.id,
            container = container.display_name(),
            "Resolved container"
        );

        Ok(container)
    }
}
