//! Container runtime access for the agent
//!
//! - A runtime client seam over the Docker Engine API
//! - Resolution of compose (stack, service) pairs to running containers

mod resolver;
mod runtime;
#[cfg(test)]
pub(crate) mod testing;

pub use resolver::{ContainerResolver, ResolveError, SERVICE_LABEL, STACK_LABEL};
pub use runtime::{
    ContainerFilter, ContainerInfo, ContainerRuntime, DockerRuntime, ExecAttachment, ExecInput,
    ExecOutput, ExecSpec, ExecStatus,
};

#[cfg(test)]
pub(crate) use runtime::MockContainerRuntime;
