//! Container runtime client
//!
//! The terminal subsystem talks to the container engine only through the
//! [`ContainerRuntime`] trait. [`DockerRuntime`] is the production
//! implementation backed by the Docker Engine API.

use std::collections::HashMap;
use std::io;
use std::pin::Pin;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::container::{ListContainersOptions, LogOutput};
use bollard::exec::{CreateExecOptions, ResizeExecOptions, StartExecOptions, StartExecResults};
use bollard::Docker;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::io::AsyncWrite;
use tracing::{debug, info};

/// Seconds to wait on the Docker API before giving up on a request
const DOCKER_TIMEOUT_SECS: u64 = 120;

/// Summary of a container as reported by the runtime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    pub names: Vec<String>,
    pub state: String,
    pub labels: HashMap<String, String>,
}

impl ContainerInfo {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Primary container name without the leading slash
    pub fn display_name(&self) -> &str {
        self.names
            .first()
            .map(|n| n.trim_start_matches('/'))
            .unwrap_or(&self.id)
    }
}

/// Label/name filter for container listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerFilter {
    pub labels: Vec<(String, String)>,
    pub name: Option<String>,
}

impl ContainerFilter {
    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), value.into()));
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Docker API filter map
    pub fn to_filters(&self) -> HashMap<String, Vec<String>> {
        let mut filters = HashMap::new();
        if !self.labels.is_empty() {
            filters.insert(
                "label".to_string(),
                self.labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect(),
            );
        }
        if let Some(ref name) = self.name {
            filters.insert("name".to_string(), vec![name.clone()]);
        }
        filters
    }
}

/// Process to run through the exec facility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSpec {
    pub cmd: Vec<String>,
    pub tty: bool,
    pub attach_stdin: bool,
}

impl ExecSpec {
    /// Non-interactive exec with stdout/stderr attached and no TTY
    pub fn probe(cmd: Vec<String>) -> Self {
        Self {
            cmd,
            tty: false,
            attach_stdin: false,
        }
    }

    /// Interactive exec with all streams attached and a TTY
    pub fn interactive(cmd: Vec<String>) -> Self {
        Self {
            cmd,
            tty: true,
            attach_stdin: true,
        }
    }
}

/// Byte chunks read from an attached exec
pub type ExecOutput = BoxStream<'static, io::Result<Bytes>>;

/// Write half of an attached exec
pub type ExecInput = Pin<Box<dyn AsyncWrite + Send>>;

/// Duplex stream taken over from an exec attach
pub struct ExecAttachment {
    pub output: ExecOutput,
    pub input: ExecInput,
}

/// Exec process status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecStatus {
    pub running: bool,
    pub exit_code: Option<i64>,
}

/// Operations the terminal subsystem needs from the container engine
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List containers (running or not) matching the filter
    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerInfo>>;

    /// Create an exec instance and return its id
    async fn create_exec(&self, container_id: &str, spec: ExecSpec) -> Result<String>;

    /// Start an exec and hijack its streams
    async fn start_exec(&self, exec_id: &str) -> Result<ExecAttachment>;

    /// Resize the TTY of an exec
    async fn resize_exec(&self, exec_id: &str, cols: u16, rows: u16) -> Result<()>;

    /// Inspect an exec's process state
    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecStatus>;

    /// Engine version string
    async fn version(&self) -> Result<String>;
}

/// Docker Engine API implementation
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the engine at `docker_host`, or the local defaults
    /// (`DOCKER_HOST` or the platform socket) when unset
    pub fn connect(docker_host: Option<&str>) -> Result<Self> {
        let docker = match docker_host {
            Some(host) if host.starts_with("unix://") => Docker::connect_with_unix(
                host,
                DOCKER_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
            Some(host) => {
                Docker::connect_with_http(host, DOCKER_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
            None => Docker::connect_with_local_defaults(),
        }
        .context("Failed to create Docker client")?;

        info!(host = docker_host.unwrap_or("local defaults"), "Docker client created");

        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerInfo>> {
        let options = ListContainersOptions {
            all: true,
            filters: filter.to_filters(),
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .context("Failed to list containers")?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerInfo {
                id: c.id.unwrap_or_default(),
                names: c.names.unwrap_or_default(),
                state: c.state.unwrap_or_default(),
                labels: c.labels.unwrap_or_default(),
            })
            .collect())
    }

    async fn create_exec(&self, container_id: &str, spec: ExecSpec) -> Result<String> {
        let options = CreateExecOptions {
            cmd: Some(spec.cmd),
            attach_stdin: Some(spec.attach_stdin),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(spec.tty),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(container_id, options)
            .await
            .with_context(|| format!("Failed to create exec in container {}", container_id))?;

        debug!(container_id, exec_id = %exec.id, "Exec created");
        Ok(exec.id)
    }

    async fn start_exec(&self, exec_id: &str) -> Result<ExecAttachment> {
        let options = StartExecOptions {
            detach: false,
            ..Default::default()
        };

        let results = self
            .docker
            .start_exec(exec_id, Some(options))
            .await
            .with_context(|| format!("Failed to start exec {}", exec_id))?;

        match results {
            StartExecResults::Attached { output, input } => Ok(ExecAttachment {
                output: output
                    .map(|item| item.map(LogOutput::into_bytes).map_err(io::Error::other))
                    .boxed(),
                input,
            }),
            StartExecResults::Detached => {
                anyhow::bail!("Exec {} started detached, no stream to attach", exec_id)
            }
        }
    }

    async fn resize_exec(&self, exec_id: &str, cols: u16, rows: u16) -> Result<()> {
        self.docker
            .resize_exec(
                exec_id,
                ResizeExecOptions {
                    height: rows,
                    width: cols,
                },
            )
            .await
            .with_context(|| format!("Failed to resize exec {}", exec_id))
    }

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecStatus> {
        let inspect = self
            .docker
            .inspect_exec(exec_id)
            .await
            .with_context(|| format!("Failed to inspect exec {}", exec_id))?;

        Ok(ExecStatus {
            running: inspect.running.unwrap_or(false),
            exit_code: inspect.exit_code,
        })
    }

    async fn version(&self) -> Result<String> {
        let version = self
            .docker
            .version()
            .await
            .context("Failed to query Docker version")?;

        Ok(version.version.unwrap_or_else(|| "unknown".to_string()))
    }
}
