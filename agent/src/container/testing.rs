//! In-memory runtime used by tests
//!
//! Interactive execs echo their stdin back on stdout through a
//! `tokio::io::duplex` pipe. Probe execs succeed only for the shells the
//! fake was built with.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use super::resolver::{SERVICE_LABEL, STACK_LABEL};
use super::runtime::{
    ContainerFilter, ContainerInfo, ContainerRuntime, ExecAttachment, ExecSpec, ExecStatus,
};

struct FakeExec {
    spec: ExecSpec,
    status: ExecStatus,
    finish: CancellationToken,
}

pub(crate) struct FakeRuntime {
    containers: Vec<ContainerInfo>,
    shells: HashSet<String>,
    silent: bool,
    next_id: AtomicU64,
    execs: Mutex<HashMap<String, FakeExec>>,
    resizes: Mutex<Vec<(String, u16, u16)>>,
}

impl FakeRuntime {
    /// Fake with one running `demo`/`web` container whose image ships `shells`
    pub(crate) fn with_shells(shells: &[&str]) -> Self {
        Self {
            containers: vec![compose_container("c-demo-web", "demo", "web", "running")],
            shells: shells.iter().map(|s| s.to_string()).collect(),
            silent: false,
            next_id: AtomicU64::new(1),
            execs: Mutex::new(HashMap::new()),
            resizes: Mutex::new(Vec::new()),
        }
    }

    /// Interactive execs never produce output
    pub(crate) fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub(crate) fn with_container(mut self, container: ContainerInfo) -> Self {
        self.containers.push(container);
        self
    }

    /// Make an interactive exec exit with `exit_code`
    pub(crate) fn finish(&self, exec_id: &str, exit_code: i64) {
        let mut execs = self.execs.lock().unwrap();
        let exec = execs.get_mut(exec_id).expect("unknown exec");
        exec.status = ExecStatus {
            running: false,
            exit_code: Some(exit_code),
        };
        exec.finish.cancel();
    }

    pub(crate) fn resizes(&self) -> Vec<(String, u16, u16)> {
        self.resizes.lock().unwrap().clone()
    }

    /// Commands of every exec created so far, in creation order
    pub(crate) fn exec_commands(&self) -> Vec<Vec<String>> {
        let execs = self.execs.lock().unwrap();
        let mut ids: Vec<_> = execs.keys().cloned().collect();
        ids.sort_by_key(|id| id.trim_start_matches("exec-").parse::<u64>().unwrap_or(0));
        ids.iter().map(|id| execs[id].spec.cmd.clone()).collect()
    }
}

pub(crate) fn compose_container(id: &str, stack: &str, service: &str, state: &str) -> ContainerInfo {
    ContainerInfo {
        id: id.to_string(),
        names: vec![format!("/{}-{}-1", stack, service)],
        state: state.to_string(),
        labels: HashMap::from([
            (STACK_LABEL.to_string(), stack.to_string()),
            (SERVICE_LABEL.to_string(), service.to_string()),
        ]),
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerInfo>> {
        Ok(self
            .containers
            .iter()
            .filter(|c| filter.labels.iter().all(|(k, v)| c.label(k) == Some(v.as_str())))
            .filter(|c| {
                filter
                    .name
                    .as_ref()
                    .map_or(true, |name| c.names.iter().any(|n| n.contains(name.as_str())))
            })
            .cloned()
            .collect())
    }

    async fn create_exec(&self, container_id: &str, spec: ExecSpec) -> Result<String> {
        if !self.containers.iter().any(|c| c.id == container_id) {
            anyhow::bail!("no such container: {}", container_id);
        }
        let id = format!("exec-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.execs.lock().unwrap().insert(
            id.clone(),
            FakeExec {
                spec,
                status: ExecStatus::default(),
                finish: CancellationToken::new(),
            },
        );
        Ok(id)
    }

    async fn start_exec(&self, exec_id: &str) -> Result<ExecAttachment> {
        let mut execs = self.execs.lock().unwrap();
        let exec = execs
            .get_mut(exec_id)
            .ok_or_else(|| anyhow::anyhow!("no such exec: {}", exec_id))?;

        if !exec.spec.tty {
            let ok = exec
                .spec
                .cmd
                .first()
                .is_some_and(|program| self.shells.contains(program));
            exec.status = ExecStatus {
                running: false,
                exit_code: Some(if ok { 0 } else { 127 }),
            };
            return Ok(ExecAttachment {
                output: futures::stream::empty::<io::Result<Bytes>>().boxed(),
                input: Box::pin(tokio::io::sink()),
            });
        }

        exec.status = ExecStatus {
            running: true,
            exit_code: None,
        };
        let finish = exec.finish.clone();

        if self.silent {
            return Ok(ExecAttachment {
                output: futures::stream::pending::<io::Result<Bytes>>()
                    .take_until(async move { finish.cancelled().await })
                    .boxed(),
                input: Box::pin(tokio::io::sink()),
            });
        }

        let (writer, reader) = tokio::io::duplex(4096);
        Ok(ExecAttachment {
            output: ReaderStream::new(reader)
                .take_until(async move { finish.cancelled().await })
                .boxed(),
            input: Box::pin(writer),
        })
    }

    async fn resize_exec(&self, exec_id: &str, cols: u16, rows: u16) -> Result<()> {
        self.resizes
            .lock()
            .unwrap()
            .push((exec_id.to_string(), cols, rows));
        Ok(())
    }

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecStatus> {
        self.execs
            .lock()
            .unwrap()
            .get(exec_id)
            .map(|e| e.status)
            .ok_or_else(|| anyhow::anyhow!("no such exec: {}", exec_id))
    }

    async fn version(&self) -> Result<String> {
        Ok("fake-24.0".to_string())
    }
}
