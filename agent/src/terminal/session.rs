//! A single interactive shell attached to a container exec

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::container::{ContainerRuntime, ExecInput, ExecOutput};
use crate::models::TerminalSessionInfo;

use super::error::TerminalError;
use super::manager::SessionRegistry;

/// Receives each output chunk, in stream order
pub type OutputCallback = Arc<dyn Fn(Bytes) -> BoxFuture<'static, ()> + Send + Sync>;

/// Receives the exit code once the session is closed
pub type CloseCallback = Arc<dyn Fn(i64) -> BoxFuture<'static, ()> + Send + Sync>;

/// Terminal dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Only positive geometry is sent to the runtime
    pub fn is_valid(&self) -> bool {
        self.cols > 0 && self.rows > 0
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

#[derive(Debug)]
struct SessionState {
    closed: bool,
    size: TerminalSize,
    exit_code: Option<i64>,
}

#[derive(Default)]
struct CloseSlot {
    callback: Option<CloseCallback>,
    fired: bool,
}

/// Interactive shell session bound to one exec
pub struct TerminalSession {
    pub id: String,
    pub stack_name: String,
    pub service_name: String,
    pub container_id: String,
    pub shell: String,
    pub created_at: DateTime<Utc>,
    exec_id: String,
    state: RwLock<SessionState>,
    writer: Mutex<Option<ExecInput>>,
    output_callback: Mutex<Option<OutputCallback>>,
    output_ready: Notify,
    close_slot: Mutex<CloseSlot>,
    lifetime: CancellationToken,
    runtime: Arc<dyn ContainerRuntime>,
}

/// Thread-safe session handle
pub type SessionHandle = Arc<TerminalSession>;

/// Fields a new session is built from
pub(crate) struct SessionParts {
    pub id: String,
    pub stack_name: String,
    pub service_name: String,
    pub container_id: String,
    pub exec_id: String,
    pub shell: String,
    pub size: TerminalSize,
    pub input: ExecInput,
    pub lifetime: CancellationToken,
    pub runtime: Arc<dyn ContainerRuntime>,
}

impl TerminalSession {
    pub(crate) fn new(parts: SessionParts) -> Self {
        Self {
            id: parts.id,
            stack_name: parts.stack_name,
            service_name: parts.service_name,
            container_id: parts.container_id,
            shell: parts.shell,
            created_at: Utc::now(),
            exec_id: parts.exec_id,
            state: RwLock::new(SessionState {
                closed: false,
                size: parts.size,
                exit_code: None,
            }),
            writer: Mutex::new(Some(parts.input)),
            output_callback: Mutex::new(None),
            output_ready: Notify::new(),
            close_slot: Mutex::new(CloseSlot::default()),
            lifetime: parts.lifetime,
            runtime: parts.runtime,
        }
    }

    pub fn exec_id(&self) -> &str {
        &self.exec_id
    }

    pub async fn size(&self) -> TerminalSize {
        self.state.read().await.size
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    /// Token cancelled when the session closes
    pub fn lifetime(&self) -> CancellationToken {
        self.lifetime.clone()
    }

    /// Send bytes to the shell's stdin
    pub async fn write(&self, data: &[u8]) -> Result<(), TerminalError> {
        let state = self.state.read().await;
        if state.closed {
            return Err(TerminalError::Closed);
        }

        let mut writer = self.writer.lock().await;
        let input = writer.as_mut().ok_or(TerminalError::Closed)?;
        input.write_all(data).await?;
        input.flush().await?;

        drop(state);
        Ok(())
    }

    /// Change the terminal geometry
    pub async fn resize(&self, cols: u16, rows: u16) -> Result<(), TerminalError> {
        let size = TerminalSize::new(cols, rows);
        if !size.is_valid() {
            return Err(TerminalError::InvalidGeometry { cols, rows });
        }

        {
            let mut state = self.state.write().await;
            if state.closed {
                return Err(TerminalError::Closed);
            }
            if self.exec_id.is_empty() {
                return Err(TerminalError::Unbound);
            }
            state.size = size;
        }

        self.runtime
            .resize_exec(&self.exec_id, cols, rows)
            .await
            .map_err(|e| TerminalError::runtime("resize exec", &self.exec_id, e))?;

        debug!(session_id = %self.id, cols, rows, "Terminal resized");
        Ok(())
    }

    /// Install the output callback, replacing any previous one
    pub async fn set_output_callback(&self, callback: OutputCallback) {
        *self.output_callback.lock().await = Some(callback);
        self.output_ready.notify_waiters();
    }

    /// Install the close callback, replacing any previous one. If the
    /// session has already closed, the callback is scheduled right away.
    pub async fn set_close_callback(&self, callback: CloseCallback) {
        let mut slot = self.close_slot.lock().await;
        slot.callback = Some(callback.clone());
        if slot.fired {
            return;
        }
        if let Some(exit_code) = self.state.read().await.exit_code {
            slot.fired = true;
            tokio::spawn(callback(exit_code));
        }
    }

    /// Close the session. Returns `false` if it was already closed.
    pub async fn close(&self, exit_code: i64) -> bool {
        let size = {
            let mut state = self.state.write().await;
            if state.closed {
                return false;
            }
            state.closed = true;
            state.exit_code = Some(exit_code);
            state.size
        };

        if let Some(mut input) = self.writer.lock().await.take() {
            if let Err(e) = input.shutdown().await {
                debug!(session_id = %self.id, error = %e, "Failed to shut down exec input");
            }
        }

        self.lifetime.cancel();

        {
            let mut slot = self.close_slot.lock().await;
            if !slot.fired {
                if let Some(callback) = slot.callback.clone() {
                    slot.fired = true;
                    tokio::spawn(callback(exit_code));
                }
            }
        }

        self.spawn_wake_nudge(size);
        let lifetime_secs = (Utc::now() - self.created_at).num_milliseconds() as f64 / 1000.0;
        crate::metrics::record_terminal_closed(&self.stack_name, lifetime_secs);

        info!(
            session_id = %self.id,
            stack = %self.stack_name,
            service = %self.service_name,
            container_id = %self.container_id,
            exit_code,
            "Terminal session closed"
        );
        true
    }

    /// Poke an exec that may still be blocked on its closed stdin.
    /// Re-sending the geometry delivers SIGWINCH; this does not kill it.
    fn spawn_wake_nudge(&self, size: TerminalSize) {
        let runtime = self.runtime.clone();
        let exec_id = self.exec_id.clone();
        tokio::spawn(async move {
            match runtime.inspect_exec(&exec_id).await {
                Ok(status) if status.running && size.is_valid() => {
                    if let Err(e) = runtime.resize_exec(&exec_id, size.cols, size.rows).await {
                        debug!(exec_id = %exec_id, error = %e, "Wake nudge failed");
                    }
                }
                Ok(_) => {}
                Err(e) => debug!(exec_id = %exec_id, error = %e, "Wake nudge inspect failed"),
            }
        });
    }

    /// Wait for an output callback; `None` once the session is closed
    async fn output_callback(&self) -> Option<OutputCallback> {
        loop {
            let ready = self.output_ready.notified();
            if let Some(callback) = self.output_callback.lock().await.clone() {
                return Some(callback);
            }
            tokio::select! {
                biased;
                _ = self.lifetime.cancelled() => return None,
                _ = ready => {}
            }
        }
    }

    async fn deliver(&self, chunk: Bytes) -> bool {
        match self.output_callback().await {
            Some(callback) => {
                callback(chunk).await;
                true
            }
            None => false,
        }
    }

    /// Exit code reported by the runtime, 0 when it cannot be determined
    async fn inspect_exit_code(&self) -> i64 {
        match self.runtime.inspect_exec(&self.exec_id).await {
            Ok(status) => status.exit_code.unwrap_or(0),
            Err(e) => {
                debug!(session_id = %self.id, error = %e, "Failed to inspect exec exit code");
                0
            }
        }
    }

    pub async fn info(&self) -> TerminalSessionInfo {
        let size = self.size().await;
        TerminalSessionInfo {
            session_id: self.id.clone(),
            stack_name: self.stack_name.clone(),
            service_name: self.service_name.clone(),
            container_id: self.container_id.clone(),
            exec_id: self.exec_id.clone(),
            shell: self.shell.clone(),
            cols: size.cols,
            rows: size.rows,
            created_at: self.created_at,
        }
    }
}

impl fmt::Debug for TerminalSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalSession")
            .field("id", &self.id)
            .field("stack_name", &self.stack_name)
            .field("service_name", &self.service_name)
            .field("container_id", &self.container_id)
            .field("exec_id", &self.exec_id)
            .finish_non_exhaustive()
    }
}

/// Output pump settings
#[derive(Debug, Clone)]
pub(crate) struct PumpSettings {
    pub chunk_size: usize,
    pub boot_grace: Duration,
    pub attempted_shells: String,
}

enum PumpExit {
    Cancelled,
    Eof,
    ReadError(std::io::Error),
}

/// Spawn the task that forwards exec output to the session's callback
pub(crate) fn spawn_output_pump(
    session: SessionHandle,
    output: ExecOutput,
    registry: SessionRegistry,
    settings: PumpSettings,
) {
    tokio::spawn(run_output_pump(session, output, registry, settings));
}

async fn run_output_pump(
    session: SessionHandle,
    mut output: ExecOutput,
    registry: SessionRegistry,
    settings: PumpSettings,
) {
    let lifetime = session.lifetime();
    let guard = tokio::time::sleep(settings.boot_grace);
    tokio::pin!(guard);
    let mut received = false;

    let exit = loop {
        tokio::select! {
            biased;
            _ = lifetime.cancelled() => break PumpExit::Cancelled,
            _ = &mut guard, if !received => {
                received = true;
                warn!(
                    session_id = %session.id,
                    container_id = %session.container_id,
                    "No output from shell within boot grace period"
                );
                let notice = format!(
                    "\r\nNo output received from the container within {}s. \
                     The shell may not support interactive use (tried: {}).\r\n",
                    settings.boot_grace.as_secs(),
                    settings.attempted_shells,
                );
                session.deliver(Bytes::from(notice)).await;
            }
            item = output.next() => match item {
                Some(Ok(mut chunk)) => {
                    received = received || !chunk.is_empty();
                    while !chunk.is_empty() {
                        let piece = chunk.split_to(chunk.len().min(settings.chunk_size));
                        if !session.deliver(piece).await {
                            break;
                        }
                    }
                }
                Some(Err(e)) => break PumpExit::ReadError(e),
                None => break PumpExit::Eof,
            },
        }
    };

    let exit_code = match exit {
        PumpExit::Cancelled => {
            debug!(session_id = %session.id, "Output pump stopped");
            return;
        }
        PumpExit::Eof => session.inspect_exit_code().await,
        PumpExit::ReadError(e) => {
            warn!(session_id = %session.id, error = %e, "Exec stream read failed");
            session.inspect_exit_code().await
        }
    };

    registry.remove(&session.id).await;
    session.close(exit_code).await;
}
