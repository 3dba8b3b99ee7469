//! Terminal session registry and creation

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TerminalConfig;
use crate::container::{ContainerRuntime, ExecAttachment, ExecSpec};
use crate::models::TerminalSessionInfo;

use super::error::TerminalError;
use super::session::{
    spawn_output_pump, PumpSettings, SessionHandle, SessionParts, TerminalSession, TerminalSize,
};
use super::shell::{find_shell, ShellCandidate};

/// Session id → session map
#[derive(Clone, Default)]
pub(crate) struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionHandle>>>,
}

impl SessionRegistry {
    /// Insert a session; `false` if its id is already taken
    pub(crate) async fn insert(&self, session: SessionHandle) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return false;
        }
        sessions.insert(session.id.clone(), session);
        true
    }

    pub(crate) async fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(id).cloned()
    }

    pub(crate) async fn contains(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub(crate) async fn remove(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.write().await.remove(id)
    }

    pub(crate) async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub(crate) async fn all(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Remove every session in one lock acquisition
    pub(crate) async fn drain(&self) -> Vec<SessionHandle> {
        self.sessions.write().await.drain().map(|(_, s)| s).collect()
    }
}

/// Owns every interactive terminal session of the process
pub struct SessionManager {
    runtime: Arc<dyn ContainerRuntime>,
    registry: SessionRegistry,
    config: TerminalConfig,
    shells: Vec<ShellCandidate>,
    root: CancellationToken,
}

impl SessionManager {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: TerminalConfig) -> Self {
        let shells = ShellCandidate::parse_all(&config.shells);
        Self {
            runtime,
            registry: SessionRegistry::default(),
            config,
            shells,
            root: CancellationToken::new(),
        }
    }

    /// Probe for a shell in the container, attach an interactive exec to it
    /// and register the resulting session
    pub async fn create_session(
        &self,
        stack_name: &str,
        service_name: &str,
        container_id: &str,
        size: TerminalSize,
    ) -> Result<SessionHandle, TerminalError> {
        if self.root.is_cancelled() {
            crate::metrics::record_terminal_start_failure(TerminalError::ShuttingDown.kind());
            return Err(TerminalError::ShuttingDown);
        }
        let lifetime = self.root.child_token();

        let (shell, exec_id, attachment) = match self.open_shell(container_id, size).await {
            Ok(opened) => opened,
            Err(e) => {
                lifetime.cancel();
                crate::metrics::record_terminal_start_failure(e.kind());
                return Err(e);
            }
        };

        let id = self.generate_session_id().await;
        let session = Arc::new(TerminalSession::new(SessionParts {
            id: id.clone(),
            stack_name: stack_name.to_string(),
            service_name: service_name.to_string(),
            container_id: container_id.to_string(),
            exec_id: exec_id.clone(),
            shell: shell.to_string(),
            size,
            input: attachment.input,
            lifetime,
            runtime: self.runtime.clone(),
        }));

        if !self.registry.insert(session.clone()).await {
            // Only reachable on a UUID collision between generation and insert
            session.close(0).await;
            return Err(TerminalError::runtime(
                "register session",
                &id,
                anyhow::anyhow!("session id already in use"),
            ));
        }

        // Shutdown may have drained the registry while the shell was probed
        if self.root.is_cancelled() {
            self.registry.remove(&id).await;
            session.close(0).await;
            crate::metrics::record_terminal_start_failure(TerminalError::ShuttingDown.kind());
            return Err(TerminalError::ShuttingDown);
        }

        spawn_output_pump(
            session.clone(),
            attachment.output,
            self.registry.clone(),
            PumpSettings {
                chunk_size: self.config.output_chunk_size.max(1),
                boot_grace: self.config.boot_grace(),
                attempted_shells: self.attempted_shells().join(", "),
            },
        );

        crate::metrics::record_terminal_opened(stack_name);
        info!(
            session_id = %id,
            stack = stack_name,
            service = service_name,
            container_id,
            exec_id = %exec_id,
            shell = %shell,
            cols = size.cols,
            rows = size.rows,
            "Terminal session created"
        );

        Ok(session)
    }

    async fn open_shell(
        &self,
        container_id: &str,
        size: TerminalSize,
    ) -> Result<(ShellCandidate, String, ExecAttachment), TerminalError> {
        let shell = find_shell(
            self.runtime.as_ref(),
            container_id,
            &self.shells,
            self.config.probe_delay(),
        )
        .await
        .cloned()
        .ok_or_else(|| {
            warn!(container_id, "No compatible shell found");
            TerminalError::NoCompatibleShell {
                attempted: self.attempted_shells(),
            }
        })?;

        let exec_id = self
            .runtime
            .create_exec(container_id, ExecSpec::interactive(shell.command()))
            .await
            .map_err(|e| TerminalError::runtime("create exec in container", container_id, e))?;

        let attachment = self
            .runtime
            .start_exec(&exec_id)
            .await
            .map_err(|e| TerminalError::runtime("attach to exec", &exec_id, e))?;

        if size.is_valid() {
            if let Err(e) = self.runtime.resize_exec(&exec_id, size.cols, size.rows).await {
                debug!(exec_id = %exec_id, error = %e, "Initial resize failed");
            }
        }

        Ok((shell, exec_id, attachment))
    }

    async fn generate_session_id(&self) -> String {
        loop {
            let id = Uuid::new_v4().to_string();
            if !self.registry.contains(&id).await {
                return id;
            }
        }
    }

    fn attempted_shells(&self) -> Vec<String> {
        self.shells.iter().map(ToString::to_string).collect()
    }

    pub async fn get_session(&self, id: &str) -> Option<SessionHandle> {
        self.registry.get(id).await
    }

    /// Remove a session from the registry and close it.
    /// Returns `false` if no such session was registered.
    pub async fn close_session(&self, id: &str, exit_code: i64) -> bool {
        match self.registry.remove(id).await {
            Some(session) => {
                session.close(exit_code).await;
                true
            }
            None => false,
        }
    }

    pub async fn list_sessions(&self) -> Vec<TerminalSessionInfo> {
        let mut sessions = Vec::new();
        for session in self.registry.all().await {
            sessions.push(session.info().await);
        }
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sessions
    }

    pub async fn session_count(&self) -> usize {
        self.registry.len().await
    }

    /// Close every session and empty the registry. Later `create_session`
    /// calls fail with [`TerminalError::ShuttingDown`].
    pub async fn shutdown(&self) {
        self.root.cancel();
        let sessions = self.registry.drain().await;
        let count = sessions.len();
        for session in sessions {
            session.close(0).await;
        }
        info!(count, "Terminal sessions closed on shutdown");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use futures::FutureExt;
    use tokio::sync::mpsc;

    use super::*;
    use crate::container::testing::FakeRuntime;
    use crate::terminal::session::OutputCallback;

    fn test_config() -> TerminalConfig {
        TerminalConfig {
            probe_delay_ms: 1,
            ..TerminalConfig::default()
        }
    }

    fn manager_with(runtime: Arc<FakeRuntime>) -> SessionManager {
        SessionManager::new(runtime, test_config())
    }

    #[tokio::test]
    async fn test_lookup_while_open_and_not_found_after_close() {
        let manager = manager_with(Arc::new(FakeRuntime::with_shells(&["/bin/sh"])));

        let session = manager
            .create_session("demo", "web", "c-demo-web", TerminalSize::default())
            .await
            .unwrap();
        assert!(!session.id.is_empty());

        let found = manager.get_session(&session.id).await.unwrap();
        assert!(Arc::ptr_eq(&found, &session));

        assert!(manager.close_session(&session.id, 0).await);
        assert!(manager.get_session(&session.id).await.is_none());
        assert!(session.is_closed().await);

        // Removal is idempotent
        assert!(!manager.close_session(&session.id, 0).await);
    }

    #[tokio::test]
    async fn test_session_ids_are_unique() {
        let manager = manager_with(Arc::new(FakeRuntime::with_shells(&["/bin/sh"])));

        let a = manager
            .create_session("demo", "web", "c-demo-web", TerminalSize::default())
            .await
            .unwrap();
        let b = manager
            .create_session("demo", "web", "c-demo-web", TerminalSize::default())
            .await
            .unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(manager.session_count().await, 2);
    }

    #[tokio::test]
    async fn test_no_compatible_shell_leaves_registry_empty() {
        let manager = manager_with(Arc::new(FakeRuntime::with_shells(&[])));

        let err = manager
            .create_session("demo", "web", "c-demo-web", TerminalSize::default())
            .await
            .unwrap_err();

        match err {
            TerminalError::NoCompatibleShell { attempted } => {
                assert_eq!(attempted.first().map(String::as_str), Some("/bin/bash -l"));
                assert_eq!(attempted.len(), TerminalConfig::default().shells.len());
            }
            other => panic!("expected NoCompatibleShell, got {other:?}"),
        }
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_interactive_exec_uses_winning_shell_and_geometry() {
        let runtime = Arc::new(FakeRuntime::with_shells(&["/bin/ash"]));
        let manager = manager_with(runtime.clone());

        let session = manager
            .create_session("demo", "web", "c-demo-web", TerminalSize::new(132, 43))
            .await
            .unwrap();

        assert_eq!(session.shell, "/bin/ash");
        let commands = runtime.exec_commands();
        assert_eq!(commands.last().unwrap(), &vec!["/bin/ash".to_string()]);
        assert_eq!(
            runtime.resizes(),
            vec![(session.exec_id().to_string(), 132, 43)]
        );
    }

    #[tokio::test]
    async fn test_echo_through_manager_session() {
        let manager = manager_with(Arc::new(FakeRuntime::with_shells(&["/bin/sh"])));
        let session = manager
            .create_session("demo", "web", "c-demo-web", TerminalSize::default())
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
        let callback: OutputCallback = Arc::new(move |chunk: Bytes| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(chunk);
            }
            .boxed()
        });
        session.set_output_callback(callback).await;

        session.write(b"whoami\n").await.unwrap();

        let mut echoed = Vec::new();
        while echoed.len() < 7 {
            let chunk = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            echoed.extend_from_slice(&chunk);
        }
        assert_eq!(echoed, b"whoami\n");
    }

    #[tokio::test]
    async fn test_process_exit_removes_session() {
        let runtime = Arc::new(FakeRuntime::with_shells(&["/bin/sh"]));
        let manager = manager_with(runtime.clone());
        let session = manager
            .create_session("demo", "web", "c-demo-web", TerminalSize::default())
            .await
            .unwrap();

        runtime.finish(session.exec_id(), 0);

        tokio::time::timeout(Duration::from_secs(2), session.lifetime().cancelled())
            .await
            .unwrap();
        // Pump removes before closing, so once cancelled the entry is gone
        assert!(manager.get_session(&session.id).await.is_none());
    }

    #[tokio::test]
    async fn test_list_sessions() {
        let manager = manager_with(Arc::new(FakeRuntime::with_shells(&["/bin/sh"])));
        let session = manager
            .create_session("demo", "web", "c-demo-web", TerminalSize::new(100, 30))
            .await
            .unwrap();

        let listed = manager.list_sessions().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].session_id, session.id);
        assert_eq!(listed[0].stack_name, "demo");
        assert_eq!(listed[0].cols, 100);
        assert_eq!(listed[0].rows, 30);
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything() {
        let manager = manager_with(Arc::new(FakeRuntime::with_shells(&["/bin/sh"])));
        let a = manager
            .create_session("demo", "web", "c-demo-web", TerminalSize::default())
            .await
            .unwrap();
        let b = manager
            .create_session("demo", "web", "c-demo-web", TerminalSize::default())
            .await
            .unwrap();

        manager.shutdown().await;

        assert_eq!(manager.session_count().await, 0);
        assert!(a.is_closed().await);
        assert!(b.is_closed().await);
    }

    #[tokio::test]
    async fn test_create_after_shutdown_is_refused() {
        let runtime = Arc::new(FakeRuntime::with_shells(&["/bin/sh"]));
        let manager = manager_with(runtime.clone());
        manager.shutdown().await;

        let err = manager
            .create_session("demo", "web", "c-demo-web", TerminalSize::default())
            .await
            .unwrap_err();

        assert!(matches!(err, TerminalError::ShuttingDown));
        assert_eq!(err.summary(), "Agent is shutting down");
        assert_eq!(manager.session_count().await, 0);
        // Refused before any exec was created
        assert!(runtime.exec_commands().is_empty());
    }
}
