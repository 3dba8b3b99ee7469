//! Terminal WebSocket connection handling
//!
//! One connection drives at most one session. A single reader loop owns the
//! state machine; the keepalive ticker and the session callbacks write to
//! the same socket through [`SocketWriter`].

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{FutureExt, SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audit::{self, AuditLogger};
use crate::config::TerminalConfig;
use crate::container::{ContainerResolver, ResolveError};

use super::manager::SessionManager;
use super::protocol::{
    ClientMessage, CloseRequest, InputRequest, ResizeRequest, ServerMessage, StartRequest,
    Utf8Decoder,
};
use super::session::{CloseCallback, OutputCallback, SessionHandle, TerminalSize};

/// Timing knobs for one connection
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub ping_interval: Duration,
    pub read_deadline: Duration,
    pub close_flush: Duration,
}

impl From<&TerminalConfig> for ConnectionSettings {
    fn from(config: &TerminalConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            read_deadline: config.read_deadline(),
            close_flush: config.close_flush(),
        }
    }
}

/// Everything a connection needs from the rest of the agent
#[derive(Clone)]
pub struct ConnectionContext {
    pub sessions: Arc<SessionManager>,
    pub resolver: Arc<ContainerResolver>,
    pub audit: Arc<AuditLogger>,
    pub user_id: String,
    pub settings: ConnectionSettings,
}

/// Serialized writer half of the socket
#[derive(Clone)]
struct SocketWriter {
    sink: Arc<Mutex<SplitSink<WebSocket, Message>>>,
}

impl SocketWriter {
    fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    async fn send(&self, message: &ServerMessage) -> bool {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to encode terminal message");
                return false;
            }
        };
        self.sink.lock().await.send(Message::Text(text)).await.is_ok()
    }

    async fn ping(&self) -> bool {
        self.sink
            .lock()
            .await
            .send(Message::Ping(Vec::new()))
            .await
            .is_ok()
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    }
}

enum ConnectionState {
    AwaitingStart,
    SessionActive(SessionHandle),
    Closed,
}

enum Flow {
    Continue,
    Stop,
}

struct Connection {
    ctx: ConnectionContext,
    writer: SocketWriter,
    state: ConnectionState,
    /// Cancelled when the session's close callback has reported the exit
    done: CancellationToken,
}

/// Drive an upgraded terminal socket until it closes
pub async fn serve(socket: WebSocket, ctx: ConnectionContext) {
    let (sink, mut stream) = socket.split();
    let writer = SocketWriter::new(sink);
    let done = CancellationToken::new();
    let keepalive = spawn_keepalive(writer.clone(), ctx.settings.ping_interval, done.clone());
    let read_deadline = ctx.settings.read_deadline;

    info!(user_id = %ctx.user_id, "Terminal WebSocket connected");

    let mut conn = Connection {
        ctx,
        writer: writer.clone(),
        state: ConnectionState::AwaitingStart,
        done: done.clone(),
    };

    loop {
        let frame = tokio::select! {
            _ = done.cancelled() => break,
            frame = tokio::time::timeout(read_deadline, stream.next()) => frame,
        };

        let message = match frame {
            Err(_) => {
                info!(user_id = %conn.ctx.user_id, "Terminal WebSocket idle past read deadline");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(error = %e, "Terminal WebSocket read failed");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        let flow = match message {
            Message::Text(text) => conn.handle_text(&text).await,
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => conn.handle_text(text).await,
                Err(_) => {
                    conn.reply_error("Invalid message format", "frame is not UTF-8 text")
                        .await;
                    Flow::Continue
                }
            },
            Message::Close(_) => Flow::Stop,
            // Pongs only need to reset the read deadline
            Message::Ping(_) | Message::Pong(_) => Flow::Continue,
        };

        if let Flow::Stop = flow {
            break;
        }
    }

    done.cancel();
    keepalive.abort();
    conn.teardown().await;
    writer.close().await;

    info!(user_id = %conn.ctx.user_id, "Terminal WebSocket disconnected");
}

fn spawn_keepalive(
    writer: SocketWriter,
    interval: Duration,
    done: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        loop {
            tokio::select! {
                _ = done.cancelled() => break,
                _ = ticker.tick() => {
                    if !writer.ping().await {
                        debug!("Terminal WebSocket ping failed");
                        done.cancel();
                        break;
                    }
                }
            }
        }
    })
}

impl Connection {
    async fn handle_text(&mut self, text: &str) -> Flow {
        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Rejected terminal frame");
                self.reply_error("Invalid message format", e.to_string()).await;
                return Flow::Continue;
            }
        };

        match message {
            ClientMessage::Start(request) => self.start(request).await,
            ClientMessage::Input(request) => self.input(request).await,
            ClientMessage::Resize(request) => self.resize(request).await,
            ClientMessage::Close(request) => return self.close(request).await,
            ClientMessage::Unknown(kind) => {
                self.reply_error("Unknown message type", kind).await;
            }
        }
        Flow::Continue
    }

    async fn reply_error(&self, error: &str, context: impl Into<String>) {
        self.writer.send(&ServerMessage::error(error, context)).await;
    }

    /// The active session, or an error reply when there is none
    async fn active_session(&self, claimed_id: &str) -> Option<SessionHandle> {
        let session = match &self.state {
            ConnectionState::SessionActive(session) => session.clone(),
            _ => {
                self.reply_error("No active session", "send terminal_start first")
                    .await;
                return None;
            }
        };
        if claimed_id != session.id {
            self.reply_error("Session ID mismatch", claimed_id).await;
            return None;
        }
        Some(session)
    }

    async fn start(&mut self, request: StartRequest) {
        if let ConnectionState::SessionActive(session) = &self.state {
            let id = session.id.clone();
            self.reply_error("Session already active", id).await;
            return;
        }

        if request.stack_name.is_empty() || request.service_name.is_empty() {
            self.reply_error(
                "Missing required fields",
                "stack_name and service_name are required",
            )
            .await;
            return;
        }

        let container = match self
            .ctx
            .resolver
            .resolve(
                &request.stack_name,
                &request.service_name,
                request.container_name.as_deref(),
            )
            .await
        {
            Ok(container) => container,
            Err(e) => {
                self.report_resolve_failure(&request, &e);
                self.reply_error(e.summary(), e.context()).await;
                return;
            }
        };

        let size = TerminalSize::new(request.cols, request.rows);
        let session = match self
            .ctx
            .sessions
            .create_session(&request.stack_name, &request.service_name, &container.id, size)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!(
                    user_id = %self.ctx.user_id,
                    stack = %request.stack_name,
                    service = %request.service_name,
                    container_id = %container.id,
                    error = ?e,
                    "Failed to start terminal session"
                );
                self.ctx.audit.log(&audit::create_terminal_denied_event(
                    &self.ctx.user_id,
                    &request.stack_name,
                    &request.service_name,
                    e.summary(),
                ));
                self.reply_error(e.summary(), e.context()).await;
                return;
            }
        };

        session.set_close_callback(self.close_callback(&session)).await;
        self.writer.send(&ServerMessage::started(&session.id)).await;
        session.set_output_callback(self.output_callback(&session)).await;

        self.ctx.audit.log(&audit::create_terminal_opened_event(
            &self.ctx.user_id,
            &session.id,
            &session.stack_name,
            &session.service_name,
            &session.container_id,
        ));
        self.state = ConnectionState::SessionActive(session);
    }

    fn report_resolve_failure(&self, request: &StartRequest, error: &ResolveError) {
        crate::metrics::record_resolve_failure(error.summary());
        warn!(
            user_id = %self.ctx.user_id,
            stack = %request.stack_name,
            service = %request.service_name,
            error = ?error,
            "Container resolution failed"
        );
        let event = match error {
            ResolveError::StackMismatch {
                container_id,
                expected,
                actual,
            } => audit::create_stack_mismatch_event(&self.ctx.user_id, container_id, expected, actual),
            other => audit::create_terminal_denied_event(
                &self.ctx.user_id,
                &request.stack_name,
                &request.service_name,
                other.summary(),
            ),
        };
        self.ctx.audit.log(&event);
    }

    fn output_callback(&self, session: &SessionHandle) -> OutputCallback {
        let writer = self.writer.clone();
        let session_id = session.id.clone();
        let decoder = Arc::new(Mutex::new(Utf8Decoder::default()));

        Arc::new(move |chunk: Bytes| {
            let writer = writer.clone();
            let session_id = session_id.clone();
            let decoder = decoder.clone();
            async move {
                let text = decoder.lock().await.decode(&chunk);
                if text.is_empty() {
                    return;
                }
                if !writer.send(&ServerMessage::output(&session_id, text)).await {
                    debug!(session_id = %session_id, "Dropped terminal output for closed socket");
                }
            }
            .boxed()
        })
    }

    fn close_callback(&self, session: &SessionHandle) -> CloseCallback {
        let writer = self.writer.clone();
        let done = self.done.clone();
        let audit_logger = self.ctx.audit.clone();
        let user_id = self.ctx.user_id.clone();
        let session_id = session.id.clone();

        Arc::new(move |exit_code: i64| {
            let writer = writer.clone();
            let done = done.clone();
            let audit_logger = audit_logger.clone();
            let user_id = user_id.clone();
            let session_id = session_id.clone();
            async move {
                audit_logger.log(&audit::create_terminal_closed_event(
                    &user_id,
                    &session_id,
                    exit_code,
                ));
                writer
                    .send(&ServerMessage::closed(&session_id, exit_code))
                    .await;
                done.cancel();
            }
            .boxed()
        })
    }

    async fn input(&self, request: InputRequest) {
        let Some(session) = self.active_session(&request.session_id).await else {
            return;
        };
        if let Err(e) = session.write(request.input.as_bytes()).await {
            warn!(session_id = %session.id, error = ?e, "Terminal input failed");
            self.reply_error(e.summary(), e.context()).await;
        }
    }

    async fn resize(&self, request: ResizeRequest) {
        let Some(session) = self.active_session(&request.session_id).await else {
            return;
        };
        if let Err(e) = session.resize(request.cols, request.rows).await {
            warn!(session_id = %session.id, error = ?e, "Terminal resize failed");
            self.reply_error(e.summary(), e.context()).await;
        }
    }

    async fn close(&mut self, request: CloseRequest) -> Flow {
        // The session id is optional on close
        let claimed = match (&self.state, request.session_id) {
            (_, Some(id)) if !id.is_empty() => id,
            (ConnectionState::SessionActive(session), _) => session.id.clone(),
            _ => String::new(),
        };
        let Some(session) = self.active_session(&claimed).await else {
            return Flow::Continue;
        };

        if !self.ctx.sessions.close_session(&session.id, 0).await {
            // Already removed by its output pump; make sure it is closed
            session.close(0).await;
        }
        tokio::time::sleep(self.ctx.settings.close_flush).await;
        // terminal_close goes out before the socket's Close frame
        let _ = tokio::time::timeout(self.ctx.settings.close_flush, self.done.cancelled()).await;

        self.state = ConnectionState::Closed;
        Flow::Stop
    }

    /// Best-effort close of a session the client walked away from
    async fn teardown(&mut self) {
        let state = std::mem::replace(&mut self.state, ConnectionState::Closed);
        if let ConnectionState::SessionActive(session) = state {
            if self.ctx.sessions.close_session(&session.id, 0).await {
                debug!(session_id = %session.id, "Closed terminal session on disconnect");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tokio::net::TcpStream;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use crate::api::{create_jwt, create_router};
    use crate::config::AppConfig;
    use crate::container::testing::{compose_container, FakeRuntime};
    use crate::AppState;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn spawn_server(runtime: Arc<FakeRuntime>) -> (String, Arc<AppState>) {
        spawn_server_with(runtime, |_| {}).await
    }

    async fn spawn_server_with(
        runtime: Arc<FakeRuntime>,
        configure: impl FnOnce(&mut AppConfig),
    ) -> (String, Arc<AppState>) {
        let mut config = AppConfig::default();
        config.terminal.probe_delay_ms = 1;
        config.terminal.close_flush_ms = 10;
        configure(&mut config);
        let state = Arc::new(AppState::new(config, runtime));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let token = create_jwt("alice", false, &state.config.security.jwt_secret, 3600).unwrap();
        let url = format!("ws://{}/api/v1/terminal/ws?token={}", addr, token);
        (url, state)
    }

    async fn send(client: &mut Client, value: Value) {
        client
            .send(WsMessage::Text(value.to_string()))
            .await
            .unwrap();
    }

    /// Next JSON frame, skipping pings
    async fn recv(client: &mut Client) -> Value {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(3), client.next())
                .await
                .expect("timed out waiting for frame")
                .expect("socket closed")
                .unwrap();
            if let WsMessage::Text(text) = frame {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    /// Receive frames until one of the given type arrives
    async fn recv_type(client: &mut Client, kind: &str) -> Value {
        loop {
            let frame = recv(client).await;
            if frame["type"] == kind {
                return frame;
            }
        }
    }

    async fn start(client: &mut Client) -> String {
        send(
            client,
            json!({"type": "terminal_start", "stack_name": "demo", "service_name": "web", "cols": 80, "rows": 24}),
        )
        .await;
        let reply = recv(client).await;
        assert_eq!(reply["type"], "success");
        let id = reply["session_id"].as_str().unwrap().to_string();
        assert!(!id.is_empty());
        id
    }

    #[tokio::test]
    async fn test_start_input_mismatch_and_close() {
        let (url, state) = spawn_server(Arc::new(FakeRuntime::with_shells(&["/bin/sh"]))).await;
        let (mut client, _) = connect_async(url).await.unwrap();

        let session_id = start(&mut client).await;
        assert_eq!(state.terminal_manager.session_count().await, 1);

        send(
            &mut client,
            json!({"type": "terminal_input", "session_id": "not-the-session", "input": "x"}),
        )
        .await;
        let reply = recv(&mut client).await;
        assert_eq!(
            reply,
            json!({"type": "error", "error": "Session ID mismatch", "context": "not-the-session"})
        );

        // The real session is still usable
        send(
            &mut client,
            json!({"type": "terminal_input", "session_id": session_id, "input": "echo ok\n"}),
        )
        .await;
        let mut echoed = String::new();
        while echoed.len() < "echo ok\n".len() {
            let frame = recv_type(&mut client, "terminal_output").await;
            assert_eq!(frame["session_id"], session_id.as_str());
            echoed.push_str(frame["output"].as_str().unwrap());
        }
        assert_eq!(echoed, "echo ok\n");

        send(
            &mut client,
            json!({"type": "terminal_close", "session_id": session_id}),
        )
        .await;
        let closed = recv_type(&mut client, "terminal_close").await;
        assert_eq!(closed["session_id"], session_id.as_str());
        assert_eq!(closed["exit_code"], 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(state.terminal_manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_requests_before_start_are_rejected() {
        let (url, state) = spawn_server(Arc::new(FakeRuntime::with_shells(&["/bin/sh"]))).await;
        let (mut client, _) = connect_async(url).await.unwrap();

        send(
            &mut client,
            json!({"type": "terminal_input", "session_id": "s1", "input": "ls\n"}),
        )
        .await;
        assert_eq!(recv(&mut client).await["error"], "No active session");

        send(&mut client, json!({"type": "terminal_launch"})).await;
        let reply = recv(&mut client).await;
        assert_eq!(reply["error"], "Unknown message type");
        assert_eq!(reply["context"], "terminal_launch");

        client
            .send(WsMessage::Text("{not json".to_string()))
            .await
            .unwrap();
        assert_eq!(recv(&mut client).await["error"], "Invalid message format");

        send(&mut client, json!({"type": "terminal_start", "stack_name": "demo"})).await;
        assert_eq!(recv(&mut client).await["error"], "Missing required fields");

        assert_eq!(state.terminal_manager.session_count().await, 0);

        // Still able to start after the rejections
        start(&mut client).await;
    }

    #[tokio::test]
    async fn test_resolution_failure_allows_retry() {
        let (url, _state) = spawn_server(Arc::new(FakeRuntime::with_shells(&["/bin/sh"]))).await;
        let (mut client, _) = connect_async(url).await.unwrap();

        send(
            &mut client,
            json!({"type": "terminal_start", "stack_name": "demo", "service_name": "db"}),
        )
        .await;
        let reply = recv(&mut client).await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["error"], "Container not found");

        start(&mut client).await;
    }

    #[tokio::test]
    async fn test_no_shell_reported_in_band() {
        let (url, state) = spawn_server(Arc::new(FakeRuntime::with_shells(&[]))).await;
        let (mut client, _) = connect_async(url).await.unwrap();

        send(
            &mut client,
            json!({"type": "terminal_start", "stack_name": "demo", "service_name": "web"}),
        )
        .await;
        let reply = recv(&mut client).await;
        assert_eq!(reply["error"], "No compatible shell found");
        assert!(reply["context"].as_str().unwrap().contains("/bin/sh"));
        assert_eq!(state.terminal_manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_second_start_rejected_and_process_exit_reported() {
        let runtime = Arc::new(FakeRuntime::with_shells(&["/bin/sh"]));
        let (url, state) = spawn_server(runtime.clone()).await;
        let (mut client, _) = connect_async(url).await.unwrap();

        let session_id = start(&mut client).await;

        send(
            &mut client,
            json!({"type": "terminal_start", "stack_name": "demo", "service_name": "web"}),
        )
        .await;
        let reply = recv(&mut client).await;
        assert_eq!(reply["error"], "Session already active");
        assert_eq!(reply["context"], session_id.as_str());

        let session = state.terminal_manager.get_session(&session_id).await.unwrap();
        runtime.finish(session.exec_id(), 3);

        let closed = recv_type(&mut client, "terminal_close").await;
        assert_eq!(closed["exit_code"], 3);
    }

    #[tokio::test]
    async fn test_disconnect_closes_session() {
        let (url, state) = spawn_server(Arc::new(FakeRuntime::with_shells(&["/bin/sh"]))).await;
        let (mut client, _) = connect_async(url).await.unwrap();

        let session_id = start(&mut client).await;
        let session = state.terminal_manager.get_session(&session_id).await.unwrap();
        drop(client);

        tokio::time::timeout(Duration::from_secs(3), session.lifetime().cancelled())
            .await
            .unwrap();
        assert_eq!(state.terminal_manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_resize_checks_session_id() {
        let runtime = Arc::new(FakeRuntime::with_shells(&["/bin/sh"]));
        let (url, state) = spawn_server(runtime.clone()).await;
        let (mut client, _) = connect_async(url).await.unwrap();

        let session_id = start(&mut client).await;
        let exec_id = state
            .terminal_manager
            .get_session(&session_id)
            .await
            .unwrap()
            .exec_id()
            .to_string();

        send(
            &mut client,
            json!({"type": "terminal_resize", "session_id": "someone-else", "cols": 120, "rows": 40}),
        )
        .await;
        assert_eq!(
            recv(&mut client).await,
            json!({"type": "error", "error": "Session ID mismatch", "context": "someone-else"})
        );
        assert!(!runtime.resizes().contains(&(exec_id.clone(), 120, 40)));

        send(
            &mut client,
            json!({"type": "terminal_resize", "session_id": session_id, "cols": 120, "rows": 40}),
        )
        .await;
        tokio::time::timeout(Duration::from_secs(3), async {
            while !runtime.resizes().contains(&(exec_id.clone(), 120, 40)) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("resize never reached the runtime");
    }

    #[tokio::test]
    async fn test_close_without_session_id_closes_active_session() {
        let (url, state) = spawn_server(Arc::new(FakeRuntime::with_shells(&["/bin/sh"]))).await;
        let (mut client, _) = connect_async(url).await.unwrap();

        let session_id = start(&mut client).await;
        send(&mut client, json!({"type": "terminal_close"})).await;

        let closed = recv_type(&mut client, "terminal_close").await;
        assert_eq!(closed["session_id"], session_id.as_str());
        assert_eq!(closed["exit_code"], 0);
        assert!(state.terminal_manager.get_session(&session_id).await.is_none());
        assert_eq!(state.terminal_manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_binary_frames_are_decoded_as_text() {
        let (url, _state) = spawn_server(Arc::new(FakeRuntime::with_shells(&["/bin/sh"]))).await;
        let (mut client, _) = connect_async(url).await.unwrap();

        client
            .send(WsMessage::Binary(vec![0xff, 0xfe, 0x7b]))
            .await
            .unwrap();
        assert_eq!(recv(&mut client).await["error"], "Invalid message format");

        client
            .send(WsMessage::Binary(br#"{"type":"terminal_launch"}"#.to_vec()))
            .await
            .unwrap();
        let reply = recv(&mut client).await;
        assert_eq!(reply["error"], "Unknown message type");
        assert_eq!(reply["context"], "terminal_launch");
    }

    #[tokio::test]
    async fn test_silent_client_hits_read_deadline() {
        let (url, state) = spawn_server_with(
            Arc::new(FakeRuntime::with_shells(&["/bin/sh"])),
            |config| {
                config.terminal.ping_interval_secs = 1;
                config.terminal.read_deadline_secs = 2;
            },
        )
        .await;
        let (mut client, _) = connect_async(url).await.unwrap();

        start(&mut client).await;
        assert_eq!(state.terminal_manager.session_count().await, 1);

        // The client never reads again, so server pings go unanswered
        tokio::time::timeout(Duration::from_secs(6), async {
            while state.terminal_manager.session_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await
        .expect("session outlived the read deadline");
        drop(client);
    }

    #[tokio::test]
    async fn test_start_targets_named_container() {
        let mut second = compose_container("c-demo-web-2", "demo", "web", "running");
        second.names = vec!["/demo-web-2".to_string()];
        let runtime = Arc::new(FakeRuntime::with_shells(&["/bin/sh"]).with_container(second));
        let (url, state) = spawn_server(runtime).await;
        let (mut client, _) = connect_async(url).await.unwrap();

        send(
            &mut client,
            json!({"type": "terminal_start", "stack_name": "demo", "service_name": "web", "container_name": "demo-web-2"}),
        )
        .await;
        let reply = recv(&mut client).await;
        assert_eq!(reply["type"], "success");

        let session = state
            .terminal_manager
            .get_session(reply["session_id"].as_str().unwrap())
            .await
            .unwrap();
        assert_eq!(session.container_id, "c-demo-web-2");
    }

    #[tokio::test]
    async fn test_upgrade_requires_auth() {
        let (url, _state) = spawn_server(Arc::new(FakeRuntime::with_shells(&["/bin/sh"]))).await;
        let anonymous = url.split('?').next().unwrap().to_string();
        assert!(connect_async(anonymous).await.is_err());
    }
}
