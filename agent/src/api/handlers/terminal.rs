//! Terminal WebSocket upgrade and session inspection handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State, WebSocketUpgrade},
    response::Response,
    Json,
};
use tracing::info;

use crate::api::{AdminAuth, ApiError, UserAuth};
use crate::models::{SessionClosedResponse, SessionListResponse};
use crate::terminal::{self, ConnectionContext, ConnectionSettings};
use crate::AppState;

/// Exit code reported to a connection whose session an admin closed
const ADMIN_CLOSE_EXIT_CODE: i64 = -1;

/// Upgrade to a terminal WebSocket; auth runs before the upgrade
pub async fn terminal_websocket_handler(
    ws: WebSocketUpgrade,
    user: UserAuth,
    State(state): State<Arc<AppState>>,
) -> Response {
    let ctx = ConnectionContext {
        sessions: state.terminal_manager.clone(),
        resolver: state.resolver.clone(),
        audit: state.audit_logger.clone(),
        user_id: user.user_id,
        settings: ConnectionSettings::from(&state.config.terminal),
    };
    ws.on_upgrade(move |socket| terminal::serve(socket, ctx))
}

/// List active terminal sessions
pub async fn list_sessions(
    _user: UserAuth,
    State(state): State<Arc<AppState>>,
) -> Json<SessionListResponse> {
    Json(SessionListResponse::new(
        state.terminal_manager.list_sessions().await,
    ))
}

/// Force-close a terminal session
pub async fn close_session(
    admin: AdminAuth,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionClosedResponse>, ApiError> {
    if !state
        .terminal_manager
        .close_session(&session_id, ADMIN_CLOSE_EXIT_CODE)
        .await
    {
        return Err(ApiError::NotFound(format!(
            "Terminal session {} not found",
            session_id
        )));
    }

    info!(session_id = %session_id, admin = %admin.user_id, "Terminal session closed by admin");
    Ok(Json(SessionClosedResponse {
        session_id,
        exit_code: ADMIN_CLOSE_EXIT_CODE,
    }))
}
