//! Data models for the Dockside agent
//!
//! Request/response types of the HTTP API. The terminal WebSocket envelopes
//! live in `terminal::protocol`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Terminal Models
// ============================================================================

/// Snapshot of one active terminal session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSessionInfo {
    pub session_id: String,
    pub stack_name: String,
    pub service_name: String,
    pub container_id: String,
    pub exec_id: String,
    pub shell: String,
    pub cols: u16,
    pub rows: u16,
    pub created_at: DateTime<Utc>,
}

/// Terminal session list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListResponse {
    pub sessions: Vec<TerminalSessionInfo>,
    pub total: usize,
}

impl SessionListResponse {
    pub fn new(sessions: Vec<TerminalSessionInfo>) -> Self {
        let total = sessions.len();
        Self { sessions, total }
    }
}

/// Result of a forced session close
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClosedResponse {
    pub session_id: String,
    pub exit_code: i64,
}

// ============================================================================
// Health Models
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_sessions: u64,
    #[serde(default)]
    pub docker_version: Option<String>,
}

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

// ============================================================================
// Error Models
// ============================================================================

/// Error body of every failed HTTP request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
