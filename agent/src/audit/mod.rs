//! Audit trail for terminal access
//!
//! Events are written to the `audit` tracing target as JSON or as RFC 5424
//! syslog lines, ready for a SIEM to pick up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Audit event for SIEM export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub user_id: String,
    pub action: String,
    pub outcome: AuditOutcome,
    pub details: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}

/// Audit event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    TerminalSession,
    SecurityViolation,
}

/// Audit outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}

/// SIEM export format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditFormat {
    Syslog,
    Json,
}

/// Audit logger for SIEM export
pub struct AuditLogger {
    format: AuditFormat,
    app_name: String,
}

impl AuditLogger {
    pub fn new(format: AuditFormat) -> Self {
        Self {
            format,
            app_name: "dockside".to_string(),
        }
    }

    /// Log an audit event
    pub fn log(&self, event: &AuditEvent) {
        let line = self.format(event);
        info!(target: "audit", "{}", line);
    }

    /// Render an event in the configured format
    pub fn format(&self, event: &AuditEvent) -> String {
        match self.format {
            AuditFormat::Syslog => self.format_syslog(event),
            AuditFormat::Json => serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string()),
        }
    }

    /// RFC 5424 line with the event fields as structured data
    fn format_syslog(&self, event: &AuditEvent) -> String {
        let priority = match event.outcome {
            AuditOutcome::Success => 6, // Informational
            AuditOutcome::Failure => 4, // Warning
            AuditOutcome::Denied => 3,  // Error
        };

        let mut params = vec![
            format!("user=\"{}\"", event.user_id),
            format!("action=\"{}\"", event.action),
            format!("outcome=\"{:?}\"", event.outcome),
            format!("event_type=\"{:?}\"", event.event_type),
        ];
        if let Some(ref session_id) = event.session_id {
            params.push(format!("session=\"{}\"", session_id));
        }
        if let Some(ref container_id) = event.container_id {
            params.push(format!("container=\"{}\"", container_id));
        }

        format!(
            "<{}>1 {} dockside-agent {} - - [{}] {}",
            priority,
            event.timestamp.to_rfc3339(),
            self.app_name,
            params.join(" "),
            format_details(&event.details)
        )
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(AuditFormat::Json)
    }
}

fn format_details(details: &BTreeMap<String, String>) -> String {
    details
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(" ")
}

fn terminal_event(
    user_id: &str,
    action: &str,
    outcome: AuditOutcome,
    details: BTreeMap<String, String>,
) -> AuditEvent {
    AuditEvent {
        timestamp: Utc::now(),
        event_type: AuditEventType::TerminalSession,
        user_id: user_id.to_string(),
        action: action.to_string(),
        outcome,
        details,
        session_id: None,
        container_id: None,
    }
}

pub fn create_terminal_opened_event(
    user_id: &str,
    session_id: &str,
    stack: &str,
    service: &str,
    container_id: &str,
) -> AuditEvent {
    let details = BTreeMap::from([
        ("stack".to_string(), stack.to_string()),
        ("service".to_string(), service.to_string()),
    ]);
    AuditEvent {
        session_id: Some(session_id.to_string()),
        container_id: Some(container_id.to_string()),
        ..terminal_event(user_id, "TERMINAL_OPENED", AuditOutcome::Success, details)
    }
}

pub fn create_terminal_closed_event(user_id: &str, session_id: &str, exit_code: i64) -> AuditEvent {
    let details = BTreeMap::from([("exit_code".to_string(), exit_code.to_string())]);
    AuditEvent {
        session_id: Some(session_id.to_string()),
        ..terminal_event(user_id, "TERMINAL_CLOSED", AuditOutcome::Success, details)
    }
}

pub fn create_terminal_denied_event(
    user_id: &str,
    stack: &str,
    service: &str,
    reason: &str,
) -> AuditEvent {
    let details = BTreeMap::from([
        ("stack".to_string(), stack.to_string()),
        ("service".to_string(), service.to_string()),
        ("reason".to_string(), reason.to_string()),
    ]);
    terminal_event(user_id, "TERMINAL_START", AuditOutcome::Failure, details)
}

/// A container was requested under a stack it does not belong to
pub fn create_stack_mismatch_event(
    user_id: &str,
    container_id: &str,
    expected: &str,
    actual: &str,
) -> AuditEvent {
    let details = BTreeMap::from([
        ("expected_stack".to_string(), expected.to_string()),
        ("actual_stack".to_string(), actual.to_string()),
    ]);
    AuditEvent {
        event_type: AuditEventType::SecurityViolation,
        container_id: Some(container_id.to_string()),
        ..terminal_event(user_id, "STACK_MISMATCH", AuditOutcome::Denied, details)
    }
}
