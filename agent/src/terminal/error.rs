//! Terminal session errors

use thiserror::Error;

/// Errors from session creation and session operations
#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("no compatible shell found (tried: {})", .attempted.join(", "))]
    NoCompatibleShell { attempted: Vec<String> },

    #[error("terminal session is closed")]
    Closed,

    #[error("terminal sessions are shut down")]
    ShuttingDown,

    #[error("terminal session is not bound to an exec")]
    Unbound,

    #[error("invalid terminal size {cols}x{rows}")]
    InvalidGeometry { cols: u16, rows: u16 },

    #[error("failed to {op} {target}")]
    Runtime {
        op: &'static str,
        target: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("terminal stream error: {0}")]
    Io(#[from] std::io::Error),
}

impl TerminalError {
    pub(crate) fn runtime(op: &'static str, target: &str, source: anyhow::Error) -> Self {
        TerminalError::Runtime {
            op,
            target: target.to_string(),
            source,
        }
    }

    /// Short message for clients
    pub fn summary(&self) -> &'static str {
        match self {
            TerminalError::NoCompatibleShell { .. } => "No compatible shell found",
            TerminalError::Closed => "Session is closed",
            TerminalError::ShuttingDown => "Agent is shutting down",
            TerminalError::Unbound => "Session is not attached",
            TerminalError::InvalidGeometry { .. } => "Invalid terminal size",
            TerminalError::Runtime { .. } => "Container runtime error",
            TerminalError::Io(_) => "Terminal stream error",
        }
    }

    /// Free-text context for clients. Runtime errors report the failed
    /// operation only; the underlying cause is logged, not sent.
    pub fn context(&self) -> String {
        match self {
            TerminalError::Runtime { op, target, .. } => format!("failed to {} {}", op, target),
            other => other.to_string(),
        }
    }

    /// Metric label for start failures
    pub fn kind(&self) -> &'static str {
        match self {
            TerminalError::NoCompatibleShell { .. } => "no_shell",
            TerminalError::Closed => "closed",
            TerminalError::ShuttingDown => "shutting_down",
            TerminalError::Unbound => "unbound",
            TerminalError::InvalidGeometry { .. } => "invalid_geometry",
            TerminalError::Runtime { .. } => "runtime",
            TerminalError::Io(_) => "io",
        }
    }
}
