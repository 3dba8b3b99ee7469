//! Interactive container terminals
//!
//! - Shell probing and exec attachment (`manager`, `shell`)
//! - Per-session I/O, resize and teardown (`session`)
//! - The WebSocket protocol spoken with browser terminals (`protocol`, `connection`)

mod connection;
mod error;
mod manager;
pub mod protocol;
mod session;
mod shell;

pub use connection::{serve, ConnectionContext, ConnectionSettings};
pub use error::TerminalError;
pub use manager::SessionManager;
pub use session::{CloseCallback, OutputCallback, SessionHandle, TerminalSession, TerminalSize};
pub use shell::{find_shell, ShellCandidate};
