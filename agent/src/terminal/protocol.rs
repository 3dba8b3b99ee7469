//! Terminal WebSocket message envelopes
//!
//! Every frame is a JSON object with a `type` field. Client frames are
//! decoded into [`ClientMessage`]; server frames are built from
//! [`ServerMessage`].

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const TERMINAL_START: &str = "terminal_start";
pub const TERMINAL_INPUT: &str = "terminal_input";
pub const TERMINAL_RESIZE: &str = "terminal_resize";
pub const TERMINAL_CLOSE: &str = "terminal_close";

/// `terminal_start` payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub stack_name: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
}

/// `terminal_input` payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InputRequest {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub input: String,
}

/// `terminal_resize` payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResizeRequest {
    #[serde(default)]
    pub session_id: String,
    pub cols: u16,
    pub rows: u16,
}

/// `terminal_close` payload
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CloseRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

/// Decoded client frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Start(StartRequest),
    Input(InputRequest),
    Resize(ResizeRequest),
    Close(CloseRequest),
    Unknown(String),
}

/// Client frames that could not be decoded
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message is not a JSON object: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("message has no type field")]
    MissingType,

    #[error("invalid {kind} message: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_string();

        match kind.as_str() {
            TERMINAL_START => payload(TERMINAL_START, value).map(ClientMessage::Start),
            TERMINAL_INPUT => payload(TERMINAL_INPUT, value).map(ClientMessage::Input),
            TERMINAL_RESIZE => payload(TERMINAL_RESIZE, value).map(ClientMessage::Resize),
            TERMINAL_CLOSE => payload(TERMINAL_CLOSE, value).map(ClientMessage::Close),
            _ => Ok(ClientMessage::Unknown(kind)),
        }
    }
}

fn payload<T: DeserializeOwned>(kind: &'static str, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

/// Server frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    TerminalOutput {
        timestamp: DateTime<Utc>,
        session_id: String,
        output: String,
    },
    TerminalClose {
        timestamp: DateTime<Utc>,
        session_id: String,
        exit_code: i64,
    },
    Error {
        error: String,
        context: String,
    },
    Success {
        message: String,
        session_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl ServerMessage {
    pub fn output(session_id: &str, output: String) -> Self {
        ServerMessage::TerminalOutput {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            output,
        }
    }

    pub fn closed(session_id: &str, exit_code: i64) -> Self {
        ServerMessage::TerminalClose {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            exit_code,
        }
    }

    pub fn error(error: impl Into<String>, context: impl Into<String>) -> Self {
        ServerMessage::Error {
            error: error.into(),
            context: context.into(),
        }
    }

    pub fn started(session_id: &str) -> Self {
        ServerMessage::Success {
            message: "Terminal session started".to_string(),
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Turns a byte stream into text without splitting multi-byte characters
/// across chunk boundaries. Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        // Incomplete sequence at the end: keep it for the next chunk
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }
}
