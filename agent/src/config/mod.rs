//! Configuration module for the Dockside agent
//!
//! Supports configuration via:
//! - YAML/TOML config files (`config/dockside.*`, `/etc/dockside/config.*`)
//! - Environment variables (with DOCKSIDE_ prefix, `__` as separator)

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::audit::AuditFormat;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for the JSON log file
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Audit line format (`json` or `syslog`)
    #[serde(default = "default_audit_format")]
    pub audit_format: AuditFormat,

    /// Docker endpoint (`unix:///var/run/docker.sock`, `tcp://host:2375`).
    /// Local defaults are used when unset.
    #[serde(default)]
    pub docker_host: Option<String>,

    /// Security settings
    #[serde(default)]
    pub security: SecurityConfig,

    /// Interactive terminal settings
    #[serde(default)]
    pub terminal: TerminalConfig,
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// JWT secret for API authentication
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// Static admin token
    #[serde(default)]
    pub admin_token: Option<String>,
}

/// Interactive terminal configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Shells to probe, in order of preference. Arguments are split on
    /// whitespace, e.g. `/bin/bash -l`.
    #[serde(default = "default_shells")]
    pub shells: Vec<String>,

    /// Time a probe exec gets to finish before its exit code is read
    #[serde(default = "default_probe_delay_ms")]
    pub probe_delay_ms: u64,

    /// Seconds without any output before a diagnostic is sent to the client
    #[serde(default = "default_boot_grace_secs")]
    pub boot_grace_secs: u64,

    /// Largest chunk forwarded per output message
    #[serde(default = "default_output_chunk_size")]
    pub output_chunk_size: usize,

    /// WebSocket ping interval
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// Connection is dropped when no frame arrives for this long
    #[serde(default = "default_read_deadline_secs")]
    pub read_deadline_secs: u64,

    /// Pause after an explicit close so trailing output reaches the client
    #[serde(default = "default_close_flush_ms")]
    pub close_flush_ms: u64,
}

impl TerminalConfig {
    pub fn probe_delay(&self) -> Duration {
        Duration::from_millis(self.probe_delay_ms)
    }

    pub fn boot_grace(&self) -> Duration {
        Duration::from_secs(self.boot_grace_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn read_deadline(&self) -> Duration {
        Duration::from_secs(self.read_deadline_secs)
    }

    pub fn close_flush(&self) -> Duration {
        Duration::from_millis(self.close_flush_ms)
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5443
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/dockside")
}

fn default_audit_format() -> AuditFormat {
    AuditFormat::Json
}

fn default_jwt_secret() -> String {
    // Generate a random secret if not configured
    // In production, this MUST be set explicitly
    use rand::Rng;
    let secret: [u8; 32] = rand::thread_rng().gen();
    base64::Engine::encode(&base64::engine::general_purpose::STANDARD, secret)
}

fn default_shells() -> Vec<String> {
    ["/bin/bash -l", "/bin/bash", "/bin/sh", "/bin/ash", "/bin/dash", "sh"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_probe_delay_ms() -> u64 {
    100
}

fn default_boot_grace_secs() -> u64 {
    5
}

fn default_output_chunk_size() -> usize {
    4096
}

fn default_ping_interval_secs() -> u64 {
    30
}

fn default_read_deadline_secs() -> u64 {
    60
}

fn default_close_flush_ms() -> u64 {
    100
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            admin_token: None,
        }
    }
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            shells: default_shells(),
            probe_delay_ms: default_probe_delay_ms(),
            boot_grace_secs: default_boot_grace_secs(),
            output_chunk_size: default_output_chunk_size(),
            ping_interval_secs: default_ping_interval_secs(),
            read_deadline_secs: default_read_deadline_secs(),
            close_flush_ms: default_close_flush_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            audit_format: default_audit_format(),
            docker_host: None,
            security: SecurityConfig::default(),
            terminal: TerminalConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        // Try to load .env file if present
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config/dockside").required(false))
            .add_source(config::File::with_name("/etc/dockside/config").required(false))
            .add_source(
                config::Environment::with_prefix("DOCKSIDE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("terminal.shells"),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }

        if self.security.jwt_secret.len() < 16 {
            anyhow::bail!("JWT secret must be at least 16 characters");
        }

        let terminal = &self.terminal;
        if terminal.shells.iter().all(|s| s.trim().is_empty()) {
            anyhow::bail!("At least one terminal shell must be configured");
        }

        if terminal.output_chunk_size == 0 {
            anyhow::bail!("Terminal output chunk size cannot be 0");
        }

        if terminal.ping_interval_secs == 0 || terminal.read_deadline_secs == 0 {
            anyhow::bail!("Terminal ping interval and read deadline cannot be 0");
        }

        if terminal.read_deadline_secs <= terminal.ping_interval_secs {
            anyhow::bail!("Terminal read deadline must be longer than the ping interval");
        }

        Ok(())
    }

    /// Address the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
