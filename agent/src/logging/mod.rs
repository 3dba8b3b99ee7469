//! Logging module for the Dockside agent
//!
//! Provides structured logging with tracing, supporting JSON output for production
//! and pretty printing for development.

use std::fs::{File, OpenOptions};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::MakeWriterExt},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const LOG_FILE: &str = "agent.log";

/// Parse a configured level, falling back to INFO
pub fn parse_level(log_level: &str) -> Level {
    match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Open the JSON log file, trying `log_dir` first and `./logs` second
fn open_log_file(log_dir: &Path) -> Option<Arc<File>> {
    [log_dir, Path::new("./logs")].iter().find_map(|dir| {
        std::fs::create_dir_all(dir).ok()?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(LOG_FILE))
            .ok()
            .map(Arc::new)
    })
}

/// Initialize the logging/tracing system
pub fn init_logging(log_level: &str, log_dir: &Path) -> Result<()> {
    let level = parse_level(log_level);

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("dockside_agent={},audit={},tower_http=info", level, level))
    });

    let log_file = open_log_file(log_dir);

    if std::io::stdout().is_terminal() {
        // Development: pretty colored output to stdout + JSON to file
        let stdout_layer = fmt::layer()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .pretty()
            .with_writer(std::io::stdout);

        let file_layer = log_file.map(|file| {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .with_writer(file)
        });

        tracing_subscriber::registry()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .try_init()?;
    } else {
        // Production: JSON output to stdout, mirrored to the file when available
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .json();

        match log_file {
            Some(file) => tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(file.and(std::io::stdout)))
                .try_init()?,
            None => tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(std::io::stdout))
                .try_init()?,
        }
    }

    Ok(())
}
