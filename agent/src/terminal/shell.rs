//! Shell capability probing
//!
//! A container image may ship any subset of the usual shells. Each candidate
//! is tried with a throwaway `<shell> -c "echo test"` exec and the first one
//! that exits 0 is used for the interactive session.

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::container::{ContainerRuntime, ExecSpec};

/// Command run by a probe exec
const PROBE_SCRIPT: &str = "echo test";

/// One shell to try, e.g. `/bin/bash -l`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCandidate {
    program: String,
    args: Vec<String>,
}

impl ShellCandidate {
    /// Parse a whitespace-separated command line. Returns `None` for blank input.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    /// Parse a configured list, skipping blank entries
    pub fn parse_all<S: AsRef<str>>(lines: &[S]) -> Vec<Self> {
        lines.iter().filter_map(|l| Self::parse(l.as_ref())).collect()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Command for the interactive exec
    pub fn command(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Command for the probe exec
    pub fn probe_command(&self) -> Vec<String> {
        let mut cmd = self.command();
        cmd.push("-c".to_string());
        cmd.push(PROBE_SCRIPT.to_string());
        cmd
    }
}

impl fmt::Display for ShellCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command().join(" "))
    }
}

/// Return the first candidate that runs successfully in the container
pub async fn find_shell<'a>(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
    candidates: &'a [ShellCandidate],
    delay: Duration,
) -> Option<&'a ShellCandidate> {
    for candidate in candidates {
        let usable = match probe(runtime, container_id, candidate, delay).await {
            Ok(usable) => usable,
            Err(e) => {
                debug!(container_id, shell = %candidate, error = %e, "Shell probe failed");
                false
            }
        };

        crate::metrics::record_shell_probe(candidate.program(), usable);

        if usable {
            debug!(container_id, shell = %candidate, "Shell probe succeeded");
            return Some(candidate);
        }
    }
    None
}

/// Run one probe exec and report whether it exited 0
async fn probe(
    runtime: &dyn ContainerRuntime,
    container_id: &str,
    candidate: &ShellCandidate,
    delay: Duration,
) -> Result<bool> {
    let exec_id = runtime
        .create_exec(container_id, ExecSpec::probe(candidate.probe_command()))
        .await?;

    let mut attachment = runtime.start_exec(&exec_id).await?;
    if let Err(e) = attachment.input.shutdown().await {
        debug!(exec_id = %exec_id, error = %e, "Failed to shut down probe input");
    }
    drop(attachment.input);

    // Drain whatever the probe prints; a short-lived process ends its
    // stream well within the delay.
    let drain = async { while attachment.output.next().await.is_some() {} };
    let _ = tokio::time::timeout(delay, drain).await;
    drop(attachment.output);

    tokio::time::sleep(delay).await;

    let status = runtime.inspect_exec(&exec_id).await?;
    debug!(
        container_id,
        exec_id = %exec_id,
        shell = %candidate,
        exit_code = ?status.exit_code,
        "Shell probe finished"
    );
    Ok(status.exit_code == Some(0))
}
