//! Shared child-process plumbing for the adapters.

use std::io;
use std::process::Output;
use std::time::Duration;

use tokio::process::Command;

use dbkeep_core::DatabaseKind;

use crate::AdapterError;

/// Run a tool to completion under a timeout. The child is killed if the
/// timeout fires or the future is dropped. Non-zero exit becomes
/// `ToolFailed` with the tool's stderr; a missing binary becomes
/// `ToolMissing`.
pub(crate) async fn run_tool(
    mut cmd: Command,
    tool: &str,
    kind: DatabaseKind,
    timeout: Duration,
) -> Result<Output, AdapterError> {
    cmd.kill_on_drop(true);
    tracing::debug!(tool, %kind, "spawning");
    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| AdapterError::Timeout {
            tool: tool.to_string(),
            timeout,
        })?
        .map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                AdapterError::ToolMissing {
                    tool: tool.to_string(),
                    kind,
                }
            } else {
                AdapterError::Io(e)
            }
        })?;
    if !output.status.success() {
        return Err(AdapterError::ToolFailed {
            tool: tool.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}
