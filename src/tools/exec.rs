//! Subprocess execution for whitelisted tools.
//!
//! `execute` never fails across its boundary: every failure mode (unknown
//! tool, rejected path, spawn error, timeout, oversized output, silent
//! nonzero exit) is encoded as a human-readable string starting with
//! `Error:` and handed back to the LLM as a tool result. The model decides
//! whether to retry with different arguments or answer from what it has.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use super::{sandbox, ToolSpec};
use crate::utils::truncate_str;

/// Wall-clock limit for one tool subprocess.
pub const TOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// Cap on captured subprocess output. Output past the cap voids the run.
pub const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// Run the named whitelisted tool with the model's parsed arguments.
pub async fn execute(name: &str, args: &Value) -> String {
    let Some(entry) = super::entry(name) else {
        return format!("Error: Tool '{}' not found in whitelist", name);
    };

    let (argv, dir, is_listing) = match entry.spec {
        ToolSpec::Niladic { argv } => (argv, sandbox::workdir().to_path_buf(), false),
        ToolSpec::PathScoped { argv } => {
            let requested = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
            match sandbox::sanitize(requested) {
                Ok(dir) => (argv, dir, true),
                Err(rejection) => {
                    warn!(tool = name, path = requested, %rejection, "Rejected tool path");
                    return format!("Error: {}", rejection);
                }
            }
        }
    };

    debug!(tool = name, dir = %dir.display(), "Running tool command");
    match run_capped(argv, &dir, TOOL_TIMEOUT, MAX_CAPTURE_BYTES).await {
        Ok(output) => {
            let text = render_output(is_listing, &output);
            debug!(
                tool = name,
                exit_code = output.exit_code,
                preview = %truncate_str(&text, 200),
                "Tool command completed"
            );
            text
        }
        Err(failure) => {
            warn!(tool = name, %failure, "Tool command failed");
            format!("Error: {}", failure)
        }
    }
}

/// Captured result of a completed subprocess.
#[derive(Debug)]
pub(crate) struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// How a subprocess run failed before producing a usable result.
#[derive(Debug)]
pub(crate) enum ExecFailure {
    Spawn { program: String, source: std::io::Error },
    Timeout { limit: Duration },
    OutputOverflow { cap: usize },
    Wait(std::io::Error),
}

impl std::fmt::Display for ExecFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecFailure::Spawn { program, source } => {
                write!(f, "Failed to run '{}': {}", program, source)
            }
            ExecFailure::Timeout { limit } => {
                write!(f, "Command timed out after {}s", limit.as_secs())
            }
            ExecFailure::OutputOverflow { cap } => {
                write!(f, "Command output exceeded the {} byte limit", cap)
            }
            ExecFailure::Wait(e) => write!(f, "Command failed to execute: {}", e),
        }
    }
}

/// Run a fixed argv with a working directory, bounded by a wall-clock timeout
/// and a per-stream capture cap. The caps are parameters so tests can shrink
/// them; `execute` pins the production constants.
pub(crate) async fn run_capped(
    argv: &[&str],
    dir: &Path,
    timeout: Duration,
    cap: usize,
) -> Result<CapturedOutput, ExecFailure> {
    let mut command = tokio::process::Command::new(argv[0]);
    command
        .args(&argv[1..])
        .current_dir(dir)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| ExecFailure::Spawn {
        program: argv[0].to_string(),
        source,
    })?;

    // Read one byte past the cap so overflow is detectable without buffering
    // the whole stream.
    let read_limit = (cap + 1) as u64;
    let stdout = child.stdout.take().expect("stdout is piped");
    let stderr = child.stderr.take().expect("stderr is piped");
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let mut reader = stdout.take(read_limit);
        reader.read_to_end(&mut buf).await?;
        Ok::<Vec<u8>, std::io::Error>(buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let mut reader = stderr.take(read_limit);
        reader.read_to_end(&mut buf).await?;
        Ok::<Vec<u8>, std::io::Error>(buf)
    });

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => return Err(ExecFailure::Wait(e)),
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            return Err(ExecFailure::Timeout { limit: timeout });
        }
    };

    let stdout_bytes = stdout_task.await.ok().and_then(Result::ok).unwrap_or_default();
    let stderr_bytes = stderr_task.await.ok().and_then(Result::ok).unwrap_or_default();
    if stdout_bytes.len() > cap || stderr_bytes.len() > cap {
        return Err(ExecFailure::OutputOverflow { cap });
    }

    Ok(CapturedOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code: status.code().unwrap_or(-1),
    })
}

/// Pick the text handed back to the model: stdout wins over stderr; a silent
/// nonzero exit is an error; an empty listing gets an explicit marker.
pub(crate) fn render_output(is_listing: bool, output: &CapturedOutput) -> String {
    let stdout = output.stdout.trim_end();
    let stderr = output.stderr.trim_end();

    if output.exit_code != 0 && stdout.is_empty() && stderr.is_empty() {
        return format!("Error: Command exited with status {}", output.exit_code);
    }
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    if is_listing {
        return "(empty directory)".to_string();
    }
    String::new()
}
