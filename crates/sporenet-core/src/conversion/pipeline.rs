//! Subprocess utilities for driving the toolchain script.
//!
//! The script reports progress and results as JSON lines on stdout; stderr is
//! framework chatter that is logged at debug level and kept only to explain a
//! failure.

use std::collections::VecDeque;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::types::ScriptLine;
use crate::error::{Result, SporeError};

/// Number of trailing stderr lines kept for error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Run `python script args...` to completion and return its JSON lines.
///
/// A non-zero exit becomes `ConversionFailed`, carrying the script's own
/// `error` message when it reported one, otherwise the stderr tail.
pub async fn run_script<I, S>(
    python: &Path,
    script: &Path,
    args: I,
    process_name: &str,
) -> Result<Vec<ScriptLine>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    debug!("Spawning {} ({})", process_name, script.display());
    let mut child = Command::new(python)
        .arg(script)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            SporeError::conversion_failed(format!(
                "Failed to spawn {process_name} with {}: {e}",
                python.display()
            ))
        })?;

    let stderr = spawn_stderr_drain(&mut child, process_name);
    let lines = collect_script_lines(&mut child, process_name).await?;
    let exit = wait_and_check_exit(&mut child, process_name).await;
    let stderr_tail = match stderr {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    };

    if let Err(err) = exit {
        if let Some(message) = script_error(&lines) {
            return Err(SporeError::conversion_failed(message));
        }
        if stderr_tail.is_empty() {
            return Err(err);
        }
        return Err(SporeError::conversion_failed(format!(
            "{err}\n{}",
            stderr_tail.join("\n")
        )));
    }
    Ok(lines)
}

/// Read JSON lines from the child's stdout until EOF.
///
/// Lines that are not JSON are logged at debug level and skipped.
pub async fn collect_script_lines(child: &mut Child, process_name: &str) -> Result<Vec<ScriptLine>> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SporeError::Other(format!("{process_name} stdout was not piped")))?;
    let mut reader = BufReader::new(stdout).lines();
    let mut lines = Vec::new();

    loop {
        match reader.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<ScriptLine>(&line) {
                Ok(parsed) => {
                    log_script_line(process_name, &parsed);
                    lines.push(parsed);
                }
                Err(_) => debug!("[{}] {}", process_name, line),
            },
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading {} stdout: {}", process_name, e);
                break;
            }
        }
    }
    Ok(lines)
}

/// Drain stderr on a background task, logging each line at debug level.
///
/// The task resolves to the last few lines.
pub fn spawn_stderr_drain(child: &mut Child, process_name: &str) -> Option<JoinHandle<Vec<String>>> {
    let stderr = child.stderr.take()?;
    let name = process_name.to_string();
    Some(tokio::spawn(async move { tail_lines(stderr, &name).await }))
}

async fn tail_lines<R: AsyncRead + Unpin>(stream: R, process_name: &str) -> Vec<String> {
    let mut reader = BufReader::new(stream).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(line)) = reader.next_line().await {
        debug!("[{}] stderr: {}", process_name, line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into()
}

/// Wait for a child process to exit and return an error on non-zero status.
pub async fn wait_and_check_exit(child: &mut Child, process_name: &str) -> Result<()> {
    let status = child
        .wait()
        .await
        .map_err(|e| SporeError::conversion_failed(format!("{process_name} process error: {e}")))?;

    if !status.success() {
        return Err(SporeError::conversion_failed(format!(
            "{process_name} exited with status: {}",
            status.code().unwrap_or(-1)
        )));
    }
    Ok(())
}

/// The message of the last `error` line, if the script reported one.
pub fn script_error(lines: &[ScriptLine]) -> Option<String> {
    lines
        .iter()
        .rev()
        .find(|line| line.stage == "error")
        .map(|line| {
            line.message
                .clone()
                .unwrap_or_else(|| "toolchain script reported an error".to_string())
        })
}

/// The last line reported for `stage`.
pub fn find_stage<'a>(lines: &'a [ScriptLine], stage: &str) -> Option<&'a ScriptLine> {
    lines.iter().rev().find(|line| line.stage == stage)
}

fn log_script_line(process_name: &str, line: &ScriptLine) {
    match (line.stage.as_str(), &line.message) {
        ("error", Some(message)) => warn!("[{}] {}", process_name, message),
        ("warning", Some(message)) => warn!("[{}] {}", process_name, message),
        ("converting" | "exporting" | "translating", Some(message)) => {
            info!("[{}] {}", process_name, message)
        }
        (stage, Some(message)) => debug!("[{}] {}: {}", process_name, stage, message),
        (stage, None) => debug!("[{}] {}", process_name, stage),
    }
}
