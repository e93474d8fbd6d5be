// src/exec/process.rs

//! Shell command runner shared by the command-backed collaborators.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::exec::cancel::CancelToken;

/// Lines of combined output kept for diagnostics.
const OUTPUT_TAIL_LINES: usize = 200;

/// A command line to run through the platform shell.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    /// Job the command belongs to (for logs).
    pub job: String,
    pub cmd: String,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was killed by a signal or cancelled.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub cancelled: bool,
    /// Tail of stdout and stderr, interleaved in arrival order.
    pub output: String,
}

type Tail = Arc<Mutex<VecDeque<String>>>;

/// Run `command` to completion, or until `cancel` fires.
///
/// On cancellation the child is killed and `cancelled` is set; the child is
/// also killed if this future is dropped.
pub async fn run_shell(command: &ShellCommand, cancel: &CancelToken) -> Result<ProcessOutput> {
    info!(job = %command.job, cmd = %command.cmd, "starting process");

    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&command.cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&command.cmd);
        c
    };

    cmd.current_dir(&command.cwd)
        .envs(command.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for job '{}'", command.job))?;

    let tail: Tail = Arc::new(Mutex::new(VecDeque::new()));
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(collect_lines(stdout, command.job.clone(), "stdout", Arc::clone(&tail))));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(collect_lines(stderr, command.job.clone(), "stderr", Arc::clone(&tail))));
    }

    let (exit_code, success, cancelled) = tokio::select! {
        status = child.wait() => {
            let status = status
                .with_context(|| format!("waiting for process of job '{}'", command.job))?;
            info!(
                job = %command.job,
                exit_code = ?status.code(),
                success = status.success(),
                "process exited"
            );
            (status.code(), status.success(), false)
        }
        _ = cancel.cancelled() => {
            info!(job = %command.job, "cancellation requested; killing process");
            if let Err(e) = child.kill().await {
                warn!(job = %command.job, error = %e, "failed to kill process on cancellation");
            }
            (None, false, true)
        }
    };

    for reader in readers {
        // Grandchildren of a killed shell may keep the pipes open.
        if cancelled {
            reader.abort();
        } else if let Err(e) = reader.await {
            debug!(job = %command.job, error = %e, "output reader ended abnormally");
        }
    }

    let output = {
        let lines = tail.lock().unwrap_or_else(PoisonError::into_inner);
        lines.iter().cloned().collect::<Vec<_>>().join("\n")
    };

    Ok(ProcessOutput {
        exit_code,
        success,
        cancelled,
        output,
    })
}

async fn collect_lines<R>(stream: R, job: String, source: &'static str, tail: Tail)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(job = %job, "{source}: {line}");
        let mut tail = tail.lock().unwrap_or_else(PoisonError::into_inner);
        if tail.len() == OUTPUT_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
}
