// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution with a hard wall-clock limit, an idle-liveness
//! watchdog, and streaming capture of combined stdout+stderr.

use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

const SHORT_RETURN_LINES: usize = 20;
const GRACE_PERIOD: Duration = Duration::from_secs(10);

/// How a supervised command concluded.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("command failed (status {status:?}): {tail}")]
    CommandFailed {
        status: Option<i32>,
        argv: Vec<String>,
        tail: String,
    },
    #[error("command timed out after {hard_timeout:?}: {tail}")]
    Timeout {
        hard_timeout: Duration,
        argv: Vec<String>,
        tail: String,
    },
    #[error("failed to spawn command: {0}")]
    Spawn(#[source] io::Error),
    #[error("io error supervising command: {0}")]
    Io(#[source] io::Error),
}

/// Knobs for one supervised invocation.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub hard_timeout: Duration,
    pub idle_threshold: Duration,
    pub log_file: Option<PathBuf>,
    pub short_return: bool,
    pub keepalive: bool,
}

impl SupervisorConfig {
    pub fn new(hard_timeout: Duration, idle_threshold: Duration) -> Self {
        Self {
            hard_timeout,
            idle_threshold,
            log_file: None,
            short_return: false,
            keepalive: false,
        }
    }

    pub fn with_log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    pub fn short_return(mut self) -> Self {
        self.short_return = true;
        self
    }

    pub fn keepalive(mut self) -> Self {
        self.keepalive = true;
        self
    }
}

/// What came out of a completed (non-error) or failed supervised run.
#[derive(Debug, Clone)]
pub struct SupervisorOutput {
    pub status: Option<i32>,
    /// Combined stdout+stderr, possibly truncated to the tail ring.
    pub tail: String,
}

/// Run `cmd` under full supervision: streaming capture, idle annotations,
/// and a hard timeout that escalates from SIGTERM to SIGKILL.
pub async fn run(
    mut cmd: Command,
    argv_for_errors: Vec<String>,
    config: SupervisorConfig,
) -> Result<SupervisorOutput, SupervisorError> {
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child: Child = cmd.spawn().map_err(SupervisorError::Spawn)?;
    let pid = child.id();

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");
    let mut stdin = child.stdin.take();

    let last_read_secs = Arc::new(AtomicI64::new(now_secs()));
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let reader_out = spawn_line_reader(stdout, tx.clone(), last_read_secs.clone());
    let reader_err = spawn_line_reader(stderr, tx, last_read_secs.clone());

    let mut ring: VecDeque<String> = VecDeque::new();
    let mut log_file = match &config.log_file {
        Some(path) => Some(
            tokio::fs::File::create(path)
                .await
                .map_err(SupervisorError::Io)?,
        ),
        None => None,
    };

    let loop_wait = config
        .idle_threshold
        .checked_sub(Duration::from_secs(1))
        .filter(|d| *d >= Duration::from_secs(5))
        .unwrap_or(Duration::from_secs(5));
    let mut ticker = tokio::time::interval(loop_wait);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let start = now_secs();
    loop {
        tokio::select! {
            maybe_line = rx.recv() => {
                if let Some(line) = maybe_line {
                    push_line(&mut ring, config.short_return, &line);
                    if let Some(f) = log_file.as_mut() {
                        let _ = f.write_all(line.as_bytes()).await;
                        let _ = f.flush().await;
                    }
                }
            }
            _ = ticker.tick() => {
                let idle_secs = now_secs() - last_read_secs.load(Ordering::SeqCst);
                let idle_threshold = config.idle_threshold.as_secs() as i64;
                if idle_secs >= idle_threshold * 2 {
                    annotate(&mut ring, &mut log_file, config.short_return, "Timeout expired. No action.\n").await;
                } else if idle_secs >= idle_threshold {
                    if config.keepalive {
                        annotate(&mut ring, &mut log_file, config.short_return, "Timeout expired, writing nl\n").await;
                        if let Some(stdin) = stdin.as_mut() {
                            let _ = stdin.write_all(b"\n").await;
                            let _ = stdin.flush().await;
                        }
                    } else {
                        annotate(&mut ring, &mut log_file, config.short_return, "Timeout expired, not writing nl\n").await;
                    }
                }
                if now_secs() - start >= config.hard_timeout.as_secs() as i64 {
                    annotate(&mut ring, &mut log_file, config.short_return, "Process timeout expired, terminating.\n").await;
                    if let Some(pid) = pid {
                        let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
                    }
                    let graceful = tokio::time::timeout(GRACE_PERIOD, child.wait()).await;
                    match graceful {
                        Ok(Ok(_status)) => {
                            drain_remaining(&mut rx, &mut ring, config.short_return, &mut log_file).await;
                            let _ = reader_out.await;
                            let _ = reader_err.await;
                            return Err(SupervisorError::Timeout {
                                hard_timeout: config.hard_timeout,
                                argv: argv_for_errors,
                                tail: render(&ring),
                            });
                        }
                        _ => {
                            annotate(&mut ring, &mut log_file, config.short_return, "Cannot terminate, killing.\n").await;
                            let _ = child.start_kill();
                            let _ = child.wait().await;
                            drain_remaining(&mut rx, &mut ring, config.short_return, &mut log_file).await;
                            let _ = reader_out.await;
                            let _ = reader_err.await;
                            return Err(SupervisorError::Timeout {
                                hard_timeout: config.hard_timeout,
                                argv: argv_for_errors,
                                tail: render(&ring),
                            });
                        }
                    }
                }
            }
            wait_result = child.wait() => {
                let st = wait_result.map_err(SupervisorError::Io)?;
                drain_remaining(&mut rx, &mut ring, config.short_return, &mut log_file).await;
                let _ = reader_out.await;
                let _ = reader_err.await;
                let full_tail = render(&ring);
                let code = st.code();
                if st.success() {
                    return Ok(SupervisorOutput { status: code, tail: full_tail });
                }
                return Err(SupervisorError::CommandFailed {
                    status: code,
                    argv: argv_for_errors,
                    tail: full_tail,
                });
            }
        }
    }
}

fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

fn spawn_line_reader<R>(
    reader: R,
    tx: mpsc::UnboundedSender<String>,
    last_read: Arc<AtomicI64>,
) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(mut line)) = lines.next_line().await {
            line.push('\n');
            last_read.store(now_secs(), Ordering::SeqCst);
            if tx.send(line).is_err() {
                break;
            }
        }
    })
}

fn push_line(ring: &mut VecDeque<String>, short_return: bool, line: &str) {
    if short_return {
        while ring.len() >= SHORT_RETURN_LINES {
            ring.pop_front();
        }
    }
    ring.push_back(line.to_string());
}

async fn annotate(
    ring: &mut VecDeque<String>,
    log_file: &mut Option<tokio::fs::File>,
    short_return: bool,
    text: &str,
) {
    let line = format!("+ supervisor: {text}");
    push_line(ring, short_return, &line);
    if let Some(f) = log_file.as_mut() {
        let _ = f.write_all(line.as_bytes()).await;
        let _ = f.flush().await;
    }
}

async fn drain_remaining(
    rx: &mut mpsc::UnboundedReceiver<String>,
    ring: &mut VecDeque<String>,
    short_return: bool,
    log_file: &mut Option<tokio::fs::File>,
) {
    while let Ok(line) = rx.try_recv() {
        push_line(ring, short_return, &line);
        if let Some(f) = log_file.as_mut() {
            let _ = f.write_all(line.as_bytes()).await;
        }
    }
    if let Some(f) = log_file.as_mut() {
        let _ = f.flush().await;
    }
}

fn render(ring: &VecDeque<String>) -> String {
    ring.iter().cloned().collect::<Vec<_>>().join("")
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
