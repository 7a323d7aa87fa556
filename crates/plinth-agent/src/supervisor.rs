use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::sink::{self, OutputSink};

pub const MAX_RUNNING: usize = 5;
// Counted on the trimmed text.
pub const MAX_COMMAND_CHARS: usize = 4096;
// Wait between the graceful and the forceful group signal.
pub const TERM_GRACE: Duration = Duration::from_secs(1);
// How much of the command line the handle keeps for log lines.
const AUDIT_CHARS: usize = 100;

// The kiosk session owns display :0; exported ahead of commands that look
// like they open an X client.
const GUI_ENV_PREFIX: &str = "export DISPLAY=:0; export XAUTHORITY=/home/pi/.Xauthority; ";

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("command is empty")]
    EmptyCommand,
    #[error("command is {0} characters, limit is {limit}", limit = MAX_COMMAND_CHARS)]
    CommandTooLong(usize),
    #[error("{limit} commands already running", limit = MAX_RUNNING)]
    ConcurrencyLimitExceeded,
    #[error("unknown command id {0}")]
    HandleNotFound(u32),
    #[error("process control failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct OutputReport {
    pub output: String,
    pub running: bool,
    pub exit_code: Option<i32>,
}

// In the registry only until its exit is observed.
struct CommandHandle {
    child: Child,
    pgid: i32,
    sink: OutputSink,
    started_at: Instant,
    command: String,
}

// The mutex guards the map only; subprocess I/O (sink reads, the termination
// grace wait) happens with the lock released.
#[derive(Clone)]
pub struct CommandSupervisor {
    inner: Arc<Mutex<HashMap<u32, CommandHandle>>>,
    scratch_dir: PathBuf,
}

impl CommandSupervisor {
    pub fn new(scratch_dir: PathBuf) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            scratch_dir,
        }
    }

    pub async fn spawn(&self, command_text: &str) -> Result<u32, SupervisorError> {
        let command = command_text.trim();
        if command.is_empty() {
            return Err(SupervisorError::EmptyCommand);
        }
        let chars = command.chars().count();
        if chars > MAX_COMMAND_CHARS {
            return Err(SupervisorError::CommandTooLong(chars));
        }

        // Capacity check and insert share one lock acquisition, so concurrent
        // submissions cannot overshoot the limit.
        let mut inner = self.inner.lock().await;
        if inner.len() >= MAX_RUNNING {
            return Err(SupervisorError::ConcurrencyLimitExceeded);
        }

        let sink = OutputSink::create(&self.scratch_dir)?;
        let child = spawn_in_group(&command_line(command), &self.scratch_dir, &sink)?;
        let Some(pid) = child.id() else {
            // Gone before we could learn its pid; nothing to register.
            return Err(SupervisorError::Io(std::io::Error::other(
                "child exited before registration",
            )));
        };

        let audit = truncate_chars(command, AUDIT_CHARS);
        tracing::info!(pid, command = %audit, "command started");
        inner.insert(
            pid,
            CommandHandle {
                child,
                // setsid in the pre-exec hook makes the child its own group
                // leader, so the group id equals its pid.
                pgid: pid as i32,
                sink,
                started_at: Instant::now(),
                command: audit,
            },
        );
        Ok(pid)
    }

    // The first call that observes the exit removes the handle and deletes
    // the sink; every later call gets HandleNotFound.
    pub async fn poll(&self, pid: u32) -> Result<OutputReport, SupervisorError> {
        let mut inner = self.inner.lock().await;
        let Some(handle) = inner.get_mut(&pid) else {
            return Err(SupervisorError::HandleNotFound(pid));
        };
        let sink_path = handle.sink.path().to_path_buf();
        let status = handle.child.try_wait()?;

        match status {
            Some(status) => {
                let Some(handle) = inner.remove(&pid) else {
                    return Err(SupervisorError::HandleNotFound(pid));
                };
                drop(inner);

                let output = handle.sink.snapshot().await;
                let code = exit_code(status);
                tracing::info!(
                    pid,
                    exit_code = code,
                    runtime_secs = handle.started_at.elapsed().as_secs(),
                    command = %handle.command,
                    "command exited"
                );
                // Dropping the handle deletes the sink file.
                Ok(OutputReport {
                    output,
                    running: false,
                    exit_code: code,
                })
            }
            None => {
                drop(inner);
                // Partial read without the lock; the snapshot may grow.
                let output = sink::read_snapshot(&sink_path).await;
                Ok(OutputReport {
                    output,
                    running: true,
                    exit_code: None,
                })
            }
        }
    }

    // The handle always leaves the registry; kill failures are logged, never
    // surfaced.
    pub async fn terminate(&self, pid: u32) -> Result<(), SupervisorError> {
        let mut handle = {
            let mut inner = self.inner.lock().await;
            let Some(handle) = inner.remove(&pid) else {
                return Err(SupervisorError::HandleNotFound(pid));
            };
            handle
        };

        tracing::info!(pid, command = %handle.command, "terminating command");
        if let Err(err) = signal_group(handle.pgid, libc::SIGTERM) {
            tracing::warn!(pid, error = %err, "graceful group signal failed");
        }

        // Grace wait runs with the registry unlocked.
        let deadline = tokio::time::Instant::now() + TERM_GRACE;
        let mut exited = false;
        loop {
            match handle.child.try_wait() {
                Ok(Some(_)) => {
                    exited = true;
                    break;
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(pid, error = %err, "status check failed during termination");
                    break;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        if !exited {
            tracing::warn!(pid, "grace interval elapsed, escalating to SIGKILL");
            if let Err(err) = signal_group(handle.pgid, libc::SIGKILL) {
                tracing::warn!(pid, error = %err, "forceful group signal failed");
            }
            // SIGKILL cannot be ignored; collect the status so the child is
            // reaped instead of lingering as a zombie.
            match tokio::time::timeout(Duration::from_secs(1), handle.child.wait()).await {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => tracing::warn!(pid, error = %err, "reap after SIGKILL failed"),
                Err(_) => tracing::warn!(pid, "command still not reaped after SIGKILL"),
            }
        }

        // Dropping the handle deletes the sink file.
        Ok(())
    }

    // Shutdown path: signal every group, release every sink, clear the map
    // without waiting on children.
    pub async fn drain_all(&self) -> usize {
        let handles: Vec<(u32, CommandHandle)> = {
            let mut inner = self.inner.lock().await;
            inner.drain().collect()
        };

        let count = handles.len();
        for (pid, handle) in handles {
            tracing::info!(pid, command = %handle.command, "draining command");
            if let Err(err) = signal_group(handle.pgid, libc::SIGTERM) {
                tracing::warn!(pid, error = %err, "drain signal failed");
            }
            // Handle dropped here: sink file removed without waiting.
        }
        count
    }

    pub async fn running(&self) -> usize {
        self.inner.lock().await.len()
    }
}

fn command_line(command: &str) -> String {
    if looks_like_gui(command) {
        format!("{GUI_ENV_PREFIX}{command}")
    } else {
        command.to_string()
    }
}

fn looks_like_gui(command: &str) -> bool {
    let lower = command.to_lowercase();
    lower.contains("chromium") || lower.contains("firefox") || command.contains("DISPLAY=")
}

// Launch `sh -c <line>` as the leader of a new session.
fn spawn_in_group(line: &str, cwd: &Path, sink: &OutputSink) -> Result<Child, SupervisorError> {
    let (stdout, stderr) = sink.stdio_pair()?;
    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(line)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);

    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            set_parent_death_signal()?;
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    Ok(cmd.spawn()?)
}

fn signal_group(pgid: i32, signal: libc::c_int) -> std::io::Result<()> {
    // kill(2) with a negated pid targets the whole group.
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(target_os = "linux")]
unsafe fn set_parent_death_signal() -> std::io::Result<()> {
    // If the agent itself dies, the kernel terminates the command subtree.
    // NOTE: `unsafe fn` bodies are not implicitly unsafe in Rust 2024.
    let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
unsafe fn set_parent_death_signal() -> std::io::Result<()> {
    Ok(())
}

fn exit_code(status: std::process::ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt as _;
        // Signal deaths report as the negated signal number.
        status.code().or_else(|| status.signal().map(|sig| -sig))
    }
    #[cfg(not(unix))]
    {
        status.code()
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
