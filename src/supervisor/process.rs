// src/supervisor/process.rs

//! OS-level process control for a single child: spawn, graceful
//! termination with escalation, and output forwarding.

use std::process::Stdio;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::supervisor::spec::ProcessSpec;

/// The currently running child of a unit.
///
/// Replaced wholesale on every (re)start; never reused across launches.
#[derive(Debug)]
pub struct ProcessHandle {
    pub child: Child,
    pub pid: u32,
    pub started_at: Instant,
    pub started_at_wall: SystemTime,
}

/// How a requested stop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The child exited on its own after the termination request.
    Exited(Option<i32>),
    /// The child ignored the request and was killed after the timeout.
    Killed,
}

/// Spawn the child described by `spec` and start forwarding its output.
pub fn spawn_child(spec: &ProcessSpec) -> Result<ProcessHandle> {
    let mut cmd = Command::new(&spec.cmd);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning `{}`", spec.command_line()))?;

    let pid = child
        .id()
        .context("child exited before its pid could be read")?;

    if let Some(stdout) = child.stdout.take() {
        forward_lines(spec.name.clone(), "stdout", stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(spec.name.clone(), "stderr", stderr);
    }

    Ok(ProcessHandle {
        child,
        pid,
        started_at: Instant::now(),
        started_at_wall: SystemTime::now(),
    })
}

/// Consume a child pipe so OS buffers never fill; log each line.
fn forward_lines<R>(unit: String, stream: &'static str, pipe: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(unit = %unit, stream, "{}", line);
        }
        debug!(unit = %unit, stream, "output stream closed");
    });
}

/// Ask the child to exit, wait up to `timeout`, then kill it.
pub async fn terminate(child: &mut Child, unit: &str, timeout: Duration) -> Result<StopOutcome> {
    if let Some(status) = child.try_wait().context("polling child status")? {
        return Ok(StopOutcome::Exited(status.code()));
    }

    request_graceful_exit(child).context("sending termination request")?;

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => {
            let status = status.context("waiting for child to exit")?;
            debug!(unit, exit_code = ?status.code(), "child exited after termination request");
            Ok(StopOutcome::Exited(status.code()))
        }
        Err(_elapsed) => {
            warn!(unit, ?timeout, "child ignored termination request; killing");
            kill_now(child).await?;
            Ok(StopOutcome::Killed)
        }
    }
}

/// Forcefully kill the child and reap it.
pub async fn kill_now(child: &mut Child) -> Result<()> {
    child.kill().await.context("killing child process")
}

#[cfg(unix)]
fn request_graceful_exit(child: &mut Child) -> std::io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return Ok(());
    };
    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        // Already gone; the following wait reaps it.
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => Err(std::io::Error::from(errno)),
    }
}

#[cfg(not(unix))]
fn request_graceful_exit(child: &mut Child) -> std::io::Result<()> {
    // No portable polite signal; fall back to a forced kill.
    child.start_kill()
}
