// src/supervisor/unit_loop.rs

//! Supervising control loop for one managed unit.
//!
//! Every state change happens inside [`UnitLoop::run`], one message at a
//! time, so a restart can never overlap with another start or stop of the
//! same unit. The loop reacts to:
//! - control requests from [`SupervisorHandle`](super::SupervisorHandle)
//! - debounced change events from the unit's watcher
//! - the child exiting on its own
//! - the crash backoff deadline

use std::collections::VecDeque;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::errors::{ProcwatchError, Result};
use crate::supervisor::backoff::CrashBackoff;
use crate::supervisor::process::{self, ProcessHandle, StopOutcome};
use crate::supervisor::spec::ProcessSpec;
use crate::supervisor::state::{StateChange, UnitState, UnitStatus};
use crate::watch::{WatchEvent, WatchWarning};

/// Operations a caller can request on a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOp {
    Start,
    /// `None` uses the unit's configured stop timeout.
    Stop { timeout: Option<Duration> },
    Restart,
}

impl ControlOp {
    pub fn name(&self) -> &'static str {
        match self {
            ControlOp::Start => "start",
            ControlOp::Stop { .. } => "stop",
            ControlOp::Restart => "restart",
        }
    }
}

/// Messages accepted by the unit loop.
#[derive(Debug)]
pub enum UnitMessage {
    Control {
        op: ControlOp,
        reply: oneshot::Sender<Result<UnitStatus>>,
    },
    /// Stop the child (if any) and end the loop.
    Shutdown { reply: oneshot::Sender<UnitStatus> },
}

impl UnitMessage {
    fn is_stop(&self) -> bool {
        matches!(
            self,
            UnitMessage::Control {
                op: ControlOp::Stop { .. },
                ..
            }
        )
    }
}

/// Why a restart is being performed (for logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RestartReason {
    Requested,
    FileChange,
}

pub struct UnitLoop {
    spec: ProcessSpec,
    state: UnitState,
    child: Option<ProcessHandle>,
    backoff: CrashBackoff,
    /// Deadline of the pending automatic restart.
    restart_at: Option<Instant>,
    restart_delay: Option<Duration>,
    last_exit_code: Option<i32>,
    last_error: Option<String>,
    launches: u64,
    /// Set when change events arrived while a restart was in flight.
    restart_pending: bool,
    /// Control messages pulled off the channel during a start sequence.
    backlog: VecDeque<UnitMessage>,
    control_rx: mpsc::Receiver<UnitMessage>,
    watch_rx: Option<mpsc::Receiver<WatchEvent>>,
    status_tx: watch::Sender<UnitStatus>,
    transitions: broadcast::Sender<StateChange>,
}

impl UnitLoop {
    pub fn new(
        spec: ProcessSpec,
        control_rx: mpsc::Receiver<UnitMessage>,
        watch_rx: Option<mpsc::Receiver<WatchEvent>>,
        status_tx: watch::Sender<UnitStatus>,
        transitions: broadcast::Sender<StateChange>,
    ) -> Self {
        let backoff = CrashBackoff::new(spec.backoff);
        Self {
            spec,
            state: UnitState::Stopped,
            child: None,
            backoff,
            restart_at: None,
            restart_delay: None,
            last_exit_code: None,
            last_error: None,
            launches: 0,
            restart_pending: false,
            backlog: VecDeque::new(),
            control_rx,
            watch_rx,
            status_tx,
            transitions,
        }
    }

    /// Main loop; returns once a shutdown was handled or every handle to
    /// this unit was dropped.
    pub async fn run(mut self) {
        info!(unit = %self.spec.name, cmd = %self.spec.command_line(), "supervisor loop started");

        loop {
            if let Some(msg) = self.backlog.pop_front() {
                if !self.handle_message(msg).await {
                    break;
                }
                continue;
            }

            if self.restart_pending {
                self.restart_pending = false;
                // An operator stop issued meanwhile wins over queued changes.
                if self.accepts_changes() {
                    self.restart_for_change().await;
                }
                continue;
            }

            let restart_at = self.restart_at;

            tokio::select! {
                msg = self.control_rx.recv() => {
                    match msg {
                        Some(msg) => {
                            if !self.handle_message(msg).await {
                                break;
                            }
                        }
                        None => {
                            debug!(unit = %self.spec.name, "all handles dropped; shutting down");
                            self.shutdown_child().await;
                            break;
                        }
                    }
                }

                event = recv_watch(&mut self.watch_rx) => {
                    match event {
                        Some(event) => self.handle_watch_event(event).await,
                        None => {
                            debug!(unit = %self.spec.name, "watch channel closed");
                            self.watch_rx = None;
                        }
                    }
                }

                status = wait_child(&mut self.child) => {
                    self.on_child_exit(status);
                }

                _ = sleep_until(restart_at), if restart_at.is_some() => {
                    self.restart_at = None;
                    self.restart_delay = None;
                    info!(unit = %self.spec.name, "backoff elapsed; restarting");
                    // Failures are recorded in status and rescheduled.
                    let _ = self.launch().await;
                }
            }
        }

        info!(unit = %self.spec.name, "supervisor loop finished");
    }

    /// Returns false when the loop should end.
    async fn handle_message(&mut self, msg: UnitMessage) -> bool {
        match msg {
            UnitMessage::Control { op, reply } => {
                let result = self.handle_control(op).await;
                if reply.send(result).is_err() {
                    debug!(unit = %self.spec.name, op = op.name(), "caller went away before reply");
                }
                true
            }
            UnitMessage::Shutdown { reply } => {
                self.shutdown_child().await;
                let _ = reply.send(self.snapshot());
                false
            }
        }
    }

    async fn handle_control(&mut self, op: ControlOp) -> Result<UnitStatus> {
        debug!(unit = %self.spec.name, op = op.name(), state = %self.state, "control request");

        match op {
            ControlOp::Start => {
                if !self.state.can_start() {
                    return Err(self.invalid_state(op));
                }
                self.cancel_auto_restart();
                self.backoff.reset();
                self.launch().await?;
            }
            ControlOp::Stop { timeout } => {
                let timeout = timeout.unwrap_or(self.spec.stop_timeout);
                self.stop_child(timeout).await?;
            }
            ControlOp::Restart => {
                self.backoff.reset();
                self.restart(RestartReason::Requested).await?;
            }
        }

        Ok(self.snapshot())
    }

    async fn handle_watch_event(&mut self, event: WatchEvent) {
        match event {
            WatchEvent::Changed(change) if self.accepts_changes() => {
                info!(
                    unit = %self.spec.name,
                    path = ?change.path,
                    coalesced = change.coalesced,
                    "file change detected; restarting"
                );
                self.restart_for_change().await;
            }
            WatchEvent::Changed(change) => {
                debug!(unit = %self.spec.name, state = %self.state, path = ?change.path, "ignoring change");
            }
            WatchEvent::Warning(warning) => self.record_watch_warning(warning),
        }
    }

    /// Watch problems never stop the unit; they only show up in status.
    fn record_watch_warning(&mut self, warning: WatchWarning) {
        match warning {
            WatchWarning::RootLost(root) => {
                warn!(unit = %self.spec.name, root = ?root, "watch root lost");
                self.last_error = Some(format!("watch root lost: {}", root.display()));
            }
            WatchWarning::Backend(msg) => {
                warn!(unit = %self.spec.name, error = %msg, "watcher reported an error");
                self.last_error = Some(format!("watch error: {msg}"));
            }
        }
        self.publish_status();
    }

    /// Restart triggered by the watcher.
    async fn restart_for_change(&mut self) {
        // Fresh code gets a fresh crash budget.
        self.backoff.reset();
        if let Err(err) = self.restart(RestartReason::FileChange).await {
            warn!(unit = %self.spec.name, error = %err, "restart after file change failed");
        }
    }

    /// Strict stop-then-start. A stop timeout does not prevent the start.
    ///
    /// Changes that queued up while the restart ran collapse into at most
    /// one follow-up restart, whatever triggered this one.
    async fn restart(&mut self, reason: RestartReason) -> Result<()> {
        info!(unit = %self.spec.name, ?reason, "restarting unit");

        let result = match self.stop_child(self.spec.stop_timeout).await {
            Ok(()) | Err(ProcwatchError::TimeoutError { .. }) => self.launch().await,
            Err(err) => Err(err),
        };
        self.coalesce_queued_changes();
        result
    }

    fn coalesce_queued_changes(&mut self) {
        let mut drained = Vec::new();
        if let Some(rx) = self.watch_rx.as_mut() {
            while let Ok(event) = rx.try_recv() {
                drained.push(event);
            }
        }

        let mut queued = 0usize;
        for event in drained {
            match event {
                WatchEvent::Changed(_) => queued += 1,
                WatchEvent::Warning(warning) => self.record_watch_warning(warning),
            }
        }
        if queued == 0 {
            return;
        }

        if self.accepts_changes() {
            debug!(unit = %self.spec.name, queued, "changes arrived during restart; one more restart queued");
            self.restart_pending = true;
        } else {
            debug!(unit = %self.spec.name, queued, state = %self.state, "dropping changes queued during restart");
        }
    }

    /// File changes only restart a unit that is meant to be up.
    fn accepts_changes(&self) -> bool {
        matches!(self.state, UnitState::Running | UnitState::Crashed)
    }

    /// Spawn a new child. On failure the unit is `Crashed` and, with
    /// autorestart, a retry is scheduled.
    async fn launch(&mut self) -> Result<()> {
        self.set_state(UnitState::Starting);

        let handle = match process::spawn_child(&self.spec) {
            Ok(handle) => handle,
            Err(err) => {
                let reason = format!("{err:#}");
                error!(unit = %self.spec.name, error = %reason, "failed to launch unit");
                self.last_error = Some(reason.clone());
                self.last_exit_code = None;
                self.schedule_auto_restart(Duration::ZERO);
                self.set_state(UnitState::Crashed);
                return Err(ProcwatchError::LaunchError {
                    unit: self.spec.name.clone(),
                    reason,
                });
            }
        };

        let pid = handle.pid;
        self.child = Some(handle);
        self.launches += 1;
        self.last_error = None;
        self.set_state(UnitState::Running);
        info!(unit = %self.spec.name, pid, "unit running");

        if let Some(stop) = self.take_pending_stop() {
            self.abort_start(stop).await;
        }
        Ok(())
    }

    /// Pull queued control messages off the channel; hand back a stop
    /// request if one arrived while we were starting.
    fn take_pending_stop(&mut self) -> Option<UnitMessage> {
        while let Ok(msg) = self.control_rx.try_recv() {
            self.backlog.push_back(msg);
        }
        let idx = self.backlog.iter().position(UnitMessage::is_stop)?;
        self.backlog.remove(idx)
    }

    /// A stop arrived mid-start: kill the fresh child right away.
    async fn abort_start(&mut self, stop: UnitMessage) {
        info!(unit = %self.spec.name, "stop requested during start; killing new child");
        self.set_state(UnitState::Stopping);
        if let Some(mut handle) = self.child.take() {
            if let Err(err) = process::kill_now(&mut handle.child).await {
                warn!(unit = %self.spec.name, error = %err, "failed to kill child");
            }
        }
        self.last_exit_code = None;
        self.set_state(UnitState::Stopped);

        if let UnitMessage::Control { reply, .. } = stop {
            let _ = reply.send(Ok(self.snapshot()));
        }
    }

    /// Graceful stop with escalation. Idempotent when nothing is running.
    async fn stop_child(&mut self, timeout: Duration) -> Result<()> {
        self.cancel_auto_restart();
        self.restart_pending = false;

        let Some(mut handle) = self.child.take() else {
            self.set_state(UnitState::Stopped);
            return Ok(());
        };

        self.set_state(UnitState::Stopping);
        info!(unit = %self.spec.name, pid = handle.pid, ?timeout, "stopping unit");

        let outcome = process::terminate(&mut handle.child, &self.spec.name, timeout).await;
        let result = match outcome {
            Ok(StopOutcome::Exited(code)) => {
                self.last_exit_code = code;
                Ok(())
            }
            Ok(StopOutcome::Killed) => {
                self.last_exit_code = None;
                Err(ProcwatchError::TimeoutError {
                    unit: self.spec.name.clone(),
                    timeout,
                })
            }
            Err(err) => {
                // The handle is dropped below, and kill_on_drop reaps it.
                error!(unit = %self.spec.name, error = %format!("{err:#}"), "error while stopping unit");
                Err(ProcwatchError::Other(err))
            }
        };
        drop(handle);

        self.set_state(UnitState::Stopped);
        result
    }

    async fn shutdown_child(&mut self) {
        if let Err(err) = self.stop_child(self.spec.stop_timeout).await {
            warn!(unit = %self.spec.name, error = %err, "unit did not stop cleanly on shutdown");
        }
    }

    fn on_child_exit(&mut self, status: std::io::Result<ExitStatus>) {
        let Some(handle) = self.child.take() else {
            return;
        };
        let uptime = handle.started_at.elapsed();

        let code = match status {
            Ok(status) => status.code(),
            Err(err) => {
                warn!(unit = %self.spec.name, error = %err, "failed to wait on child");
                None
            }
        };
        self.last_exit_code = code;

        warn!(
            unit = %self.spec.name,
            pid = handle.pid,
            exit_code = ?code,
            uptime_ms = uptime.as_millis() as u64,
            "unit exited unexpectedly"
        );

        self.schedule_auto_restart(uptime);
        self.set_state(UnitState::Crashed);
    }

    /// Apply the crash policy after the child died or failed to launch.
    fn schedule_auto_restart(&mut self, uptime: Duration) {
        let delay = self.backoff.record_crash(uptime);
        let crashes = self.backoff.consecutive();

        if !self.spec.autorestart {
            debug!(unit = %self.spec.name, "autorestart disabled; staying crashed");
            return;
        }

        if let Some(max) = self.spec.max_restarts {
            if crashes > max {
                error!(unit = %self.spec.name, crashes, "too many consecutive crashes; giving up");
                self.last_error = Some(format!("gave up after {crashes} consecutive crashes"));
                self.restart_at = None;
                self.restart_delay = None;
                return;
            }
        }

        info!(
            unit = %self.spec.name,
            crashes,
            delay_ms = delay.as_millis() as u64,
            "scheduling automatic restart"
        );
        self.restart_at = Some(Instant::now() + delay);
        self.restart_delay = Some(delay);
    }

    fn cancel_auto_restart(&mut self) {
        if self.restart_at.take().is_some() {
            debug!(unit = %self.spec.name, "pending automatic restart cancelled");
        }
        self.restart_delay = None;
    }

    fn invalid_state(&self, op: ControlOp) -> ProcwatchError {
        ProcwatchError::InvalidState {
            unit: self.spec.name.clone(),
            operation: op.name(),
            state: self.state.to_string(),
        }
    }

    fn set_state(&mut self, to: UnitState) {
        let from = self.state;
        if from == to {
            self.publish_status();
            return;
        }
        self.state = to;

        let change = StateChange {
            unit: self.spec.name.clone(),
            from,
            to,
            pid: self.child.as_ref().map(|c| c.pid),
            exit_code: self.last_exit_code,
            restart_delay: if to == UnitState::Crashed {
                self.restart_delay
            } else {
                None
            },
        };
        debug!(unit = %self.spec.name, %from, %to, "state transition");
        // No subscribers is fine.
        let _ = self.transitions.send(change);
        self.publish_status();
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.snapshot());
    }

    fn snapshot(&self) -> UnitStatus {
        UnitStatus {
            name: self.spec.name.clone(),
            state: self.state,
            pid: self.child.as_ref().map(|c| c.pid),
            started_at: self.child.as_ref().map(|c| c.started_at_wall),
            last_exit_code: self.last_exit_code,
            restarts: self.launches.saturating_sub(1),
            consecutive_crashes: self.backoff.consecutive(),
            restart_delay: self.restart_delay,
            last_error: self.last_error.clone(),
        }
    }
}

async fn recv_watch(rx: &mut Option<mpsc::Receiver<WatchEvent>>) -> Option<WatchEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_child(child: &mut Option<ProcessHandle>) -> std::io::Result<ExitStatus> {
    match child {
        Some(handle) => handle.child.wait().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
    }
}
