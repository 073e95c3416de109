// src/supervisor/state.rs

use std::fmt;
use std::time::{Duration, SystemTime};

use crate::supervisor::spec::UnitName;

/// Lifecycle state of a managed unit.
///
/// `Stopped -> Starting -> Running -> Stopping -> Stopped`, with `Crashed`
/// entered from `Running` when the child exits without being asked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
}

impl UnitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitState::Stopped => "stopped",
            UnitState::Starting => "starting",
            UnitState::Running => "running",
            UnitState::Stopping => "stopping",
            UnitState::Crashed => "crashed",
        }
    }

    /// States from which `start()` is accepted.
    pub fn can_start(&self) -> bool {
        matches!(self, UnitState::Stopped | UnitState::Crashed)
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a unit, as returned by `status()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitStatus {
    pub name: UnitName,
    pub state: UnitState,
    /// Set only while the child is alive.
    pub pid: Option<u32>,
    pub started_at: Option<SystemTime>,
    /// Exit code of the most recent child; `None` if it was killed by a
    /// signal or has not exited yet.
    pub last_exit_code: Option<i32>,
    /// Number of launches after the first one.
    pub restarts: u64,
    pub consecutive_crashes: u32,
    /// Delay of the pending automatic restart, if one is scheduled.
    pub restart_delay: Option<Duration>,
    pub last_error: Option<String>,
}

impl UnitStatus {
    pub fn new(name: impl Into<UnitName>) -> Self {
        Self {
            name: name.into(),
            state: UnitState::Stopped,
            pid: None,
            started_at: None,
            last_exit_code: None,
            restarts: 0,
            consecutive_crashes: 0,
            restart_delay: None,
            last_error: None,
        }
    }

    pub fn uptime(&self) -> Option<Duration> {
        self.started_at.and_then(|t| t.elapsed().ok())
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.state)?;
        if let Some(pid) = self.pid {
            write!(f, " pid={pid}")?;
        }
        if let Some(uptime) = self.uptime() {
            write!(f, " uptime={}s", uptime.as_secs())?;
        }
        if let Some(code) = self.last_exit_code {
            write!(f, " last_exit={code}")?;
        }
        write!(f, " restarts={}", self.restarts)?;
        if let Some(delay) = self.restart_delay {
            write!(f, " restart_in={}ms", delay.as_millis())?;
        }
        if let Some(err) = &self.last_error {
            write!(f, " error=\"{err}\"")?;
        }
        Ok(())
    }
}

/// One lifecycle transition, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    pub unit: UnitName,
    pub from: UnitState,
    pub to: UnitState,
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    /// Backoff delay chosen when entering `Crashed` with autorestart on.
    pub restart_delay: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stopped_and_crashed_can_start() {
        assert!(UnitState::Stopped.can_start());
        assert!(UnitState::Crashed.can_start());
        assert!(!UnitState::Running.can_start());
        assert!(!UnitState::Starting.can_start());
        assert!(!UnitState::Stopping.can_start());
    }

    #[test]
    fn status_line_includes_pid_and_exit_code() {
        let mut status = UnitStatus::new("svc");
        status.state = UnitState::Crashed;
        status.last_exit_code = Some(1);
        status.restart_delay = Some(Duration::from_millis(500));
        let line = status.to_string();
        assert!(line.starts_with("svc crashed"));
        assert!(line.contains("last_exit=1"));
        assert!(line.contains("restart_in=500ms"));
        assert!(!line.contains("pid="));
    }
}
