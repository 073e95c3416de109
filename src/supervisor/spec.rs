// src/supervisor/spec.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::supervisor::backoff::BackoffPolicy;

/// Name of a managed unit, unique within a config file.
pub type UnitName = String;

/// Immutable launch configuration for one managed unit.
///
/// Built once from the config file and owned by the unit's supervisor.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub name: UnitName,
    /// Program to execute; resolved through `PATH` when not a path.
    pub cmd: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    /// Restart automatically (with backoff) after an unexpected exit.
    pub autorestart: bool,
    /// Consecutive crashes after which automatic restarts give up.
    /// `None` means never give up.
    pub max_restarts: Option<u32>,
    pub stop_timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl ProcessSpec {
    /// Minimal spec with every optional field at its default.
    pub fn new(name: impl Into<UnitName>, cmd: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into(),
            args,
            cwd: None,
            env: BTreeMap::new(),
            autorestart: true,
            max_restarts: Some(DEFAULT_MAX_RESTARTS),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            backoff: BackoffPolicy::default(),
        }
    }

    /// Command line as shown in logs and status output.
    pub fn command_line(&self) -> String {
        std::iter::once(self.cmd.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

pub const DEFAULT_MAX_RESTARTS: u32 = 16;
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
