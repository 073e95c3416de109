// src/manager.rs

//! Owns every managed unit by name.
//!
//! Each unit is an isolated (supervisor, watcher) pair. A unit whose watcher
//! could not be started is kept in a separate `failed` table so that status
//! queries can still report it; no other unit is affected.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::config::model::{ConfigFile, UnitConfig};
use crate::control::protocol::{ControlRequest, ControlResponse};
use crate::errors::{ProcwatchError, Result};
use crate::supervisor::{ControlOp, SupervisorHandle, UnitStatus, spawn_supervisor};
use crate::watch::Watcher;

pub struct Manager {
    units: BTreeMap<String, SupervisorHandle>,
    failed: BTreeMap<String, String>,
    watchers: Mutex<Vec<Watcher>>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("units", &self.units.keys().collect::<Vec<_>>())
            .field("failed", &self.failed)
            .finish()
    }
}

impl Manager {
    /// Build supervisors (and watchers, where enabled) for every valid unit.
    ///
    /// Units stay `Stopped` until [`Manager::start_all`]. Must be called
    /// inside a Tokio runtime.
    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::from_units(cfg.units().iter().cloned())
    }

    pub fn from_units(units: impl IntoIterator<Item = UnitConfig>) -> Self {
        let mut handles = BTreeMap::new();
        let mut failed = BTreeMap::new();
        let mut watchers = Vec::new();
        let mut loops = Vec::new();

        for unit in units {
            let name = unit.spec.name.clone();

            let watch_rx = match unit.watch {
                Some(watch_cfg) => match Watcher::start(watch_cfg) {
                    Ok((watcher, rx)) => {
                        watchers.push(watcher);
                        Some(rx)
                    }
                    Err(err) => {
                        error!(unit = %name, error = %err, "cannot start file watcher; unit disabled");
                        failed.insert(name, err.to_string());
                        continue;
                    }
                },
                None => None,
            };

            let (handle, join) = spawn_supervisor(unit.spec, watch_rx);
            handles.insert(name, handle);
            loops.push(join);
        }

        Self {
            units: handles,
            failed,
            watchers: Mutex::new(watchers),
            loops: Mutex::new(loops),
        }
    }

    pub fn unit_names(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    pub fn failed(&self) -> &BTreeMap<String, String> {
        &self.failed
    }

    /// Look up a runnable unit.
    pub fn get(&self, name: &str) -> Result<&SupervisorHandle> {
        self.units
            .get(name)
            .ok_or_else(|| ProcwatchError::UnitNotFound(name.to_string()))
    }

    /// Start every unit. One unit failing to launch does not stop the rest.
    pub async fn start_all(&self) -> Vec<(String, Result<UnitStatus>)> {
        let mut results = Vec::with_capacity(self.units.len());
        for (name, handle) in &self.units {
            let result = handle.start().await;
            match &result {
                Ok(status) => info!(unit = %name, pid = ?status.pid, "unit started"),
                Err(err) => warn!(unit = %name, error = %err, "unit failed to start"),
            }
            results.push((name.clone(), result));
        }
        results
    }

    /// Apply a control operation to the named unit.
    pub async fn control(&self, name: &str, op: ControlOp) -> Result<UnitStatus> {
        if let Some(reason) = self.failed.get(name) {
            return Err(ProcwatchError::InvalidState {
                unit: name.to_string(),
                operation: op.name(),
                state: format!("failed ({reason})"),
            });
        }
        self.get(name)?.control(op).await
    }

    /// Status lines, one per unit, in name order.
    pub fn status_lines(&self, name: Option<&str>) -> Result<Vec<String>> {
        match name {
            Some(name) => {
                if let Some(reason) = self.failed.get(name) {
                    return Ok(vec![failed_line(name, reason)]);
                }
                Ok(vec![self.get(name)?.status().to_string()])
            }
            None => {
                let mut lines: BTreeMap<&str, String> = self
                    .units
                    .iter()
                    .map(|(name, handle)| (name.as_str(), handle.status().to_string()))
                    .collect();
                for (name, reason) in &self.failed {
                    lines.insert(name.as_str(), failed_line(name, reason));
                }
                Ok(lines.into_values().collect())
            }
        }
    }

    pub async fn handle_request(&self, request: &ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::Status(name) => match self.status_lines(name.as_deref()) {
                Ok(lines) => ControlResponse::ok(lines),
                Err(err) => ControlResponse::error(&err),
            },
            ControlRequest::Start(name) => {
                ControlResponse::from_result(self.control(name, ControlOp::Start).await)
            }
            ControlRequest::Stop { name, timeout } => ControlResponse::from_result(
                self.control(name, ControlOp::Stop { timeout: *timeout }).await,
            ),
            ControlRequest::Restart(name) => {
                ControlResponse::from_result(self.control(name, ControlOp::Restart).await)
            }
        }
    }

    /// Gracefully stop every unit concurrently, then release the watchers.
    pub async fn shutdown(&self) -> Vec<UnitStatus> {
        let mut set = JoinSet::new();
        for handle in self.units.values() {
            let handle = handle.clone();
            set.spawn(async move { handle.shutdown().await });
        }

        let mut statuses = Vec::with_capacity(self.units.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(status) => statuses.push(status),
                Err(err) => error!(error = %err, "unit shutdown task failed"),
            }
        }
        statuses.sort_by(|a, b| a.name.cmp(&b.name));

        let loops = match self.loops.lock() {
            Ok(mut loops) => std::mem::take(&mut *loops),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for join in loops {
            if let Err(err) = join.await {
                error!(error = %err, "unit control loop panicked");
            }
        }

        match self.watchers.lock() {
            Ok(mut watchers) => watchers.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }

        info!(units = statuses.len(), "all units shut down");
        statuses
    }
}

fn failed_line(name: &str, reason: &str) -> String {
    format!("{name} failed error={reason}")
}
