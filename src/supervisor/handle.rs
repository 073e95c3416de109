// src/supervisor/handle.rs

use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::errors::{ProcwatchError, Result};
use crate::supervisor::spec::ProcessSpec;
use crate::supervisor::state::{StateChange, UnitStatus};
use crate::supervisor::unit_loop::{ControlOp, UnitLoop, UnitMessage};
use crate::watch::WatchEvent;

/// Cloneable handle to a running unit supervisor.
///
/// Requests are queued to the unit's control loop and answered in order.
/// `status()` reads the last published snapshot without waiting for the
/// loop, so it stays responsive while a stop is in progress.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    name: String,
    tx: mpsc::Sender<UnitMessage>,
    status_rx: watch::Receiver<UnitStatus>,
    transitions: broadcast::Sender<StateChange>,
}

/// Spawn the control loop for `spec`.
///
/// The unit starts in `Stopped`; call [`SupervisorHandle::start`] to launch
/// it. `watch_rx` is the unit's change stream, or `None` when `watch = false`.
pub fn spawn_supervisor(
    spec: ProcessSpec,
    watch_rx: Option<mpsc::Receiver<WatchEvent>>,
) -> (SupervisorHandle, JoinHandle<()>) {
    let name = spec.name.clone();
    let (tx, rx) = mpsc::channel::<UnitMessage>(32);
    let (status_tx, status_rx) = watch::channel(UnitStatus::new(name.clone()));
    let (transitions, _) = broadcast::channel::<StateChange>(128);

    let unit_loop = UnitLoop::new(spec, rx, watch_rx, status_tx, transitions.clone());
    let join = tokio::spawn(unit_loop.run());

    (
        SupervisorHandle {
            name,
            tx,
            status_rx,
            transitions,
        },
        join,
    )
}

impl SupervisorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn start(&self) -> Result<UnitStatus> {
        self.control(ControlOp::Start).await
    }

    /// Stop using the unit's configured timeout.
    pub async fn stop(&self) -> Result<UnitStatus> {
        self.control(ControlOp::Stop { timeout: None }).await
    }

    pub async fn stop_with_timeout(&self, timeout: Duration) -> Result<UnitStatus> {
        self.control(ControlOp::Stop {
            timeout: Some(timeout),
        })
        .await
    }

    pub async fn restart(&self) -> Result<UnitStatus> {
        self.control(ControlOp::Restart).await
    }

    pub fn status(&self) -> UnitStatus {
        self.status_rx.borrow().clone()
    }

    /// Receive every state transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.transitions.subscribe()
    }

    /// Stop the child and end the control loop.
    pub async fn shutdown(&self) -> UnitStatus {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(UnitMessage::Shutdown { reply }).await.is_err() {
            return self.status();
        }
        rx.await.unwrap_or_else(|_| self.status())
    }

    pub async fn control(&self, op: ControlOp) -> Result<UnitStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(UnitMessage::Control { op, reply })
            .await
            .map_err(|_| self.loop_gone())?;
        rx.await.map_err(|_| self.loop_gone())?
    }

    fn loop_gone(&self) -> ProcwatchError {
        ProcwatchError::Other(anyhow::anyhow!(
            "supervisor loop for unit '{}' is no longer running",
            self.name
        ))
    }
}
