use std::time::Duration;

use procwatch::supervisor::{StateChange, SupervisorHandle, UnitState, UnitStatus};
use tokio::sync::broadcast;

/// Poll `handle` until it reports `state`, panicking after `limit`.
pub async fn wait_for_state(
    handle: &SupervisorHandle,
    state: UnitState,
    limit: Duration,
) -> UnitStatus {
    crate::with_timeout_of(limit, async {
        loop {
            let status = handle.status();
            if status.state == state {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
}

/// Next broadcast transition, panicking after `limit`.
pub async fn next_change(
    rx: &mut broadcast::Receiver<StateChange>,
    limit: Duration,
) -> StateChange {
    crate::with_timeout_of(limit, async {
        rx.recv().await.expect("transition channel closed or lagged")
    })
    .await
}

/// Collect transitions until one into `target` has been seen `count` times.
pub async fn collect_until(
    rx: &mut broadcast::Receiver<StateChange>,
    target: UnitState,
    count: usize,
    limit: Duration,
) -> Vec<StateChange> {
    crate::with_timeout_of(limit, async {
        let mut seen = Vec::new();
        let mut hits = 0;
        while hits < count {
            let change = rx.recv().await.expect("transition channel closed or lagged");
            if change.to == target {
                hits += 1;
            }
            seen.push(change);
        }
        seen
    })
    .await
}
