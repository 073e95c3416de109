// tests/file_change_restart.rs
#![cfg(unix)]

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use procwatch::supervisor::{UnitState, spawn_supervisor};
use procwatch::watch::{ChangeEvent, WatchConfig, WatchEvent, WatchWarning, Watcher};
use procwatch_test_utils::builders::ProcessSpecBuilder;
use procwatch_test_utils::init_tracing;
use procwatch_test_utils::units::wait_for_state;
use tokio::sync::mpsc;

fn change(path: &str) -> WatchEvent {
    WatchEvent::Changed(ChangeEvent {
        path: PathBuf::from(path),
        timestamp: SystemTime::now(),
        coalesced: 1,
    })
}

async fn wait_for_restarts(handle: &procwatch::supervisor::SupervisorHandle, n: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while handle.status().restarts < n || handle.status().state != UnitState::Running {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("restart did not happen");
}

#[tokio::test]
async fn real_file_change_restarts_the_child() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let cfg = WatchConfig::new(vec![dir.path().to_path_buf()], vec!["target".into()], false)
        .unwrap()
        .with_debounce(Duration::from_millis(100));
    let (_watcher, watch_rx) = Watcher::start(cfg).unwrap();

    let spec = ProcessSpecBuilder::new("app", "sleep").args(&["30"]).build();
    let (handle, _join) = spawn_supervisor(spec, Some(watch_rx));
    let first = handle.start().await.unwrap().pid.unwrap();
    tokio::time::sleep(Duration::from_millis(250)).await;

    fs::write(dir.path().join("main.rs"), b"fn main() {}").unwrap();
    wait_for_restarts(&handle, 1).await;

    let status = handle.status();
    assert_ne!(status.pid.unwrap(), first);
    assert_eq!(status.restarts, 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn changes_queued_during_a_restart_coalesce_into_one_more() {
    init_tracing();

    let (tx, rx) = mpsc::channel(16);
    let spec = ProcessSpecBuilder::new("app", "sleep").args(&["30"]).build();
    let (handle, _join) = spawn_supervisor(spec, Some(rx));
    handle.start().await.unwrap();

    // Queued before the loop gets to run: the first triggers a restart,
    // the other four collapse into a single follow-up.
    for i in 0..5 {
        tx.send(change(&format!("src/{i}.rs"))).await.unwrap();
    }

    wait_for_restarts(&handle, 2).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let status = handle.status();
    assert_eq!(status.restarts, 2);
    assert_eq!(status.state, UnitState::Running);

    handle.shutdown().await;
}

#[tokio::test]
async fn change_while_stopped_is_ignored() {
    init_tracing();

    let (tx, rx) = mpsc::channel(16);
    let spec = ProcessSpecBuilder::new("app", "sleep").args(&["30"]).build();
    let (handle, _join) = spawn_supervisor(spec, Some(rx));
    handle.start().await.unwrap();
    handle.stop().await.unwrap();

    tx.send(change("src/lib.rs")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let status = handle.status();
    assert_eq!(status.state, UnitState::Stopped);
    assert_eq!(status.restarts, 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn change_while_crashed_restarts_immediately() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("fixed");
    // Crashes until the "fix" lands, then stays up.
    let script = format!("[ -f '{}' ] && exec sleep 30; exit 1", marker.display());

    let (tx, rx) = mpsc::channel(16);
    let spec = ProcessSpecBuilder::shell("app", &script)
        .fast_backoff(10_000, 10_000, 60_000)
        .build();
    let (handle, _join) = spawn_supervisor(spec, Some(rx));
    handle.start().await.unwrap();
    wait_for_state(&handle, UnitState::Crashed, Duration::from_secs(2)).await;

    fs::write(&marker, b"").unwrap();
    tx.send(change("src/lib.rs")).await.unwrap();

    // Well before the 10s backoff would have fired.
    let status = wait_for_state(&handle, UnitState::Running, Duration::from_secs(2)).await;
    assert!(status.pid.is_some());
    assert_eq!(status.restart_delay, None);

    handle.shutdown().await;
}

#[tokio::test]
async fn watch_warnings_surface_in_status_without_stopping_the_unit() {
    init_tracing();

    let (tx, rx) = mpsc::channel(16);
    let spec = ProcessSpecBuilder::new("app", "sleep").args(&["30"]).build();
    let (handle, _join) = spawn_supervisor(spec, Some(rx));
    handle.start().await.unwrap();

    tx.send(WatchEvent::Warning(WatchWarning::RootLost(PathBuf::from("/gone"))))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let status = handle.status();
    assert_eq!(status.state, UnitState::Running);
    assert!(status.last_error.unwrap().contains("/gone"));

    handle.shutdown().await;
}

#[tokio::test]
async fn unit_without_watch_never_restarts_on_its_own() {
    init_tracing();

    let dir = tempfile::tempdir().unwrap();
    let spec = ProcessSpecBuilder::new("app", "sleep")
        .args(&["30"])
        .cwd(dir.path())
        .build();
    let (handle, _join) = spawn_supervisor(spec, None);
    handle.start().await.unwrap();

    fs::write(dir.path().join("main.rs"), b"fn main() {}").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(handle.status().restarts, 0);

    handle.shutdown().await;
}

const STUBBORN: &str = "trap '' TERM; while true; do sleep 0.1; done";

#[tokio::test]
async fn stop_during_change_restart_is_not_undone_by_queued_changes() {
    init_tracing();

    let (tx, rx) = mpsc::channel(16);
    let spec = ProcessSpecBuilder::shell("app", STUBBORN)
        .stop_timeout(Duration::from_secs(1))
        .build();
    let (handle, _join) = spawn_supervisor(spec, Some(rx));
    handle.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The restart blocks for the full stop timeout; a second change and an
    // operator stop queue up behind it.
    tx.send(change("src/a.rs")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    tx.send(change("src/b.rs")).await.unwrap();
    let status = handle.stop().await.unwrap();
    assert_eq!(status.state, UnitState::Stopped);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let status = handle.status();
    assert_eq!(status.state, UnitState::Stopped);
    assert_eq!(status.restarts, 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn changes_during_explicit_restart_add_only_one_more() {
    init_tracing();

    let (tx, rx) = mpsc::channel(16);
    let spec = ProcessSpecBuilder::shell("app", STUBBORN)
        .stop_timeout(Duration::from_millis(800))
        .build();
    let (handle, _join) = spawn_supervisor(spec, Some(rx));
    handle.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let (restarted, ()) = tokio::join!(handle.restart(), async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        for i in 0..3 {
            tx.send(change(&format!("src/{i}.rs"))).await.unwrap();
        }
    });
    restarted.unwrap();

    wait_for_restarts(&handle, 2).await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let status = handle.status();
    assert_eq!(status.restarts, 2);
    assert_eq!(status.state, UnitState::Running);

    handle.shutdown().await;
}
