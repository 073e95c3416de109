// src/watch/watcher.rs

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{ProcwatchError, Result};
use crate::watch::debounce::{ChangeEvent, DEFAULT_DEBOUNCE, Debouncer};
use crate::watch::path_utils::relative_to_roots;
use crate::watch::patterns::IgnoreSet;

/// Immutable watch settings for one unit.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    roots: Vec<PathBuf>,
    ignore: Vec<String>,
    follow_symlinks: bool,
    debounce: Duration,
}

impl WatchConfig {
    /// Fails with `ConfigError` when `roots` is empty or an ignore pattern
    /// does not compile.
    pub fn new(roots: Vec<PathBuf>, ignore: Vec<String>, follow_symlinks: bool) -> Result<Self> {
        if roots.is_empty() {
            return Err(ProcwatchError::ConfigError(
                "watch config needs at least one root path".to_string(),
            ));
        }
        IgnoreSet::new(&ignore)?;

        Ok(Self {
            roots,
            ignore,
            follow_symlinks,
            debounce: DEFAULT_DEBOUNCE,
        })
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn ignore(&self) -> &[String] {
        &self.ignore
    }

    pub fn follow_symlinks(&self) -> bool {
        self.follow_symlinks
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }
}

/// Non-fatal conditions reported alongside change events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchWarning {
    /// A watched root disappeared; the remaining roots are still watched.
    RootLost(PathBuf),
    /// The notify backend reported an error.
    Backend(String),
}

/// Items produced by a running [`Watcher`], in detection order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Changed(ChangeEvent),
    Warning(WatchWarning),
}

/// Running filesystem watcher for one unit.
///
/// Holds the notify backend and the async task that filters and debounces
/// its events. Dropping the watcher stops it.
pub struct Watcher {
    backend: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Watcher {
    /// Begin watching `config.roots()` recursively.
    ///
    /// Roots that do not exist are skipped with a warning; if none exist the
    /// watcher fails to start with `ConfigError`. Must be called inside a
    /// Tokio runtime.
    pub fn start(config: WatchConfig) -> Result<(Watcher, mpsc::Receiver<WatchEvent>)> {
        let mut roots = Vec::with_capacity(config.roots.len());
        for root in &config.roots {
            match root.canonicalize() {
                Ok(canon) => roots.push(canon),
                Err(err) => warn!(root = ?root, error = %err, "watch root is not reachable; skipping"),
            }
        }
        if roots.is_empty() {
            return Err(ProcwatchError::ConfigError(format!(
                "none of the watch roots exist: {:?}",
                config.roots
            )));
        }

        let ignore = IgnoreSet::new(&config.ignore)?;

        // Channel from the blocking notify callback into the async world.
        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();

        let mut backend = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // The receiver is gone once the watcher is stopped.
                let _ = raw_tx.send(res);
            },
            Config::default().with_follow_symlinks(config.follow_symlinks),
        )
        .map_err(|e| ProcwatchError::WatchError(format!("creating file watcher: {e}")))?;

        for root in &roots {
            backend
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| ProcwatchError::WatchError(format!("watching {root:?}: {e}")))?;
        }

        info!(
            ?roots,
            ignore = ?ignore.patterns(),
            follow_symlinks = config.follow_symlinks,
            "file watcher started"
        );

        let (event_tx, event_rx) = mpsc::channel::<WatchEvent>(64);
        let task = tokio::spawn(event_loop(
            roots,
            ignore,
            config.debounce,
            raw_rx,
            event_tx,
        ));

        Ok((
            Watcher {
                backend: Some(backend),
                task: Some(task),
            },
            event_rx,
        ))
    }

    /// Stop watching. Pending, not yet debounced changes are discarded.
    /// Calling this more than once has no further effect.
    pub fn stop(&mut self) {
        if let Some(backend) = self.backend.take() {
            drop(backend);
            debug!("file watcher backend released");
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.backend.is_some()
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Filter raw notify events through the ignore set, debounce them, and
/// forward the result.
async fn event_loop(
    roots: Vec<PathBuf>,
    ignore: IgnoreSet,
    window: Duration,
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    event_tx: mpsc::Sender<WatchEvent>,
) {
    let mut debouncer = Debouncer::new(window);
    let mut lost_roots: HashSet<PathBuf> = HashSet::new();

    loop {
        let deadline = debouncer.deadline();

        tokio::select! {
            raw = raw_rx.recv() => {
                let Some(raw) = raw else { break };

                match raw {
                    Ok(event) => {
                        debug!(?event, "received notify event");
                        if is_change(&event.kind) {
                            for path in event.paths {
                                record_path(&roots, &ignore, &mut debouncer, path);
                            }
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "file watch error");
                        let warning = WatchEvent::Warning(WatchWarning::Backend(err.to_string()));
                        if event_tx.send(warning).await.is_err() {
                            break;
                        }
                    }
                }

                for root in &roots {
                    if !lost_roots.contains(root) && !root.exists() {
                        warn!(root = ?root, "watch root disappeared; continuing on remaining roots");
                        lost_roots.insert(root.clone());
                        let warning = WatchEvent::Warning(WatchWarning::RootLost(root.clone()));
                        if event_tx.send(warning).await.is_err() {
                            return;
                        }
                    }
                }
            }

            _ = sleep_until(deadline), if deadline.is_some() => {
                if let Some(change) = debouncer.poll(Instant::now()) {
                    debug!(path = ?change.path, coalesced = change.coalesced, "emitting change event");
                    if event_tx.send(WatchEvent::Changed(change)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    debug!("watcher event loop finished");
}

fn record_path(roots: &[PathBuf], ignore: &IgnoreSet, debouncer: &mut Debouncer, path: PathBuf) {
    let Some((_root, rel)) = relative_to_roots(roots, &path) else {
        debug!(?path, "event outside of watch roots; ignoring");
        return;
    };

    if ignore.is_ignored(&rel) {
        debug!(rel = %rel, "path matches ignore_watch; ignoring");
        return;
    }

    debouncer.record(path, Instant::now());
}

/// Reads and opens are not modifications.
fn is_change(kind: &EventKind) -> bool {
    !matches!(kind, EventKind::Access(_))
}

async fn sleep_until(deadline: Option<Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_config_requires_a_root() {
        let err = WatchConfig::new(vec![], vec![], false).unwrap_err();
        assert!(matches!(err, ProcwatchError::ConfigError(_)));
    }

    #[test]
    fn watch_config_rejects_bad_ignore_glob() {
        let err = WatchConfig::new(vec![PathBuf::from(".")], vec!["[".into()], false).unwrap_err();
        assert!(matches!(err, ProcwatchError::ConfigError(_)));
    }

    #[tokio::test]
    async fn start_fails_when_no_root_exists() {
        let cfg = WatchConfig::new(
            vec![PathBuf::from("/definitely/not/a/real/procwatch/root")],
            vec![],
            false,
        )
        .unwrap();
        let err = Watcher::start(cfg).unwrap_err();
        assert!(matches!(err, ProcwatchError::ConfigError(_)));
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = WatchConfig::new(vec![dir.path().to_path_buf()], vec![], false).unwrap();
        let (mut watcher, _rx) = Watcher::start(cfg).unwrap();
        assert!(watcher.is_active());
        watcher.stop();
        watcher.stop();
        assert!(!watcher.is_active());
    }
}
