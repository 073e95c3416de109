// src/watch/debounce.rs

//! Trailing-edge debouncing of raw filesystem events.
//!
//! Editors often save in several steps (write temp file, rename, chmod). All
//! raw events seen within `window` of each other collapse into a single
//! [`ChangeEvent`], emitted once the filesystem has been quiet for `window`.

use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

/// Default debounce window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// A debounced filesystem change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Most recent path that changed in this burst.
    pub path: PathBuf,
    /// When the first raw event of the burst was seen.
    pub timestamp: SystemTime,
    /// Number of raw events collapsed into this one.
    pub coalesced: usize,
}

#[derive(Debug)]
struct Pending {
    path: PathBuf,
    first_seen: SystemTime,
    last_seen: Instant,
    count: usize,
}

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: Option<Pending>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    /// Record a relevant raw event observed at `now`.
    pub fn record(&mut self, path: PathBuf, now: Instant) {
        match &mut self.pending {
            Some(pending) => {
                pending.path = path;
                pending.last_seen = now;
                pending.count += 1;
            }
            None => {
                self.pending = Some(Pending {
                    path,
                    first_seen: SystemTime::now(),
                    last_seen: now,
                    count: 1,
                });
            }
        }
    }

    /// Instant at which the pending burst becomes emittable, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.last_seen + self.window)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Take the pending burst if the window has elapsed at `now`.
    pub fn poll(&mut self, now: Instant) -> Option<ChangeEvent> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }
        self.pending.take().map(|p| ChangeEvent {
            path: p.path,
            timestamp: p.first_seen,
            coalesced: p.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WINDOW: Duration = Duration::from_millis(300);

    #[test]
    fn nothing_recorded_nothing_emitted() {
        let mut d = Debouncer::new(WINDOW);
        assert!(d.deadline().is_none());
        assert!(d.poll(Instant::now() + WINDOW * 10).is_none());
    }

    #[test]
    fn event_is_held_until_window_elapses() {
        let mut d = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        d.record(PathBuf::from("src/main.rs"), t0);

        assert!(d.poll(t0 + Duration::from_millis(100)).is_none());
        let ev = d.poll(t0 + WINDOW).expect("event after window");
        assert_eq!(ev.path, PathBuf::from("src/main.rs"));
        assert_eq!(ev.coalesced, 1);
        assert!(!d.is_pending());
    }

    #[test]
    fn new_events_extend_the_window() {
        let mut d = Debouncer::new(WINDOW);
        let t0 = Instant::now();
        d.record(PathBuf::from("a"), t0);
        d.record(PathBuf::from("b"), t0 + Duration::from_millis(250));

        assert!(d.poll(t0 + Duration::from_millis(400)).is_none());
        let ev = d.poll(t0 + Duration::from_millis(550)).unwrap();
        assert_eq!(ev.path, PathBuf::from("b"));
        assert_eq!(ev.coalesced, 2);
    }

    proptest! {
        #[test]
        fn burst_within_window_yields_exactly_one_event(
            gaps in proptest::collection::vec(0u64..300, 1..50)
        ) {
            let mut d = Debouncer::new(WINDOW);
            let mut now = Instant::now();
            let mut emitted = 0;

            for (i, gap) in gaps.iter().enumerate() {
                now += Duration::from_millis(*gap);
                if d.poll(now).is_some() {
                    emitted += 1;
                }
                d.record(PathBuf::from(format!("f{i}")), now);
            }
            if d.poll(now + WINDOW).is_some() {
                emitted += 1;
            }

            prop_assert_eq!(emitted, 1);
        }
    }
}
