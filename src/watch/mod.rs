// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling `ignore_watch` glob patterns per unit.
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//! - Debouncing bursts of raw events into single [`ChangeEvent`]s.
//!
//! It does **not** know about processes; it only turns filesystem changes
//! into an ordered stream of [`WatchEvent`]s for one unit.

pub mod debounce;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use debounce::{ChangeEvent, DEFAULT_DEBOUNCE, Debouncer};
pub use patterns::IgnoreSet;
pub use watcher::{WatchConfig, WatchEvent, WatchWarning, Watcher};
