// src/supervisor/mod.rs

//! Lifecycle management for one child process per unit.
//!
//! - [`spec`] holds the immutable launch configuration.
//! - [`process`] wraps OS process control (spawn, SIGTERM, kill).
//! - [`backoff`] implements the crash backoff policy.
//! - [`unit_loop`] is the single control loop that owns the child.
//! - [`handle`] is the cloneable API used by the manager and tests.

pub mod backoff;
pub mod handle;
pub mod process;
pub mod spec;
pub mod state;
pub mod unit_loop;

pub use backoff::{BackoffPolicy, CrashBackoff};
pub use handle::{SupervisorHandle, spawn_supervisor};
pub use process::{ProcessHandle, StopOutcome};
pub use spec::{ProcessSpec, UnitName};
pub use state::{StateChange, UnitState, UnitStatus};
pub use unit_loop::ControlOp;
