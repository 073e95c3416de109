// src/errors.rs

//! Crate-wide error type and the exit codes of the control surface.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcwatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Failed to launch unit '{unit}': {reason}")]
    LaunchError { unit: String, reason: String },

    #[error("Watch error: {0}")]
    WatchError(String),

    #[error("Unit '{unit}' did not stop within {timeout:?}; process was killed")]
    TimeoutError { unit: String, timeout: Duration },

    #[error("Unit not found: {0}")]
    UnitNotFound(String),

    #[error("Cannot {operation} unit '{unit}' while it is {state}")]
    InvalidState {
        unit: String,
        operation: &'static str,
        state: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Exit codes reported by the control surface.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const UNIT_NOT_FOUND: i32 = 1;
    pub const INVALID_STATE: i32 = 2;
    pub const STOP_TIMEOUT: i32 = 3;
    pub const LAUNCH_FAILED: i32 = 4;
    pub const CONTROL_ERROR: i32 = 5;
}

impl ProcwatchError {
    /// Exit code used when this error is the answer to a control request.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProcwatchError::UnitNotFound(_) => exit_code::UNIT_NOT_FOUND,
            ProcwatchError::InvalidState { .. } => exit_code::INVALID_STATE,
            ProcwatchError::TimeoutError { .. } => exit_code::STOP_TIMEOUT,
            ProcwatchError::LaunchError { .. } => exit_code::LAUNCH_FAILED,
            _ => exit_code::CONTROL_ERROR,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ProcwatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_errors_map_to_documented_exit_codes() {
        assert_eq!(ProcwatchError::UnitNotFound("x".into()).exit_code(), 1);
        assert_eq!(
            ProcwatchError::InvalidState {
                unit: "x".into(),
                operation: "start",
                state: "running".into(),
            }
            .exit_code(),
            2
        );
        assert_eq!(
            ProcwatchError::TimeoutError {
                unit: "x".into(),
                timeout: Duration::from_secs(2),
            }
            .exit_code(),
            3
        );
        assert_eq!(
            ProcwatchError::LaunchError {
                unit: "x".into(),
                reason: "no such file".into(),
            }
            .exit_code(),
            4
        );
        assert_eq!(ProcwatchError::ConfigError("bad".into()).exit_code(), 5);
    }
}
