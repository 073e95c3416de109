// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::default_config_path;
use crate::control::ControlRequest;
use crate::types::parse_duration;

/// Command-line arguments for `procwatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "procwatch",
    version,
    about = "Supervise long-running processes and restart them on file changes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Procwatch.toml` in the current working directory.
    #[arg(long, global = true, value_name = "PATH", default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROCWATCH_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Without a subcommand, `run` is assumed.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the supervisor daemon in the foreground.
    Run {
        /// Parse + validate, print the units, but don't launch anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the status of one unit, or of all units.
    Status { name: Option<String> },
    /// Start a stopped or crashed unit.
    Start { name: String },
    /// Stop a unit gracefully, killing it after the timeout.
    Stop {
        name: String,
        /// Override the unit's stop timeout, e.g. "2s" or "500ms".
        #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
        timeout: Option<std::time::Duration>,
    },
    /// Stop, then start a unit.
    Restart { name: String },
}

impl Command {
    /// The control request a client subcommand sends, or `None` for `run`.
    pub fn to_request(&self) -> Option<ControlRequest> {
        match self {
            Command::Run { .. } => None,
            Command::Status { name } => Some(ControlRequest::Status(name.clone())),
            Command::Start { name } => Some(ControlRequest::Start(name.clone())),
            Command::Stop { name, timeout } => Some(ControlRequest::Stop {
                name: name.clone(),
                timeout: *timeout,
            }),
            Command::Restart { name } => Some(ControlRequest::Restart(name.clone())),
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
