// src/control/mod.rs

//! Status/control surface: query units and start/stop/restart them by name.
//!
//! The running daemon serves [`protocol`] over a Unix domain socket
//! ([`server`]); the CLI subcommands are thin clients ([`client`]).

pub mod protocol;

#[cfg(unix)]
pub mod client;
#[cfg(unix)]
pub mod server;

pub use protocol::{ControlRequest, ControlResponse};
