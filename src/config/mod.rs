// src/config/mod.rs

//! Configuration loading and validation for procwatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it into per-unit `ProcessSpec` / `WatchConfig` (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_settings};
pub use model::{
    AppConfig, BackoffSection, ConfigFile, ConfigSection, RawConfigFile, Settings, UnitConfig,
};
pub use validate::{validate_app, validate_settings};
