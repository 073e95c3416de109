// src/config/validate.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::error;

use crate::config::model::{AppConfig, ConfigFile, ConfigSection, RawConfigFile, Settings, UnitConfig};
use crate::errors::{ProcwatchError, Result};
use crate::supervisor::backoff::BackoffPolicy;
use crate::supervisor::spec::ProcessSpec;
use crate::types::parse_duration;
use crate::watch::WatchConfig;

/// Unit names travel over the line-based control protocol, so no spaces.
static UNIT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]+$").expect("unit name pattern is a valid regex")
});

impl ConfigFile {
    /// Validate a raw config.
    ///
    /// Problems in `[config]`, or a file without any valid unit, fail the
    /// whole load. A broken `[app.<name>]` only rejects that unit.
    pub fn from_raw(raw: RawConfigFile, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();

        if raw.app.is_empty() {
            return Err(ProcwatchError::ConfigError(
                "config must contain at least one [app.<name>] section".to_string(),
            ));
        }

        let settings = validate_settings(&raw.config, &base_dir)?;

        let mut units = Vec::with_capacity(raw.app.len());
        let mut rejected = BTreeMap::new();

        for (name, value) in raw.app {
            let unit = AppConfig::from_value(value)
                .map_err(|e| {
                    ProcwatchError::ConfigError(format!("[app.{name}]: {}", e.message().trim()))
                })
                .and_then(|app| validate_app(&name, &app, &settings, &base_dir));

            match unit {
                Ok(unit) => units.push(unit),
                Err(err) => {
                    error!(unit = %name, error = %err, "rejecting invalid unit");
                    rejected.insert(name, err.to_string());
                }
            }
        }

        if units.is_empty() {
            let reasons: Vec<String> = rejected
                .iter()
                .map(|(name, reason)| format!("{name}: {reason}"))
                .collect();
            return Err(ProcwatchError::ConfigError(format!(
                "no valid [app.<name>] section ({})",
                reasons.join("; ")
            )));
        }

        Ok(ConfigFile::new_unchecked(base_dir, settings, units, rejected))
    }
}

/// Validate the `[config]` section.
pub fn validate_settings(section: &ConfigSection, base_dir: &Path) -> Result<Settings> {
    let stop_timeout = duration_field("[config].stop_timeout", &section.stop_timeout)?;
    let debounce = duration_field("[config].debounce", &section.debounce)?;

    let backoff = &section.backoff;
    let policy = BackoffPolicy {
        initial: duration_field("[config.backoff].initial", &backoff.initial)?,
        max: duration_field("[config.backoff].max", &backoff.max)?,
        multiplier: backoff.multiplier,
        reset_after: duration_field("[config.backoff].reset_after", &backoff.reset_after)?,
    };

    if policy.multiplier == 0 {
        return Err(ProcwatchError::ConfigError(
            "[config.backoff].multiplier must be >= 1 (got 0)".to_string(),
        ));
    }
    if policy.initial > policy.max {
        return Err(ProcwatchError::ConfigError(format!(
            "[config.backoff].initial ({:?}) must not exceed max ({:?})",
            policy.initial, policy.max
        )));
    }
    if section.control_socket.trim().is_empty() {
        return Err(ProcwatchError::ConfigError(
            "[config].control_socket must not be empty".to_string(),
        ));
    }

    Ok(Settings {
        stop_timeout,
        debounce,
        control_socket: base_dir.join(&section.control_socket),
        backoff: policy,
    })
}

/// Validate one `[app.<name>]` section into a unit.
pub fn validate_app(
    name: &str,
    app: &AppConfig,
    settings: &Settings,
    base_dir: &Path,
) -> Result<UnitConfig> {
    if !UNIT_NAME.is_match(name) {
        return Err(ProcwatchError::ConfigError(format!(
            "invalid unit name '{name}': use letters, digits, '_', '-' or '.'"
        )));
    }
    if app.cmd.trim().is_empty() {
        return Err(ProcwatchError::ConfigError(format!(
            "[app.{name}].cmd must not be empty"
        )));
    }

    let stop_timeout = match &app.stop_timeout {
        Some(s) => duration_field(&format!("[app.{name}].stop_timeout"), s)?,
        None => settings.stop_timeout,
    };

    let cwd = app.cwd.as_ref().map(|cwd| base_dir.join(cwd));

    let spec = ProcessSpec {
        name: name.to_string(),
        cmd: app.cmd.clone(),
        args: app.args.to_vec(),
        cwd: cwd.clone(),
        env: app.env.clone(),
        autorestart: app.autorestart,
        max_restarts: (app.max_restarts > 0).then_some(app.max_restarts),
        stop_timeout,
        backoff: settings.backoff,
    };

    let watch = if app.watch {
        // Relative watch roots follow the unit's working directory.
        let root_base = cwd.unwrap_or_else(|| base_dir.to_path_buf());
        let roots: Vec<PathBuf> = if app.watch_paths.is_empty() {
            vec![root_base]
        } else {
            app.watch_paths.iter().map(|p| root_base.join(p)).collect()
        };

        let cfg = WatchConfig::new(roots, app.ignore_watch.clone(), app.follow_symlinks)?
            .with_debounce(settings.debounce);
        Some(cfg)
    } else {
        None
    };

    Ok(UnitConfig { spec, watch })
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| ProcwatchError::ConfigError(format!("invalid {field}: {e}")))
}
