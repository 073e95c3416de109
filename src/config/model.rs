// src/config/model.rs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::supervisor::backoff::BackoffPolicy;
use crate::supervisor::spec::ProcessSpec;
use crate::types::ArgsField;
use crate::watch::WatchConfig;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// stop_timeout = "5s"
/// debounce = "300ms"
///
/// [app.hbp]
/// cmd = "cargo"
/// args = ["run", "--release"]
/// watch = true
/// ignore_watch = ["target"]
/// ```
///
/// This is the unvalidated form; see [`ConfigFile`] for the checked one.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    /// Global behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// All units from `[app.<name>]`, keyed by unit name.
    ///
    /// Kept as raw TOML so that a malformed unit is rejected on its own
    /// instead of failing the whole file; see [`AppConfig::from_value`].
    #[serde(default)]
    pub app: BTreeMap<String, toml::Value>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Default graceful-stop timeout before escalating to a kill.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout: String,

    /// Debounce window for file watching.
    #[serde(default = "default_debounce")]
    pub debounce: String,

    /// Control socket path, relative to the config file's directory.
    #[serde(default = "default_control_socket")]
    pub control_socket: String,

    #[serde(default)]
    pub backoff: BackoffSection,
}

fn default_stop_timeout() -> String {
    "5s".to_string()
}

fn default_debounce() -> String {
    "300ms".to_string()
}

fn default_control_socket() -> String {
    ".procwatch.sock".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            stop_timeout: default_stop_timeout(),
            debounce: default_debounce(),
            control_socket: default_control_socket(),
            backoff: BackoffSection::default(),
        }
    }
}

/// `[config.backoff]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffSection {
    #[serde(default = "default_backoff_initial")]
    pub initial: String,
    #[serde(default = "default_backoff_max")]
    pub max: String,
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: u32,
    /// Uptime after which the consecutive-crash counter resets.
    #[serde(default = "default_backoff_reset_after")]
    pub reset_after: String,
}

fn default_backoff_initial() -> String {
    "1s".to_string()
}

fn default_backoff_max() -> String {
    "30s".to_string()
}

fn default_backoff_multiplier() -> u32 {
    2
}

fn default_backoff_reset_after() -> String {
    "60s".to_string()
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self {
            initial: default_backoff_initial(),
            max: default_backoff_max(),
            multiplier: default_backoff_multiplier(),
            reset_after: default_backoff_reset_after(),
        }
    }
}

/// `[app.<name>]` section: one managed unit.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Program to run. `script` is accepted as an alias.
    #[serde(alias = "script")]
    pub cmd: String,

    #[serde(default)]
    pub args: ArgsField,

    /// Working directory, relative to the config file's directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Restart the unit when watched files change.
    #[serde(default)]
    pub watch: bool,

    /// Roots to watch; defaults to the unit's working directory.
    #[serde(default)]
    pub watch_paths: Vec<String>,

    /// Globs (relative to a watch root) that never trigger a restart.
    #[serde(default)]
    pub ignore_watch: Vec<String>,

    #[serde(default)]
    pub follow_symlinks: bool,

    #[serde(default = "default_autorestart")]
    pub autorestart: bool,

    /// Consecutive crashes before giving up; `0` means never give up.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Overrides `[config].stop_timeout` for this unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_timeout: Option<String>,
}

fn default_autorestart() -> bool {
    true
}

fn default_max_restarts() -> u32 {
    crate::supervisor::spec::DEFAULT_MAX_RESTARTS
}

impl AppConfig {
    /// Deserialize one `[app.<name>]` table.
    pub fn from_value(value: toml::Value) -> Result<Self, toml::de::Error> {
        value.try_into()
    }

    /// The TOML table this app would be read from.
    pub fn to_value(&self) -> Result<toml::Value, toml::ser::Error> {
        toml::Value::try_from(self)
    }

    /// An app with every optional field at its default.
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            args: ArgsField::default(),
            cwd: None,
            env: BTreeMap::new(),
            watch: false,
            watch_paths: Vec::new(),
            ignore_watch: Vec::new(),
            follow_symlinks: false,
            autorestart: default_autorestart(),
            max_restarts: default_max_restarts(),
            stop_timeout: None,
        }
    }
}

/// Global settings after validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub stop_timeout: Duration,
    pub debounce: Duration,
    pub control_socket: PathBuf,
    pub backoff: BackoffPolicy,
}

/// One validated unit: how to run it and, optionally, what to watch.
#[derive(Debug, Clone)]
pub struct UnitConfig {
    pub spec: ProcessSpec,
    /// `None` when `watch = false`.
    pub watch: Option<WatchConfig>,
}

/// Validated configuration.
///
/// Units whose own section is invalid are kept out of `units` and listed in
/// `rejected`, so one bad unit does not take the others down.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    base_dir: PathBuf,
    settings: Settings,
    units: Vec<UnitConfig>,
    rejected: BTreeMap<String, String>,
}

impl ConfigFile {
    /// Construct a validated config without running validation.
    pub(crate) fn new_unchecked(
        base_dir: PathBuf,
        settings: Settings,
        units: Vec<UnitConfig>,
        rejected: BTreeMap<String, String>,
    ) -> Self {
        Self {
            base_dir,
            settings,
            units,
            rejected,
        }
    }

    /// Directory relative paths in the config were resolved against.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn units(&self) -> &[UnitConfig] {
        &self.units
    }

    pub fn unit(&self, name: &str) -> Option<&UnitConfig> {
        self.units.iter().find(|u| u.spec.name == name)
    }

    /// Units that failed validation, with the reason.
    pub fn rejected(&self) -> &BTreeMap<String, String> {
        &self.rejected
    }
}
