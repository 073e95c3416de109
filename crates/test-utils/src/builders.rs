#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use procwatch::config::{AppConfig, ConfigFile, RawConfigFile};
use procwatch::supervisor::{BackoffPolicy, ProcessSpec};
use procwatch::types::ArgsField;

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
    base_dir: PathBuf,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
            base_dir: PathBuf::from("."),
        }
    }

    pub fn base_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.base_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_app(mut self, name: &str, app: AppConfig) -> Self {
        let value = app.to_value().expect("AppConfig serializes to a TOML table");
        self.config.app.insert(name.to_string(), value);
        self
    }

    pub fn stop_timeout(mut self, value: &str) -> Self {
        self.config.config.stop_timeout = value.to_string();
        self
    }

    pub fn debounce(mut self, value: &str) -> Self {
        self.config.config.debounce = value.to_string();
        self
    }

    pub fn control_socket(mut self, value: &str) -> Self {
        self.config.config.control_socket = value.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::from_raw(self.config, self.base_dir)
            .expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `AppConfig`.
pub struct AppConfigBuilder {
    app: AppConfig,
}

impl AppConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            app: AppConfig::new(cmd),
        }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.app.args = ArgsField::List(args.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn cwd(mut self, cwd: &str) -> Self {
        self.app.cwd = Some(cwd.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.app.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn watch(mut self, enabled: bool) -> Self {
        self.app.watch = enabled;
        self
    }

    pub fn watch_path(mut self, path: &str) -> Self {
        self.app.watch_paths.push(path.to_string());
        self
    }

    pub fn ignore(mut self, pattern: &str) -> Self {
        self.app.ignore_watch.push(pattern.to_string());
        self
    }

    pub fn autorestart(mut self, enabled: bool) -> Self {
        self.app.autorestart = enabled;
        self
    }

    pub fn max_restarts(mut self, n: u32) -> Self {
        self.app.max_restarts = n;
        self
    }

    pub fn stop_timeout(mut self, value: &str) -> Self {
        self.app.stop_timeout = Some(value.to_string());
        self
    }

    pub fn build(self) -> AppConfig {
        self.app
    }
}

/// Builder for `ProcessSpec`, for driving a supervisor directly.
pub struct ProcessSpecBuilder {
    spec: ProcessSpec,
}

impl ProcessSpecBuilder {
    pub fn new(name: &str, cmd: &str) -> Self {
        Self {
            spec: ProcessSpec::new(name, cmd, Vec::new()),
        }
    }

    /// `sh -c <script>`.
    pub fn shell(name: &str, script: &str) -> Self {
        Self {
            spec: ProcessSpec::new(name, "sh", vec!["-c".to_string(), script.to_string()]),
        }
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.spec.args = args.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.spec.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    pub fn autorestart(mut self, enabled: bool) -> Self {
        self.spec.autorestart = enabled;
        self
    }

    pub fn max_restarts(mut self, n: Option<u32>) -> Self {
        self.spec.max_restarts = n;
        self
    }

    pub fn stop_timeout(mut self, timeout: Duration) -> Self {
        self.spec.stop_timeout = timeout;
        self
    }

    /// Backoff with millisecond-scale delays so crash loops stay fast.
    pub fn fast_backoff(mut self, initial_ms: u64, max_ms: u64, reset_after_ms: u64) -> Self {
        self.spec.backoff = BackoffPolicy {
            initial: Duration::from_millis(initial_ms),
            max: Duration::from_millis(max_ms),
            multiplier: 2,
            reset_after: Duration::from_millis(reset_after_ms),
        };
        self
    }

    pub fn build(self) -> ProcessSpec {
        self.spec
    }
}
