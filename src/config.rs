//! Configuration management for camstream
//!
//! Session behavior flags, stream constraints, lifecycle timing and the
//! location of the persisted device selection. Loaded from an optional TOML
//! file layered under `CAMSTREAM_*` environment overrides (nested keys use
//! `__`, e.g. `CAMSTREAM_TIMING__SETTLE_DELAY_MS=250`).

use crate::errors::CameraError;
use crate::types::StreamConstraints;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PREFIX: &str = "CAMSTREAM";

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Select a device and start streaming as soon as a sink is attached
    pub auto_start: bool,
    /// Stop while hidden, restart when visible again
    pub auto_pause: bool,
    /// Prefer the persisted last selected device on auto-select
    pub use_last_device_id: bool,
    pub constraints: StreamConstraints,
    pub timing: TimingConfig,
    pub storage: StorageConfig,
}

/// Fixed lifecycle delays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Interval between sink readiness polls while starting
    pub ready_poll_interval_ms: u64,
    /// Delay after readiness before capabilities are read
    pub settle_delay_ms: u64,
    /// Interval between device scans of the device monitor
    pub device_poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON file holding the last selected device id; in-memory when unset
    pub last_device_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            auto_pause: false,
            use_last_device_id: true,
            constraints: StreamConstraints::default(),
            timing: TimingConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ready_poll_interval_ms: 750,
            settle_delay_ms: 500,
            device_poll_interval_ms: 2000,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file with environment overrides.
    ///
    /// A missing file is not an error; defaults fill whatever neither the
    /// file nor the environment set.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        Self::load_layered(path.as_ref(), None)
    }

    /// Like [`load_from_file`](Self::load_from_file) with an explicit
    /// environment instead of the process one
    pub fn load_with_env<P: AsRef<Path>>(
        path: P,
        env: HashMap<String, String>,
    ) -> Result<Self, CameraError> {
        Self::load_layered(path.as_ref(), Some(env))
    }

    fn load_layered(path: &Path, env: Option<HashMap<String, String>>) -> Result<Self, CameraError> {
        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
        }

        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .map_err(|e| CameraError::ConfigError(format!("Failed to read config: {}", e)))?;

        let config: SessionConfig = settings
            .try_deserialize()
            .map_err(|e| CameraError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;

        log::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            CameraError::ConfigError(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string).map_err(|e| {
            CameraError::ConfigError(format!("Failed to write config file: {}", e))
        })?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("camstream.toml")
    }

    /// Load from default location, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), CameraError> {
        let invalid = |msg: &str| Err(CameraError::ConfigError(msg.to_string()));

        if self.timing.ready_poll_interval_ms == 0 {
            return invalid("Ready poll interval must be greater than zero");
        }
        if self.timing.device_poll_interval_ms == 0 {
            return invalid("Device poll interval must be greater than zero");
        }
        if self.timing.settle_delay_ms > 60_000 {
            return invalid("Settle delay must be at most 60000 ms");
        }

        if !self.constraints.video {
            return invalid("Video must be enabled in the stream constraints");
        }
        for (name, value) in [
            ("width", self.constraints.width),
            ("height", self.constraints.height),
        ] {
            if let Some(value) = value {
                if value == 0 || value > 8192 {
                    return Err(CameraError::ConfigError(format!(
                        "Constraint {} must be between 1 and 8192",
                        name
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Facing;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert!(config.auto_start);
        assert!(!config.auto_pause);
        assert!(config.use_last_device_id);
        assert!(config.constraints.video);
        assert!(!config.constraints.audio);
        assert_eq!(config.constraints.facing, None);
        assert_eq!(config.timing.ready_poll_interval_ms, 750);
        assert_eq!(config.timing.settle_delay_ms, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SessionConfig::default();
        config.timing.ready_poll_interval_ms = 0;
        assert!(matches!(config.validate(), Err(CameraError::ConfigError(_))));

        let mut config = SessionConfig::default();
        config.constraints.width = Some(0);
        assert!(config.validate().is_err());

        let mut config = SessionConfig::default();
        config.constraints.video = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("camstream.toml");

        let mut config = SessionConfig::default();
        config.auto_pause = true;
        config.constraints.facing = Some(Facing::Back);
        config.storage.last_device_path = Some(dir.path().join("last.json"));
        config.save_to_file(&path).unwrap();

        let loaded = SessionConfig::load_with_env(&path, HashMap::new()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("camstream.toml");
        fs::write(&path, "auto_start = false\n\n[timing]\nsettle_delay_ms = 100\n").unwrap();

        let config = SessionConfig::load_with_env(&path, HashMap::new()).unwrap();
        assert!(!config.auto_start);
        assert!(config.use_last_device_id);
        assert_eq!(config.timing.settle_delay_ms, 100);
        assert_eq!(config.timing.ready_poll_interval_ms, 750);
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("camstream.toml");
        fs::write(&path, "auto_pause = false\n").unwrap();

        let env = HashMap::from([
            ("CAMSTREAM_AUTO_PAUSE".to_string(), "true".to_string()),
            (
                "CAMSTREAM_TIMING__READY_POLL_INTERVAL_MS".to_string(),
                "100".to_string(),
            ),
        ]);
        let config = SessionConfig::load_with_env(&path, env).unwrap();
        assert!(config.auto_pause);
        assert_eq!(config.timing.ready_poll_interval_ms, 100);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("camstream.toml");
        fs::write(&path, "[timing]\nready_poll_interval_ms = 0\n").unwrap();

        let result = SessionConfig::load_with_env(&path, HashMap::new());
        assert!(matches!(result, Err(CameraError::ConfigError(_))));
    }

    #[test]
    fn test_config_toml_format() {
        let toml_string = toml::to_string_pretty(&SessionConfig::default()).unwrap();
        assert!(toml_string.contains("auto_start = true"));
        assert!(toml_string.contains("[constraints]"));
        assert!(toml_string.contains("[timing]"));
        assert!(toml_string.contains("settle_delay_ms = 500"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = SessionConfig::load_with_env("nonexistent_file.toml", HashMap::new());
        assert_eq!(result.unwrap(), SessionConfig::default());
    }
}
