//! Configuration management for the game host.
//!
//! Loads the TOML configuration file, applies command-line overrides and
//! validates the result before anything is started.

use crate::cli::CliArgs;
use serde::{Deserialize, Serialize};
use server_engine::{ConfigError, EngineConfig, ExecutorKind, Millis};
use std::path::Path;
use tracing::info;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn default_world_frame_rate() -> Millis {
    50
}

fn default_heartbeat_frame_rate() -> Millis {
    1000
}

fn default_heartbeat_enabled() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Engine, processor and executor settings
    #[serde(default)]
    pub engine: EngineConfig,
    /// Settings for the services this host runs
    #[serde(default)]
    pub services: ServiceSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Frame rates and switches for the hosted services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default = "default_world_frame_rate")]
    pub world_frame_rate_ms: Millis,
    #[serde(default = "default_heartbeat_frame_rate")]
    pub heartbeat_frame_rate_ms: Millis,
    #[serde(default = "default_heartbeat_enabled")]
    pub heartbeat_enabled: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            world_frame_rate_ms: default_world_frame_rate(),
            heartbeat_frame_rate_ms: default_heartbeat_frame_rate(),
            heartbeat_enabled: default_heartbeat_enabled(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration to `path`
    /// and returns it.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("📝 Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Applies command-line overrides on top of the loaded file.
    pub fn apply_overrides(&mut self, args: &CliArgs) -> Result<(), ConfigError> {
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.json_logs {
            self.logging.json_format = true;
        }
        if let Some(workers) = args.workers {
            self.engine.executor.worker_count = workers;
        }
        if let Some(kind) = &args.executor {
            self.engine.executor.kind = kind.parse::<ExecutorKind>()?;
        }
        Ok(())
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        self.engine.validate().map_err(|e| e.to_string())?;

        if self.services.world_frame_rate_ms <= 0 {
            return Err(format!(
                "World frame rate must be greater than 0ms, got {}",
                self.services.world_frame_rate_ms
            ));
        }
        if self.services.heartbeat_enabled && self.services.heartbeat_frame_rate_ms <= 0 {
            return Err(format!(
                "Heartbeat frame rate must be greater than 0ms, got {}",
                self.services.heartbeat_frame_rate_ms
            ));
        }

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {VALID_LOG_LEVELS:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::{NamedTempFile, TempDir};
    use tokio::fs;

    fn args() -> CliArgs {
        CliArgs {
            config_path: PathBuf::from("config.toml"),
            log_level: None,
            json_logs: false,
            workers: None,
            executor: None,
        }
    }

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.engine.tick_interval_ms, 50);
        assert_eq!(config.engine.mailbox_drain_cap, 1000);
        assert_eq!(config.services.world_frame_rate_ms, 50);
        assert_eq!(config.services.heartbeat_frame_rate_ms, 1000);
        assert!(config.services.heartbeat_enabled);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file_writes_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());

        // The written file loads back to the same configuration.
        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded, config);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[engine]
tick_interval_ms = 20
default_frame_rate_ms = 40
mailbox_drain_cap = 64
clock_offset_ms = -3600000

[engine.executor]
kind = "fixed_service"
worker_count = 3

[services]
world_frame_rate_ms = 25
heartbeat_enabled = false

[logging]
level = "debug"
json_format = true
"#;

        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.engine.tick_interval_ms, 20);
        assert_eq!(config.engine.default_frame_rate_ms, 40);
        assert_eq!(config.engine.mailbox_drain_cap, 64);
        assert_eq!(config.engine.clock_offset_ms, -3_600_000);
        assert_eq!(config.engine.executor.kind, ExecutorKind::FixedService);
        assert_eq!(config.engine.executor.worker_count, 3);
        assert_eq!(config.services.world_frame_rate_ms, 25);
        assert_eq!(config.services.heartbeat_frame_rate_ms, 1000);
        assert!(!config.services.heartbeat_enabled);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let temp_file = NamedTempFile::new().unwrap();
        fs::write(temp_file.path(), "[engine\ntick_interval_ms = ")
            .await
            .unwrap();
        assert!(AppConfig::load_from_file(temp_file.path()).await.is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = AppConfig::default();
        let overrides = CliArgs {
            log_level: Some("trace".to_string()),
            json_logs: true,
            workers: Some(6),
            executor: Some("fixed_service".to_string()),
            ..args()
        };

        config.apply_overrides(&overrides).unwrap();
        assert_eq!(config.logging.level, "trace");
        assert!(config.logging.json_format);
        assert_eq!(config.engine.executor.worker_count, 6);
        assert_eq!(config.engine.executor.kind, ExecutorKind::FixedService);
    }

    #[test]
    fn test_unknown_executor_override() {
        let mut config = AppConfig::default();
        let overrides = CliArgs {
            executor: Some("work_stealing".to_string()),
            ..args()
        };
        assert_eq!(
            config.apply_overrides(&overrides),
            Err(ConfigError::UnknownExecutorKind("work_stealing".to_string()))
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.engine.executor.worker_count = 0;
        assert!(config.validate().unwrap_err().contains("worker count"));

        let mut config = AppConfig::default();
        config.engine.tick_interval_ms = 0;
        assert!(config.validate().unwrap_err().contains("tick interval"));

        let mut config = AppConfig::default();
        config.services.world_frame_rate_ms = 0;
        assert!(config.validate().unwrap_err().contains("World frame rate"));

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().unwrap_err().contains("Invalid log level"));
    }

    #[test]
    fn test_disabled_heartbeat_ignores_its_frame_rate() {
        let mut config = AppConfig::default();
        config.services.heartbeat_enabled = false;
        config.services.heartbeat_frame_rate_ms = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_valid_log_levels() {
        for level in VALID_LOG_LEVELS {
            let mut config = AppConfig::default();
            config.logging.level = level.to_string();
            assert!(config.validate().is_ok(), "Level '{level}' should be valid");
        }
    }
}
