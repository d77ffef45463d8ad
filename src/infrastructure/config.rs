//! Hierarchical configuration loading: defaults -> project YAML -> local
//! YAML override -> environment variables (highest precedence).

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::AppConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid database max_connections: {0}, must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("database path cannot be empty")]
    EmptyDatabasePath,

    #[error("invalid log level: {0}, must be one of trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("invalid budget.warning_threshold: {0}, must be in (0, 1]")]
    InvalidWarningThreshold(f64),

    #[error("invalid rate_limit.buffer_factor: {0}, must be in (0, 1]")]
    InvalidBufferFactor(f64),

    #[error("invalid cooling.reset_every_n: {0}, must be at least 1")]
    InvalidResetEveryN(u32),

    #[error("failed to extract configuration: {0}")]
    Extraction(#[from] figment::Error),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from `./taskforge.yaml`, `./taskforge.local.yaml`, then
    /// `TASKFORGE_*` environment variables (double-underscore nesting).
    pub fn load() -> Result<AppConfig, ConfigError> {
        let config: AppConfig = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::file("taskforge.yaml"))
            .merge(Yaml::file("taskforge.local.yaml"))
            .merge(Env::prefixed("TASKFORGE_").split("__"))
            .extract()?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<AppConfig, ConfigError> {
        let config: AppConfig = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &AppConfig) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        if config.budget.warning_threshold <= 0.0 || config.budget.warning_threshold > 1.0 {
            return Err(ConfigError::InvalidWarningThreshold(config.budget.warning_threshold));
        }

        if config.rate_limit.buffer_factor <= 0.0 || config.rate_limit.buffer_factor > 1.0 {
            return Err(ConfigError::InvalidBufferFactor(config.rate_limit.buffer_factor));
        }

        if config.cooling.reset_every_n == 0 {
            return Err(ConfigError::InvalidResetEveryN(config.cooling.reset_every_n));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        ConfigLoader::validate(&config).expect("default config should validate");
    }

    #[test]
    fn rejects_invalid_log_level() {
        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        let err = ConfigLoader::validate(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLogLevel(level) if level == "verbose"));
    }

    #[test]
    fn rejects_zero_max_connections() {
        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxConnections(0))
        ));
    }

    #[test]
    fn rejects_out_of_range_warning_threshold() {
        let mut config = AppConfig::default();
        config.budget.warning_threshold = 1.5;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidWarningThreshold(_))
        ));
    }

    #[test]
    fn yaml_override_wins_over_defaults() {
        let yaml = "database:\n  path: /tmp/custom.db\n  max_connections: 3\n  busy_timeout_ms: 1000\nlogging:\n  level: debug\n  format: pretty\n";
        let config: AppConfig = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::string(yaml))
            .extract()
            .unwrap();
        assert_eq!(config.database.path, "/tmp/custom.db");
        assert_eq!(config.database.max_connections, 3);
        assert_eq!(config.logging.level, "debug");
    }
}
