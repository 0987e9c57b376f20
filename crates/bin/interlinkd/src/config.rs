//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `interlink.toml` in the working directory. Every field has a
//! default so the file is optional. Environment variables take precedence
//! over file values.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Module runtime tuning.
    pub runtime: RuntimeConfig,
    /// Where interaction definitions live.
    pub interactions: InteractionsConfig,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Runtime tuning.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Upper bound for a module's start / stop, in milliseconds.
    pub lifecycle_timeout_ms: u64,
    /// Telemetry broadcast buffer; slow subscribers lag past this.
    pub telemetry_capacity: usize,
}

/// Interaction definitions file.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct InteractionsConfig {
    /// TOML file holding `[[interactions]]` tables.
    pub path: PathBuf,
}

impl Config {
    /// Load configuration from `interlink.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if a
    /// value fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("interlink.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("INTERLINK_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("INTERLINK_LIFECYCLE_TIMEOUT_MS")
            && let Ok(millis) = val.parse()
        {
            self.runtime.lifecycle_timeout_ms = millis;
        }
        if let Ok(val) = std::env::var("INTERLINK_INTERACTIONS") {
            self.interactions.path = PathBuf::from(val);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.runtime.lifecycle_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "lifecycle_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.runtime.telemetry_capacity == 0 {
            return Err(ConfigError::Validation(
                "telemetry_capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn lifecycle_timeout(&self) -> Duration {
        Duration::from_millis(self.runtime.lifecycle_timeout_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "interlinkd=info,interlink=info".to_string(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lifecycle_timeout_ms: 5000,
            telemetry_capacity: 256,
        }
    }
}

impl Default for InteractionsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("interactions.toml"),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.runtime.lifecycle_timeout_ms, 5000);
        assert_eq!(config.runtime.telemetry_capacity, 256);
        assert_eq!(config.interactions.path, PathBuf::from("interactions.toml"));
        assert_eq!(config.lifecycle_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.runtime.telemetry_capacity, 256);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [logging]
            filter = 'debug'

            [runtime]
            lifecycle_timeout_ms = 250
            telemetry_capacity = 8

            [interactions]
            path = '/etc/interlink/hall.toml'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.lifecycle_timeout(), Duration::from_millis(250));
        assert_eq!(config.runtime.telemetry_capacity, 8);
        assert_eq!(
            config.interactions.path,
            PathBuf::from("/etc/interlink/hall.toml")
        );
    }

    #[test]
    fn should_parse_partial_toml_with_defaults() {
        let toml = "
            [runtime]
            telemetry_capacity = 32
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.runtime.telemetry_capacity, 32);
        assert_eq!(config.runtime.lifecycle_timeout_ms, 5000);
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.runtime.lifecycle_timeout_ms, 5000);
    }

    #[test]
    fn should_reject_zero_timeout() {
        let mut config = Config::default();
        config.runtime.lifecycle_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn should_reject_zero_telemetry_capacity() {
        let mut config = Config::default();
        config.runtime.telemetry_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }
}
