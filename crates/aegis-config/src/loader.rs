//! Layered configuration loader.
//!
//! Later layers override earlier ones:
//!
//! 1. built-in defaults
//! 2. a TOML or JSON file, or a string
//! 3. `PREFIX__SECTION__KEY` environment variables

use crate::{AegisConfig, ConfigError, LogTarget};
use std::env;
use std::fs;
use std::path::Path;

/// Builds an [`AegisConfig`] from defaults, files and the environment.
///
/// ```no_run
/// use aegis_config::ConfigLoader;
///
/// # fn main() -> Result<(), aegis_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_dotenv()
///     .with_optional_file("aegis.toml")?
///     .with_env_prefix("AEGIS")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config: AegisConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Creates a loader holding the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configuration with the contents of a `.toml` or `.json`
    /// file.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        self.config = parse(&content, &format).map_err(|e| match e {
            ConfigError::UnsupportedFormat(_) => {
                ConfigError::UnsupportedFormat(path.display().to_string())
            }
            other => other,
        })?;
        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is skipped.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Replaces the configuration with `content` in `format` (`toml` or
    /// `json`).
    ///
    /// ```
    /// use aegis_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[server]\nport = 9000", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.server.port, 9000);
    /// assert_eq!(config.server.host, "0.0.0.0");
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = parse(content, &format.to_lowercase())?;
        Ok(self)
    }

    /// Applies `PREFIX__SECTION__KEY` environment variables on load.
    ///
    /// For example, with prefix `AEGIS`:
    ///
    /// - `AEGIS__SERVER__PORT=9000`
    /// - `AEGIS__LOGGING__FORMAT=json`
    /// - `AEGIS__METRICS__ENDPOINTS=statsd-a:8125,statsd-b:8125`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Loads variables from a `.env` file in the working directory, if any.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        let _ = dotenvy::dotenv();
        self
    }

    /// Applies environment overrides and validates.
    pub fn load(mut self) -> Result<AegisConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix, env::vars())?;
        }
        self.config.validate()?;
        Ok(self.config)
    }

    /// Returns the configuration without environment overrides or
    /// validation.
    #[must_use]
    pub fn load_unvalidated(self) -> AegisConfig {
        self.config
    }

    fn apply_env_overrides(
        &mut self,
        prefix: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<(), ConfigError> {
        let marker = format!("{prefix}__");
        for (key, value) in vars {
            if let Some(path) = key.strip_prefix(&marker) {
                let path = path.to_string();
                self.apply_env_var(&key, &path, &value)?;
            }
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, path: &str, value: &str) -> Result<(), ConfigError> {
        let parts: Vec<&str> = path.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["SERVER", "HOST"] => config.server.host = value.to_string(),
            ["SERVER", "PORT"] => {
                config.server.port = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected port number"))?;
            }
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))?;
            }

            ["LOGGING", "TARGET"] => config.logging.target = LogTarget::from(value.to_string()),
            ["LOGGING", "FORMAT"] => {
                config.logging.format = value
                    .parse()
                    .map_err(|_| ConfigError::env_parse_error(key, "expected 'logfmt' or 'json'"))?;
            }
            ["LOGGING", "HIDE_TIMESTAMP"] => config.logging.hide_timestamp = bool_var(key, value)?,
            ["LOGGING", "REQUEST_LOG"] => config.logging.request_log = bool_var(key, value)?,
            ["LOGGING", "DIAGNOSTICS_LEVEL"] => {
                config.logging.diagnostics_level = value.to_string();
            }
            ["LOGGING", "DIAGNOSTICS_JSON"] => {
                config.logging.diagnostics_json = bool_var(key, value)?;
            }

            ["AUTH", "USER"] => config.auth.user = optional(value),
            ["AUTH", "PASSWORD"] => config.auth.password = optional(value),

            ["METRICS", "ENDPOINTS"] => {
                config.metrics.endpoints = value
                    .split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            ["METRICS", "NAMESPACE"] => config.metrics.namespace = value.to_string(),
            ["METRICS", "PREFIX"] => config.metrics.prefix = optional(value),
            ["METRICS", "DOGSTATSD"] => config.metrics.dogstatsd = bool_var(key, value)?,
            ["METRICS", "PROMETHEUS"] => config.metrics.prometheus = bool_var(key, value)?,

            ["MONITOR", "DSN"] => config.monitor.dsn = optional(value),
            ["MONITOR", "LOG"] => config.monitor.log = bool_var(key, value)?,

            ["EVENTS", "URL"] => config.events.url = optional(value),
            ["EVENTS", "LOG"] => config.events.log = bool_var(key, value)?,

            _ => {}
        }

        Ok(())
    }
}

fn parse(content: &str, format: &str) -> Result<AegisConfig, ConfigError> {
    match format {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

fn optional(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn bool_var(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::env_parse_error(key, "expected boolean")),
    }
}
