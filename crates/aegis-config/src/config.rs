//! Root configuration type.

use crate::schema::{
    AuthSection, EventsSection, LoggingSection, MetricsSection, MonitorSection, ServerSection,
};
use crate::ConfigError;
use aegis_telemetry::Dsn;
use serde::{Deserialize, Serialize};

/// Complete configuration of an Aegis service.
///
/// ```
/// use aegis_config::AegisConfig;
///
/// let config = AegisConfig::default();
/// assert_eq!(config.server.port, 8080);
/// assert!(config.auth.credentials().is_none());
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AegisConfig {
    /// Listen address and shutdown behavior.
    #[serde(default)]
    pub server: ServerSection,

    /// Application logging and diagnostics.
    #[serde(default)]
    pub logging: LoggingSection,

    /// Optional basic authentication.
    #[serde(default)]
    pub auth: AuthSection,

    /// Metrics sinks.
    #[serde(default)]
    pub metrics: MetricsSection,

    /// Crash reporting.
    #[serde(default)]
    pub monitor: MonitorSection,

    /// Event delivery.
    #[serde(default)]
    pub events: EventsSection,
}

impl AegisConfig {
    /// Checks values that parse but cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::invalid_value("server.port", "must be non-zero"));
        }

        if self.server.host.trim().is_empty() {
            return Err(ConfigError::invalid_value("server.host", "must not be empty"));
        }

        if self.auth.user.is_some() != self.auth.password.is_some() {
            return Err(ConfigError::invalid_value(
                "auth",
                "user and password must be set together",
            ));
        }

        if let Some(endpoint) = self.metrics.endpoints.iter().find(|e| !e.contains(':')) {
            return Err(ConfigError::invalid_value(
                "metrics.endpoints",
                format!("expected host:port, got '{endpoint}'"),
            ));
        }

        if let Some(dsn) = &self.monitor.dsn {
            if Dsn::parse(dsn).is_none() {
                return Err(ConfigError::invalid_value("monitor.dsn", "malformed DSN"));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_port_is_rejected() {
        let mut config = AegisConfig::default();
        config.server.port = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.port"));
    }

    #[test]
    fn test_half_configured_auth_is_rejected() {
        let mut config = AegisConfig::default();
        config.auth.password = Some("secret".to_string());
        assert!(config.validate().is_err());

        config.auth.user = Some("admin".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_dsn_is_rejected() {
        let mut config = AegisConfig::default();
        config.monitor.dsn = Some("not a dsn".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("monitor.dsn"));
    }

    #[test]
    fn test_endpoint_without_port_is_rejected() {
        let mut config = AegisConfig::default();
        config.metrics.endpoints = vec!["statsd.local".to_string()];
        assert!(config.validate().is_err());
    }
}
