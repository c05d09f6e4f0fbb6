//! Typed configuration for Aegis services.
//!
//! Configuration is layered: defaults, then an optional TOML or JSON file,
//! then environment variables. Unknown fields are rejected and the result is
//! validated before use. [`Components`] turns a loaded [`AegisConfig`] into the
//! logger, metrics recorder, monitor and event sink a service runs with.
//!
//! # Example
//!
//! ```no_run
//! use aegis_config::{Components, ConfigLoader};
//!
//! # fn main() -> Result<(), aegis_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_dotenv()
//!     .with_optional_file("aegis.toml")?
//!     .with_env_prefix("AEGIS")
//!     .load()?;
//!
//! let components = Components::from_config(&config)?;
//! let deps = components.dependencies();
//! # let _ = deps;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//! shutdown_timeout_secs = 30
//!
//! [logging]
//! target = "stdout"        # "stderr" or a file path
//! format = "logfmt"        # or "json"
//! hide_timestamp = false
//! request_log = false      # log request start and end
//!
//! [auth]
//! user = "admin"
//! password = "secret"
//!
//! [metrics]
//! endpoints = ["127.0.0.1:8125"]
//! namespace = "myservice"
//! dogstatsd = true
//! prometheus = false
//!
//! [monitor]
//! dsn = "https://key@sentry.example.com/42"
//!
//! [events]
//! url = "https://events.example.com/ingest"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values are overridden with `PREFIX__SECTION__KEY`:
//!
//! - `AEGIS__SERVER__PORT=9000`
//! - `AEGIS__LOGGING__FORMAT=json`
//! - `AEGIS__METRICS__ENDPOINTS=10.0.0.1:8125,10.0.0.2:8125`
//! - `AEGIS__AUTH__PASSWORD=secret`

#![warn(missing_docs)]

mod components;
mod config;
mod error;
mod loader;
mod schema;

pub use components::Components;
pub use config::AegisConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{
    AuthSection, EventsSection, LogTarget, LoggingSection, MetricsSection, MonitorSection,
    ServerSection,
};
