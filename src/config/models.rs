//! Configuration data structures for the `keel` binary.
//!
//! These types map directly to YAML (also JSON / TOML / INI) configuration files. They are
//! serde-friendly and carry defaults so that minimal configs stay short.
use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Logging subscriber settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `keel=debug,tower_http=info`
    pub level: String,
    /// Emit JSON lines instead of pretty console output
    pub json: bool,
    /// Attach span context to JSON lines
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            include_spans: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Deadline for routing and handling one request, in humantime format (`"30s"`).
    #[serde(default)]
    pub request_timeout: Option<String>,
    /// Explicit module configuration values, keyed by parameter name.
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
}

impl ServerConfig {
    /// Create a new server configuration builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Parsed request deadline, if configured.
    pub fn request_timeout(&self) -> eyre::Result<Option<Duration>> {
        self.request_timeout
            .as_deref()
            .map(|raw| {
                humantime::parse_duration(raw)
                    .map_err(|e| eyre::eyre!("Invalid request_timeout '{}': {}", raw, e))
            })
            .transpose()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            logging: LoggingConfig::default(),
            request_timeout: None,
            parameters: HashMap::new(),
        }
    }
}

/// Builder for ServerConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn logging(mut self, logging: LoggingConfig) -> Self {
        self.config.logging = logging;
        self
    }

    /// Set the request deadline (humantime format)
    pub fn request_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.config.request_timeout = Some(timeout.into());
        self
    }

    /// Provide an explicit module configuration value
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.parameters.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}
