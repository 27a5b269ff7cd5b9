//! Configuration module for har-relay
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`HAR_RELAY_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! The middleware itself never reads ambient process state: the builders in
//! [`crate::middleware`] and [`crate::login`] take a [`TelemetryConfig`] or
//! [`CompanionConfig`] explicitly.
//!
//! # Example
//!
//! ```rust
//! use har_relay::config::RelayConfig;
//!
//! let config = RelayConfig::default();
//! assert_eq!(config.telemetry.buffer_length, 1);
//!
//! let toml = r#"
//! [telemetry]
//! buffer_length = 10
//! "#;
//! let config: RelayConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.telemetry.buffer_length, 10);
//! ```

pub mod companion;
pub mod error;
pub mod logging;
pub mod server;
pub mod telemetry;

pub use companion::CompanionConfig;
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use server::ServerConfig;
pub use telemetry::TelemetryConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified configuration for the relay and its demo server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// API key used for both the telemetry and companion endpoints.
    /// Usually supplied through `HAR_RELAY_API_KEY` rather than the file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Demo HTTP server
    pub server: ServerConfig,
    /// Telemetry endpoint and batching
    pub telemetry: TelemetryConfig,
    /// Login redirect flow
    pub companion: CompanionConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl RelayConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Invalid values are silently ignored (the previous value is kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var("HAR_RELAY_API_KEY") {
            if !key.trim().is_empty() {
                self.api_key = Some(key);
            }
        }

        if let Ok(port) = std::env::var("HAR_RELAY_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(host) = std::env::var("HAR_RELAY_HOST") {
            self.server.host = host;
        }

        if let Ok(host) = std::env::var("HAR_RELAY_METRICS_HOST") {
            self.telemetry.host = host;
        }
        if let Ok(len) = std::env::var("HAR_RELAY_BUFFER_LENGTH") {
            if let Ok(n) = len.parse() {
                self.telemetry.buffer_length = n;
            }
        }
        if let Ok(url) = std::env::var("HAR_RELAY_COMPANION_URL") {
            self.companion.base_url = url;
        }

        if let Ok(level) = std::env::var("HAR_RELAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("HAR_RELAY_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation {
                field: "server.port".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }

        validate_base_url("telemetry.host", &self.telemetry.host)?;
        validate_base_url("companion.base_url", &self.companion.base_url)?;

        if self.telemetry.timeout_seconds == 0 {
            return Err(ConfigError::Validation {
                field: "telemetry.timeout_seconds".to_string(),
                message: "timeout must be non-zero".to_string(),
            });
        }
        if self.companion.timeout_seconds == 0 {
            return Err(ConfigError::Validation {
                field: "companion.timeout_seconds".to_string(),
                message: "timeout must be non-zero".to_string(),
            });
        }

        Ok(())
    }
}

fn validate_base_url(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: field.to_string(),
            message: "URL cannot be empty".to_string(),
        });
    }
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(ConfigError::Validation {
            field: field.to_string(),
            message: format!("'{}' must start with http:// or https://", value),
        });
    }
    Ok(())
}
