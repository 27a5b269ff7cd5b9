//! Telemetry endpoint configuration

use serde::{Deserialize, Serialize};

/// Where captured batches are shipped and how large a batch gets.
///
/// # Example
///
/// ```toml
/// [telemetry]
/// host = "https://metrics.readme.io"
/// path = "/v1/request"
/// timeout_seconds = 10
/// buffer_length = 1
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Scheme and authority of the telemetry service.
    pub host: String,

    /// Path that accepts `POST`ed batches.
    pub path: String,

    /// Transport timeout for a single batch upload.
    ///
    /// Default: 10 seconds
    pub timeout_seconds: u64,

    /// Number of records buffered before a batch is sent.
    ///
    /// Default: 1 (every captured request is sent on its own).
    /// A value of 0 behaves like 1.
    pub buffer_length: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            host: "https://metrics.readme.io".to_string(),
            path: "/v1/request".to_string(),
            timeout_seconds: 10,
            buffer_length: 1,
        }
    }
}

impl TelemetryConfig {
    /// Full URL batches are posted to.
    pub fn endpoint(&self) -> String {
        join_url(&self.host, &self.path)
    }
}

/// Join a base URL and a path without doubling or dropping the slash.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.endpoint(), "https://metrics.readme.io/v1/request");
        assert_eq!(config.buffer_length, 1);
        assert_eq!(config.timeout_seconds, 10);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = TelemetryConfig {
            host: "http://127.0.0.1:9000/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.endpoint(), "http://127.0.0.1:9000/v1/request");
    }

    #[test]
    fn test_join_url_relative_path() {
        assert_eq!(join_url("http://a", "b/c"), "http://a/b/c");
        assert_eq!(join_url("http://a/", ""), "http://a");
    }
}
