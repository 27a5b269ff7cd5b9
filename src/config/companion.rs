//! Companion dashboard API configuration

use super::telemetry::join_url;
use serde::{Deserialize, Serialize};

/// Settings for the login redirect flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    /// Base URL of the companion API.
    pub base_url: String,

    /// Path that returns `{ jwtSecret, baseUrl }` for the API key.
    pub path: String,

    /// Transport timeout for the session lookup.
    pub timeout_seconds: u64,

    /// Where users without a session are sent.
    pub login_url: String,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            base_url: "https://dash.readme.io".to_string(),
            path: "/api/v1/".to_string(),
            timeout_seconds: 10,
            login_url: "/login".to_string(),
        }
    }
}

impl CompanionConfig {
    /// Full URL of the session lookup.
    pub fn endpoint(&self) -> String {
        join_url(&self.base_url, &self.path)
    }
}
