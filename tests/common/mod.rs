//! Shared helpers for har-relay integration tests.

#![allow(dead_code)]

use har_relay::config::{CompanionConfig, TelemetryConfig};
use std::time::Duration;
use wiremock::{MockServer, Request};

pub const API_KEY: &str = "OUW3RlI4gUCwWGpO10srIo2ufdWmMhMH";
pub const GROUP: &str = "5afa21b97011c63320226ef3";

/// `Authorization` value reqwest sends for `basic_auth(API_KEY, Some(""))`.
pub fn basic_auth_header() -> String {
    // base64("OUW3RlI4gUCwWGpO10srIo2ufdWmMhMH:")
    "Basic T1VXM1JsSTRnVUN3V0dwTzEwc3JJbzJ1ZmRXbU1oTUg6".to_string()
}

/// Telemetry config pointed at a mock server.
pub fn telemetry_for(server: &MockServer) -> TelemetryConfig {
    TelemetryConfig {
        host: server.uri(),
        timeout_seconds: 2,
        ..Default::default()
    }
}

/// Companion config pointed at a mock server.
pub fn companion_for(server: &MockServer) -> CompanionConfig {
    CompanionConfig {
        base_url: server.uri(),
        timeout_seconds: 2,
        ..Default::default()
    }
}

/// Poll until the mock server has seen at least `count` requests.
///
/// Uploads run detached from the request that triggered them.
pub async fn wait_for_requests(server: &MockServer, count: usize) -> Vec<Request> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let received = server.received_requests().await.unwrap_or_default();
        if received.len() >= count || tokio::time::Instant::now() >= deadline {
            return received;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Give detached tasks a moment, then return everything received.
pub async fn settle(server: &MockServer) -> Vec<Request> {
    tokio::time::sleep(Duration::from_millis(200)).await;
    server.received_requests().await.unwrap_or_default()
}
