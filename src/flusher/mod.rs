//! Shipping batches to the telemetry endpoint.
//!
//! Each batch becomes one `POST` with a JSON array body:
//!
//! ```json
//! [
//!   { "group": "5afa21b97011c63320226ef3", "request": { "log": { "entries": [ ... ] } } }
//! ]
//! ```
//!
//! The request is authenticated with HTTP basic auth, the API key as user
//! name and an empty password. A batch gets exactly one attempt.

mod error;

pub use error::FlushError;

use crate::buffer::{Batch, BatchSink};
use crate::capture::HarDocument;
use crate::config::{ConfigError, TelemetryConfig};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Called with the failure detail whenever a batch could not be delivered.
pub type ErrorCallback = Arc<dyn Fn(&FlushError) + Send + Sync>;

/// One element of the uploaded JSON array.
#[derive(Debug, Clone, Serialize)]
pub struct WireEntry {
    pub group: String,
    pub request: HarDocument,
}

/// Render a batch in the endpoint's wire format.
pub fn wire_payload(batch: &Batch) -> Vec<WireEntry> {
    batch
        .entries()
        .iter()
        .map(|entry| WireEntry {
            group: entry.group.clone(),
            request: HarDocument::from_record(&entry.record),
        })
        .collect()
}

/// Sends batches to the telemetry endpoint.
#[derive(Clone)]
pub struct Flusher {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    on_error: Option<ErrorCallback>,
}

impl std::fmt::Debug for Flusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flusher")
            .field("endpoint", &self.endpoint)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl Flusher {
    /// Create a flusher with its own HTTP client.
    pub fn new(
        api_key: impl Into<String>,
        config: &TelemetryConfig,
        on_error: Option<ErrorCallback>,
    ) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self::with_client(api_key, config, on_error, client))
    }

    /// Create a flusher with a caller-supplied HTTP client.
    pub fn with_client(
        api_key: impl Into<String>,
        config: &TelemetryConfig,
        on_error: Option<ErrorCallback>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            client,
            endpoint: config.endpoint(),
            api_key: api_key.into(),
            on_error,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Upload one batch and wait for the outcome.
    ///
    /// Does not invoke the error callback; [`BatchSink::dispatch`] does.
    pub async fn send(&self, batch: Batch) -> Result<(), FlushError> {
        let batch_size = batch.len();
        let payload = wire_payload(&batch);
        drop(batch);

        tracing::debug!(batch_size, endpoint = %self.endpoint, "Sending telemetry batch");

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.api_key, Some(""))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            metrics::counter!("har_relay_batches_sent_total").increment(1);
            tracing::debug!(batch_size, status = status.as_u16(), "Telemetry batch accepted");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(FlushError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Count, log and hand a failure to the error callback.
    pub(crate) fn report(&self, error: &FlushError) {
        metrics::counter!("har_relay_batches_failed_total").increment(1);
        tracing::warn!(error = %error, "Telemetry batch dropped");
        if let Some(callback) = &self.on_error {
            callback(error);
        }
    }
}

impl BatchSink for Flusher {
    /// Spawn the upload and return immediately.
    fn dispatch(&self, batch: Batch) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let flusher = self.clone();
                handle.spawn(async move {
                    if let Err(e) = flusher.send(batch).await {
                        flusher.report(&e);
                    }
                });
            }
            Err(_) => {
                tracing::debug!(batch_size = batch.len(), "No tokio runtime for telemetry upload");
                self.report(&FlushError::NoRuntime);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferEntry;
    use crate::capture::PendingRecord;
    use axum::http::{HeaderMap, Request, StatusCode};
    use std::sync::Mutex;

    fn batch(groups: &[&str]) -> Batch {
        Batch::new(
            groups
                .iter()
                .map(|group| {
                    let (parts, _) = Request::get("/test").body(()).unwrap().into_parts();
                    let mut pending = PendingRecord::begin(&parts);
                    pending.append_response_chunk(b"ok");
                    BufferEntry {
                        group: group.to_string(),
                        record: pending.finish(StatusCode::OK, &HeaderMap::new()),
                    }
                })
                .collect(),
        )
    }

    #[test]
    fn test_wire_payload_shape() {
        let payload = wire_payload(&batch(&["a", "b"]));
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json.as_array().unwrap().len(), 2);
        assert_eq!(json[0]["group"], "a");
        assert_eq!(json[1]["group"], "b");
        assert_eq!(
            json[0]["request"]["log"]["entries"][0]["response"]["content"]["text"],
            "ok"
        );
    }

    #[test]
    fn test_endpoint_from_config() {
        let config = TelemetryConfig {
            host: "http://127.0.0.1:4000".to_string(),
            ..Default::default()
        };
        let flusher = Flusher::new("key", &config, None).unwrap();
        assert_eq!(flusher.endpoint(), "http://127.0.0.1:4000/v1/request");
    }

    #[test]
    fn test_dispatch_without_runtime_reports_error() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ErrorCallback = Arc::new(move |e: &FlushError| {
            sink.lock().unwrap().push(e.clone());
        });

        let flusher = Flusher::new("key", &TelemetryConfig::default(), Some(callback)).unwrap();
        flusher.dispatch(batch(&["a"]));

        assert_eq!(*seen.lock().unwrap(), vec![FlushError::NoRuntime]);
    }

    #[tokio::test]
    async fn test_send_transport_error() {
        // Port 9 (discard) on loopback is not expected to accept connections.
        let config = TelemetryConfig {
            host: "http://127.0.0.1:9".to_string(),
            timeout_seconds: 2,
            ..Default::default()
        };
        let flusher = Flusher::new("key", &config, None).unwrap();

        let result = flusher.send(batch(&["a"])).await;
        assert!(matches!(result, Err(FlushError::Transport(_))));
    }
}
