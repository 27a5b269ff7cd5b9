//! Tower middleware that captures every exchange and feeds the buffer.
//!
//! # Example
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use har_relay::middleware::metrics;
//!
//! # fn example() -> Result<(), har_relay::config::ConfigError> {
//! let layer = metrics("my-api-key")
//!     .group_by(|req| {
//!         req.headers
//!             .get("x-account-id")
//!             .and_then(|v| v.to_str().ok())
//!             .map(str::to_string)
//!     })
//!     .buffer_length(10)
//!     .on_error(|e| eprintln!("telemetry failed: {}", e))
//!     .build()?;
//!
//! let app: Router = Router::new()
//!     .route("/", get(|| async { "hello" }))
//!     .layer(layer);
//! # Ok(())
//! # }
//! ```
//!
//! The grouping function runs after the response has finished. Returning
//! `None` (or an empty string) exempts the request from telemetry; so does a
//! panic inside the function.

mod body;

use crate::buffer::{BatchSink, Buffer};
use crate::capture::{LogRecord, PendingRecord};
use crate::config::{ConfigError, TelemetryConfig};
use crate::flusher::{ErrorCallback, FlushError, Flusher};
use axum::body::Body;
use axum::extract::Request;
use axum::http::request;
use axum::response::Response;
use body::{Exchange, RequestTap, ResponseTap};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Maps a request to the group its telemetry is filed under.
pub type GroupFn = Arc<dyn Fn(&request::Parts) -> Option<String> + Send + Sync>;

/// Start configuring the metrics middleware.
pub fn metrics(api_key: impl Into<String>) -> MetricsBuilder {
    MetricsBuilder {
        api_key: api_key.into(),
        group_by: None,
        buffer_length: None,
        on_error: None,
        telemetry: TelemetryConfig::default(),
        client: None,
        sink: None,
    }
}

/// Builder returned by [`metrics`]. Validation happens in [`MetricsBuilder::build`].
pub struct MetricsBuilder {
    api_key: String,
    group_by: Option<GroupFn>,
    buffer_length: Option<usize>,
    on_error: Option<ErrorCallback>,
    telemetry: TelemetryConfig,
    client: Option<reqwest::Client>,
    sink: Option<Arc<dyn BatchSink>>,
}

impl MetricsBuilder {
    /// Required. Computes the group key for each request.
    pub fn group_by<F>(mut self, f: F) -> Self
    where
        F: Fn(&request::Parts) -> Option<String> + Send + Sync + 'static,
    {
        self.group_by = Some(Arc::new(f));
        self
    }

    /// Records per batch. Overrides `telemetry.buffer_length`.
    pub fn buffer_length(mut self, n: usize) -> Self {
        self.buffer_length = Some(n);
        self
    }

    /// Called with the failure whenever a batch cannot be delivered.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&FlushError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Telemetry endpoint, timeout and default buffer length.
    pub fn telemetry(mut self, config: TelemetryConfig) -> Self {
        self.telemetry = config;
        self
    }

    /// Reuse an existing HTTP client for uploads.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Send batches somewhere other than the telemetry endpoint.
    pub fn sink(mut self, sink: Arc<dyn BatchSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<MetricsLayer, ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        let group_by = self.group_by.ok_or(ConfigError::MissingGroupingFunction)?;
        let capacity = self.buffer_length.unwrap_or(self.telemetry.buffer_length);

        let (sink, flusher): (Arc<dyn BatchSink>, Option<Flusher>) = match self.sink {
            Some(sink) => (sink, None),
            None => {
                let flusher = match self.client {
                    Some(client) => Flusher::with_client(
                        self.api_key,
                        &self.telemetry,
                        self.on_error,
                        client,
                    ),
                    None => Flusher::new(self.api_key, &self.telemetry, self.on_error)?,
                };
                (Arc::new(flusher.clone()), Some(flusher))
            }
        };

        tracing::debug!(
            buffer_length = capacity.max(1),
            endpoint = flusher.as_ref().map(|f| f.endpoint()).unwrap_or("custom sink"),
            "Metrics middleware configured"
        );

        Ok(MetricsLayer {
            recorder: Arc::new(Recorder {
                group_by,
                buffer: Buffer::new(capacity, sink),
                flusher,
            }),
        })
    }
}

/// State shared by every clone of the layer and its services.
pub(crate) struct Recorder {
    group_by: GroupFn,
    buffer: Buffer,
    flusher: Option<Flusher>,
}

impl Recorder {
    fn group_for(&self, request: &request::Parts) -> Option<String> {
        catch_unwind(AssertUnwindSafe(|| (self.group_by)(request)))
            .ok()
            .flatten()
            .filter(|group| !group.is_empty())
    }

    /// Called once per exchange after the response body has finished.
    pub(crate) fn complete(&self, request: &request::Parts, record: LogRecord) {
        match self.group_for(request) {
            Some(group) => {
                ::metrics::counter!("har_relay_records_captured_total").increment(1);
                self.buffer.push(group, record);
            }
            None => {
                ::metrics::counter!("har_relay_records_dropped_total").increment(1);
                tracing::trace!(url = %record.url(), "No group for request, skipping");
            }
        }
    }
}

/// Layer that wraps services in [`MetricsService`].
#[derive(Clone)]
pub struct MetricsLayer {
    recorder: Arc<Recorder>,
}

impl std::fmt::Debug for MetricsLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsLayer")
            .field("buffer", &self.recorder.buffer)
            .finish()
    }
}

impl MetricsLayer {
    /// Records waiting for the next threshold crossing.
    pub fn buffered(&self) -> usize {
        self.recorder.buffer.len()
    }

    pub fn buffer_length(&self) -> usize {
        self.recorder.buffer.capacity()
    }

    /// Hand whatever is buffered to the sink without waiting for capacity.
    pub fn flush_pending(&self) -> usize {
        self.recorder.buffer.flush()
    }

    /// Drain the buffer and wait for the upload to finish.
    ///
    /// Intended for graceful shutdown, where a detached send could be cut
    /// off by the runtime stopping. With a custom sink this is the same as
    /// [`MetricsLayer::flush_pending`].
    pub async fn shutdown(&self) -> Result<usize, FlushError> {
        let Some(flusher) = &self.recorder.flusher else {
            return Ok(self.recorder.buffer.flush());
        };
        let Some(batch) = self.recorder.buffer.drain() else {
            return Ok(0);
        };
        let n = batch.len();

        if let Err(e) = flusher.send(batch).await {
            flusher.report(&e);
            return Err(e);
        }
        Ok(n)
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            recorder: Arc::clone(&self.recorder),
        }
    }
}

/// Service that observes the request and response bodies of `S`.
#[derive(Clone)]
pub struct MetricsService<S> {
    inner: S,
    recorder: Arc<Recorder>,
}

impl<S> Service<Request> for MetricsService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let (parts, body) = req.into_parts();
        let pending = Arc::new(Mutex::new(Some(PendingRecord::begin(&parts))));
        let request_parts = parts.clone();

        let req = Request::from_parts(parts, Body::new(RequestTap::new(body, Arc::clone(&pending))));
        let future = self.inner.call(req);
        let recorder = Arc::clone(&self.recorder);

        Box::pin(async move {
            let response = future.await?;
            let (parts, body) = response.into_parts();
            let exchange = Exchange {
                pending,
                request: request_parts,
                status: parts.status,
                headers: parts.headers.clone(),
                recorder,
            };
            Ok(Response::from_parts(
                parts,
                Body::new(ResponseTap::new(body, exchange)),
            ))
        })
    }
}
