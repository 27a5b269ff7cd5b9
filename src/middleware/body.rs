//! Pass-through bodies that observe frames on their way to and from the handler.

use super::Recorder;
use crate::capture::PendingRecord;
use axum::body::Body;
use axum::http::{request, HeaderMap, StatusCode};
use bytes::Bytes;
use http_body::{Body as HttpBody, Frame, SizeHint};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

/// The in-flight record, shared by the request and response taps.
///
/// `None` once the exchange has completed.
pub(crate) type SharedPending = Arc<Mutex<Option<PendingRecord>>>;

fn with_pending(pending: &SharedPending, f: impl FnOnce(&mut PendingRecord)) {
    let mut guard = pending.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(record) = guard.as_mut() {
        f(record);
    }
}

/// Wraps the request body; copies each data frame the handler reads.
pub(crate) struct RequestTap {
    inner: Body,
    pending: SharedPending,
}

impl RequestTap {
    pub(crate) fn new(inner: Body, pending: SharedPending) -> Self {
        Self { inner, pending }
    }
}

impl HttpBody for RequestTap {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if let Poll::Ready(Some(Ok(frame))) = &polled {
            if let Some(data) = frame.data_ref() {
                with_pending(&this.pending, |p| p.append_request_chunk(data));
            }
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// Everything needed to close out one exchange.
pub(crate) struct Exchange {
    pub(crate) pending: SharedPending,
    pub(crate) request: request::Parts,
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) recorder: Arc<Recorder>,
}

impl Exchange {
    fn record_chunk(&self, data: &[u8]) {
        with_pending(&self.pending, |p| p.append_response_chunk(data));
    }

    fn complete(self) {
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(pending) = pending {
            let record = pending.finish(self.status, &self.headers);
            self.recorder.complete(&self.request, record);
        }
    }
}

/// Wraps the response body; every frame is yielded unchanged.
///
/// The exchange completes when the body is dropped. Hyper drops it only after
/// the terminating chunk has been written (or the client went away), so the
/// record reaches the buffer once the response has been delivered.
pub(crate) struct ResponseTap {
    inner: Body,
    exchange: Option<Exchange>,
}

impl ResponseTap {
    pub(crate) fn new(inner: Body, exchange: Exchange) -> Self {
        Self {
            inner,
            exchange: Some(exchange),
        }
    }

}

impl HttpBody for ResponseTap {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        if let Poll::Ready(Some(Ok(frame))) = &polled {
            if let (Some(data), Some(exchange)) = (frame.data_ref(), this.exchange.as_ref()) {
                exchange.record_chunk(data);
            }
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for ResponseTap {
    fn drop(&mut self) {
        if let Some(exchange) = self.exchange.take() {
            exchange.complete();
        }
    }
}
