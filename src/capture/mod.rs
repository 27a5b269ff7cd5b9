//! Turning one request/response exchange into a [`LogRecord`].
//!
//! A [`PendingRecord`] is opened when the request arrives, collects request
//! and response body chunks as they flow through the middleware, and is
//! consumed by [`PendingRecord::finish`] once the response has completed.
//!
//! ```
//! use axum::http::{HeaderMap, Request, StatusCode};
//! use har_relay::capture::PendingRecord;
//!
//! let (parts, _) = Request::get("http://localhost/test").body(()).unwrap().into_parts();
//! let mut pending = PendingRecord::begin(&parts);
//! pending.append_response_chunk(b"{\"a\":1,");
//! pending.append_response_chunk(b"\"b\":2}");
//!
//! let record = pending.finish(StatusCode::OK, &HeaderMap::new());
//! assert_eq!(record.response_body().unwrap().as_ref(), b"{\"a\":1,\"b\":2}");
//! ```

pub mod har;

pub use har::HarDocument;

use axum::extract::ConnectInfo;
use axum::http::{request, HeaderMap, StatusCode, Version};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Instant;

/// A single header line. Duplicated header names produce separate entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Flatten a header map into name/value pairs, one per value.
///
/// `HeaderMap` keeps every value of a name together under the position where
/// that name first appeared, so interleaved lines such as `a, b, a` come out
/// as `a, a, b`. Values of one name keep their relative order.
pub fn header_list(headers: &HeaderMap) -> Vec<Header> {
    headers
        .iter()
        .map(|(name, value)| {
            Header::new(
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

/// A request that has been seen but whose response has not finished yet.
#[derive(Debug)]
pub struct PendingRecord {
    started_at: DateTime<Utc>,
    started: Instant,
    method: String,
    url: String,
    http_version: &'static str,
    request_headers: Vec<Header>,
    request_body: Option<BytesMut>,
    response_body: Option<BytesMut>,
    client_ip: Option<String>,
}

impl PendingRecord {
    /// Snapshot the request line and headers and stamp `started_at`.
    pub fn begin(parts: &request::Parts) -> Self {
        let client_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            method: parts.method.to_string(),
            url: absolute_url(parts),
            http_version: version_label(parts.version),
            request_headers: header_list(&parts.headers),
            request_body: None,
            response_body: None,
            client_ip,
        }
    }

    /// Record request body bytes as the handler consumes them.
    pub fn append_request_chunk(&mut self, chunk: &[u8]) {
        self.request_body
            .get_or_insert_with(BytesMut::new)
            .extend_from_slice(chunk);
    }

    /// Record one unit of response output. Chunks are kept in call order.
    pub fn append_response_chunk(&mut self, chunk: &[u8]) {
        self.response_body
            .get_or_insert_with(BytesMut::new)
            .extend_from_slice(chunk);
    }

    /// Close the exchange and produce the immutable record.
    ///
    /// A response that never produced a chunk yields `response_body() == None`.
    pub fn finish(self, status: StatusCode, response_headers: &HeaderMap) -> LogRecord {
        LogRecord {
            started_at: self.started_at,
            method: self.method,
            url: self.url,
            http_version: self.http_version,
            request_headers: self.request_headers,
            request_body: self.request_body.map(BytesMut::freeze),
            status: status.as_u16(),
            response_headers: header_list(response_headers),
            response_body: self.response_body.map(BytesMut::freeze),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            client_ip: self.client_ip,
        }
    }
}

/// One captured exchange. Built once by [`PendingRecord::finish`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    started_at: DateTime<Utc>,
    method: String,
    url: String,
    http_version: &'static str,
    request_headers: Vec<Header>,
    request_body: Option<Bytes>,
    status: u16,
    response_headers: Vec<Header>,
    response_body: Option<Bytes>,
    elapsed_ms: u64,
    client_ip: Option<String>,
}

impl LogRecord {
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn http_version(&self) -> &str {
        self.http_version
    }

    /// Request headers, grouped by name as described on [`header_list`].
    pub fn request_headers(&self) -> &[Header] {
        &self.request_headers
    }

    pub fn request_body(&self) -> Option<&Bytes> {
        self.request_body.as_ref()
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn response_headers(&self) -> &[Header] {
        &self.response_headers
    }

    pub fn response_body(&self) -> Option<&Bytes> {
        self.response_body.as_ref()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }

    /// First value of a request header, case-insensitive.
    pub fn request_header(&self, name: &str) -> Option<&str> {
        find_header(&self.request_headers, name)
    }

    /// First value of a response header, case-insensitive.
    pub fn response_header(&self, name: &str) -> Option<&str> {
        find_header(&self.response_headers, name)
    }
}

fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Rebuild the URL the client asked for.
///
/// Servers usually see origin-form URIs (`/path?q`), so the scheme and
/// authority come from `x-forwarded-proto` and `Host` when missing.
fn absolute_url(parts: &request::Parts) -> String {
    if parts.uri.scheme().is_some() && parts.uri.authority().is_some() {
        return parts.uri.to_string();
    }

    let scheme = parts
        .headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .filter(|v| v.eq_ignore_ascii_case("https"))
        .map(|_| "https")
        .unwrap_or("http");
    let host = parts
        .headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    format!("{}://{}{}", scheme, host, path)
}

fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/1.1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    fn parts_for(req: Request<()>) -> request::Parts {
        req.into_parts().0
    }

    #[test]
    fn test_begin_captures_request_line() {
        let parts = parts_for(
            Request::post("/orders?id=7")
                .header("host", "api.example.com")
                .header("content-type", "application/json")
                .body(())
                .unwrap(),
        );

        let record = PendingRecord::begin(&parts).finish(StatusCode::CREATED, &HeaderMap::new());

        assert_eq!(record.method(), "POST");
        assert_eq!(record.url(), "http://api.example.com/orders?id=7");
        assert_eq!(record.http_version(), "HTTP/1.1");
        assert_eq!(record.status(), 201);
        assert_eq!(record.request_header("Content-Type"), Some("application/json"));
    }

    #[test]
    fn test_absolute_uri_is_kept() {
        let parts = parts_for(Request::get("https://example.com/a/b").body(()).unwrap());
        let record = PendingRecord::begin(&parts).finish(StatusCode::OK, &HeaderMap::new());
        assert_eq!(record.url(), "https://example.com/a/b");
    }

    #[test]
    fn test_forwarded_proto_https() {
        let parts = parts_for(
            Request::get("/secure")
                .header("host", "example.com")
                .header("x-forwarded-proto", "https")
                .body(())
                .unwrap(),
        );
        let record = PendingRecord::begin(&parts).finish(StatusCode::OK, &HeaderMap::new());
        assert_eq!(record.url(), "https://example.com/secure");
    }

    #[test]
    fn test_duplicate_headers_preserved_in_order() {
        let parts = parts_for(
            Request::get("/")
                .header("accept", "text/html")
                .header("accept", "application/json")
                .body(())
                .unwrap(),
        );
        let record = PendingRecord::begin(&parts).finish(StatusCode::OK, &HeaderMap::new());

        let accepts: Vec<&str> = record
            .request_headers()
            .iter()
            .filter(|h| h.name == "accept")
            .map(|h| h.value.as_str())
            .collect();
        assert_eq!(accepts, vec!["text/html", "application/json"]);
    }

    #[test]
    fn test_interleaved_headers_grouped_by_first_name() {
        let mut headers = HeaderMap::new();
        headers.append("x-a", HeaderValue::from_static("1"));
        headers.append("x-b", HeaderValue::from_static("2"));
        headers.append("x-a", HeaderValue::from_static("3"));

        let list = header_list(&headers);
        let pairs: Vec<(&str, &str)> = list
            .iter()
            .map(|h| (h.name.as_str(), h.value.as_str()))
            .collect();
        assert_eq!(pairs, vec![("x-a", "1"), ("x-a", "3"), ("x-b", "2")]);
    }

    #[test]
    fn test_response_chunks_concatenate_in_order() {
        let parts = parts_for(Request::get("/").body(()).unwrap());
        let mut pending = PendingRecord::begin(&parts);
        pending.append_response_chunk(b"{\"a\":1,");
        pending.append_response_chunk(b"\"b\":2,");
        pending.append_response_chunk(b"\"c\":3}");

        let record = pending.finish(StatusCode::OK, &HeaderMap::new());
        assert_eq!(
            record.response_body().unwrap().as_ref(),
            br#"{"a":1,"b":2,"c":3}"#
        );
    }

    #[test]
    fn test_single_chunk_matches_split_chunks() {
        let parts = parts_for(Request::get("/").body(()).unwrap());
        let mut one = PendingRecord::begin(&parts);
        one.append_response_chunk(br#"{"a":1,"b":2,"c":3}"#);
        let mut many = PendingRecord::begin(&parts);
        let pieces: [&[u8]; 3] = [br#"{"a":1,"#, br#""b":2,"#, br#""c":3}"#];
        for piece in pieces {
            many.append_response_chunk(piece);
        }

        let one = one.finish(StatusCode::OK, &HeaderMap::new());
        let many = many.finish(StatusCode::OK, &HeaderMap::new());
        assert_eq!(one.response_body(), many.response_body());
    }

    #[test]
    fn test_finish_without_chunks_has_no_body() {
        let parts = parts_for(Request::get("/").body(()).unwrap());
        let record = PendingRecord::begin(&parts).finish(StatusCode::NO_CONTENT, &HeaderMap::new());

        assert!(record.response_body().is_none());
        assert!(record.request_body().is_none());
        assert_eq!(record.status(), 204);
    }

    #[test]
    fn test_request_body_chunks_recorded() {
        let parts = parts_for(Request::post("/").body(()).unwrap());
        let mut pending = PendingRecord::begin(&parts);
        pending.append_request_chunk(b"name=");
        pending.append_request_chunk(b"marc");

        let record = pending.finish(StatusCode::OK, &HeaderMap::new());
        assert_eq!(record.request_body().unwrap().as_ref(), b"name=marc");
    }

    #[test]
    fn test_response_headers_recorded_at_finish() {
        let parts = parts_for(Request::get("/").body(()).unwrap());
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));

        let record = PendingRecord::begin(&parts).finish(StatusCode::OK, &headers);
        assert_eq!(record.response_header("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_elapsed_is_measured_from_begin() {
        let parts = parts_for(Request::get("/").body(()).unwrap());
        let pending = PendingRecord::begin(&parts);
        std::thread::sleep(std::time::Duration::from_millis(15));
        let record = pending.finish(StatusCode::OK, &HeaderMap::new());

        assert!(record.elapsed_ms() >= 15, "got {}ms", record.elapsed_ms());
        assert!(record.started_at() <= Utc::now());
    }

    #[test]
    fn test_client_ip_from_connect_info() {
        let mut parts = parts_for(Request::get("/").body(()).unwrap());
        let addr: SocketAddr = "10.1.2.3:5555".parse().unwrap();
        parts.extensions.insert(ConnectInfo(addr));

        let record = PendingRecord::begin(&parts).finish(StatusCode::OK, &HeaderMap::new());
        assert_eq!(record.client_ip(), Some("10.1.2.3"));
    }
}
