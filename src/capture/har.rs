//! HAR-like rendering of a [`LogRecord`].
//!
//! The telemetry endpoint expects each record wrapped as a one-entry HTTP
//! Archive: `{ "log": { "creator": ..., "entries": [ ... ] } }`.

use super::{Header, LogRecord};
use axum::http::StatusCode;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

/// Top-level HAR document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarDocument {
    pub log: HarLog,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarLog {
    pub creator: HarCreator,
    pub entries: Vec<HarEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarCreator {
    pub name: String,
    pub version: String,
    pub comment: String,
}

impl Default for HarCreator {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            comment: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarEntry {
    pub pageref: String,
    pub started_date_time: String,
    pub time: u64,
    #[serde(rename = "clientIPAddress", skip_serializing_if = "Option::is_none")]
    pub client_ip_address: Option<String>,
    pub request: HarRequest,
    pub response: HarResponse,
    pub timings: HarTimings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarRequest {
    pub method: String,
    pub url: String,
    pub http_version: String,
    pub headers: Vec<Header>,
    pub query_string: Vec<Header>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_data: Option<HarPostData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarPostData {
    pub mime_type: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<Header>,
    pub content: HarContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub size: usize,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarTimings {
    pub wait: u64,
    pub receive: u64,
}

impl HarDocument {
    pub fn from_record(record: &LogRecord) -> Self {
        let post_data = record.request_body().map(|body| HarPostData {
            mime_type: record
                .request_header("content-type")
                .unwrap_or("application/octet-stream")
                .to_string(),
            text: String::from_utf8_lossy(body).into_owned(),
        });

        let content = HarContent {
            text: record
                .response_body()
                .map(|body| String::from_utf8_lossy(body).into_owned()),
            size: record.response_body().map(|b| b.len()).unwrap_or(0),
            mime_type: record
                .response_header("content-type")
                .unwrap_or("application/octet-stream")
                .to_string(),
        };

        let entry = HarEntry {
            pageref: record.url().to_string(),
            started_date_time: record
                .started_at()
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            time: record.elapsed_ms(),
            client_ip_address: record.client_ip().map(str::to_string),
            request: HarRequest {
                method: record.method().to_string(),
                url: record.url().to_string(),
                http_version: record.http_version().to_string(),
                headers: record.request_headers().to_vec(),
                query_string: query_pairs(record.url()),
                post_data,
            },
            response: HarResponse {
                status: record.status(),
                status_text: StatusCode::from_u16(record.status())
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("")
                    .to_string(),
                headers: record.response_headers().to_vec(),
                content,
            },
            timings: HarTimings {
                wait: record.elapsed_ms(),
                receive: 0,
            },
        };

        Self {
            log: HarLog {
                creator: HarCreator::default(),
                entries: vec![entry],
            },
        }
    }
}

/// Decode the query component of `url` into name/value pairs.
fn query_pairs(url: &str) -> Vec<Header> {
    let Some((_, query)) = url.split_once('?') else {
        return Vec::new();
    };
    let query = query.split('#').next().unwrap_or("");

    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            Header::new(decode_component(name), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}
