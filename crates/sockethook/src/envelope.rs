//! Message envelope built from an inbound hook request.
//!
//! Wire format delivered to every subscriber:
//!
//! ```text
//! {
//!   "headers":  { "Content-Type": "application/json", ... },
//!   "endpoint": "/order/created",
//!   "data":     <JSON value | base64 string of the raw body>
//! }
//! ```

use crate::error::Result;
use axum::http::header::{CONTENT_TYPE, HOST};
use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use tracing::debug;

/// Media type whose bodies are parsed into structured payloads.
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Hook body, decided once from the declared content type.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Parsed JSON body. Malformed JSON is carried as `Value::Null`.
    Structured(serde_json::Value),
    /// Opaque body bytes.
    Raw(Bytes),
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Payload::Structured(value) => value.serialize(serializer),
            Payload::Raw(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
        }
    }
}

/// One webhook delivery, shared read-only by every send of a broadcast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    /// Request headers, first value per name, canonical MIME casing.
    pub headers: BTreeMap<String, String>,
    /// Normalized endpoint name.
    pub endpoint: String,
    /// Request body.
    #[serde(rename = "data")]
    pub payload: Payload,
}

impl Envelope {
    /// Build an envelope from the parts of a hook request.
    pub fn from_request(endpoint: impl Into<String>, headers: &HeaderMap, body: Bytes) -> Self {
        let endpoint = endpoint.into();
        let payload = if is_json(headers) {
            match serde_json::from_slice(&body) {
                Ok(value) => Payload::Structured(value),
                Err(e) => {
                    debug!(endpoint = %endpoint, error = %e, "malformed JSON hook body, using null");
                    Payload::Structured(serde_json::Value::Null)
                }
            }
        } else {
            Payload::Raw(body)
        };

        Self {
            headers: collect_headers(headers),
            endpoint,
            payload,
        }
    }

    /// Serialize to the JSON text sent to subscribers.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Whether the request declares a JSON body (parameters such as `charset` are ignored).
fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(JSON_MEDIA_TYPE))
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .keys()
        // The target host is part of the request line, not a header to relay.
        .filter(|name| **name != HOST)
        .filter_map(|name| {
            // `get` returns the first value when a header repeats.
            let value = headers.get(name)?;
            Some((
                canonical_header_name(name.as_str()),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            ))
        })
        .collect()
}

/// `content-type` -> `Content-Type`, `x-github-event` -> `X-Github-Event`.
pub fn canonical_header_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
        upper = c == '-';
    }
    out
}
