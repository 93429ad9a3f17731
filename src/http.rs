//! Request and response snapshots passed between the proxy, its fetchers and
//! the cache stores.

use std::collections::BTreeMap;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

/// Header carrying the epoch-millisecond time a response was fetched
pub const FRESHNESS_HEADER: &str = "sw-fetched-on";

/// How the request was issued by the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// Top-level page load
    Navigate,
    /// Any subresource or script-initiated request
    Other,
}

/// An outgoing request intercepted by the proxy
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    pub headers: BTreeMap<String, String>,
}

impl Request {
    /// Creates a plain GET request
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            mode: RequestMode::Other,
            headers: BTreeMap::new(),
        }
    }

    /// Creates a GET request for a top-level page load
    pub fn navigate(url: Url) -> Self {
        Self {
            mode: RequestMode::Navigate,
            ..Self::get(url)
        }
    }

    /// Adds a header, normalizing the name to lower case
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Key under which the response to this request is stored
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// Immutable snapshot of a network response
///
/// Stored entries are superseded on revalidation, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Reason phrase reported with the status
    pub status_text: String,
    /// Header mapping with lower-cased names
    pub headers: BTreeMap<String, String>,
    /// Raw body bytes
    #[serde(with = "hex_body")]
    pub body: Vec<u8>,
}

impl Response {
    /// Creates a response with the given status and body and no headers
    pub fn new(status: u16, status_text: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Shorthand for a `200 OK` response
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, "OK", body)
    }

    /// Returns a copy with the header set (name lower-cased)
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Clone of this response stamped with the fetch completion time
    pub fn stamped(&self, fetched_at_millis: i64) -> Self {
        self.clone()
            .with_header(FRESHNESS_HEADER, fetched_at_millis.to_string())
    }

    /// Fetch time recorded in the freshness header, if present and parsable
    pub fn fetched_at(&self) -> Option<i64> {
        self.header(FRESHNESS_HEADER)?.trim().parse().ok()
    }

    /// `now - fetched_at > ttl`; a missing stamp, or one too far off to
    /// subtract, counts as expired
    pub fn is_expired(&self, now_millis: i64, ttl_millis: i64) -> bool {
        match self.fetched_at() {
            Some(fetched_at) => match now_millis.checked_sub(fetched_at) {
                Some(age) => age > ttl_millis,
                None => true,
            },
            None => true,
        }
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Bodies are stored hex-encoded so entry files stay valid JSON text
mod hex_body {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        hex::decode(encoded).map_err(serde::de::Error::custom)
    }
}
