//! Transport boundary consumed by the reference client.
//!
//! The client never talks to an HTTP library directly. It builds a
//! [`TransportRequest`], hands it to a [`Transport`] and interprets the
//! [`TransportResponse`]. Implementations return every response they receive,
//! whatever its status, and report `TransportFailure::Connection` only when no
//! response arrived at all.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::fmt;

/// HTTP method subset used by reference-data endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request relative to the transport's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    /// Path below the base URL, starting with `/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl TransportRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::Post, path).with_body(body)
    }

    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::Put, path).with_body(body)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    /// Set a header, replacing any previous value with the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A response as received, whatever its status.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Response with a JSON body.
    pub fn json_body(status: u16, body: &serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.to_string().into_bytes(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// A transport-level failure: either no response, or a non-success response.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportFailure {
    /// No response was received (DNS, refused connection, timeout, reset).
    Connection { message: String },
    /// The request could not be built, so it was never sent.
    InvalidRequest { message: String },
    /// The server answered with a non-success status.
    Status {
        status: u16,
        /// Human-readable message extracted from the body, or the status reason.
        message: String,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
}

impl TransportFailure {
    pub fn connection(message: impl Into<String>) -> Self {
        TransportFailure::Connection {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        TransportFailure::InvalidRequest {
            message: message.into(),
        }
    }

    /// Turn a non-success response into a failure, extracting its message.
    pub fn from_response(response: TransportResponse) -> Self {
        let message = extract_message(response.status, &response.body);
        TransportFailure::Status {
            status: response.status,
            message,
            headers: response.headers,
            body: response.body,
        }
    }

    /// HTTP status, absent for connection failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportFailure::Connection { .. } | TransportFailure::InvalidRequest { .. } => None,
            TransportFailure::Status { status, .. } => Some(*status),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            TransportFailure::Connection { message }
            | TransportFailure::InvalidRequest { message }
            | TransportFailure::Status { message, .. } => message,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        match self {
            TransportFailure::Status { headers, .. } => find_header(headers, name),
            _ => None,
        }
    }

    /// The body parsed as JSON, when it is JSON.
    pub fn body_json(&self) -> Option<serde_json::Value> {
        match self {
            TransportFailure::Status { body, .. } => serde_json::from_slice(body).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportFailure::Connection { message } => write!(f, "connection failed: {}", message),
            TransportFailure::InvalidRequest { message } => write!(f, "invalid request: {}", message),
            TransportFailure::Status {
                status, message, ..
            } => write!(f, "HTTP {}: {}", status, message),
        }
    }
}

impl std::error::Error for TransportFailure {}

/// Black-box HTTP transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request.
    ///
    /// Returns `Ok` for every response received, including non-success
    /// statuses, `TransportFailure::Connection` when none was received and
    /// `TransportFailure::InvalidRequest` when the request could not be built.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportFailure>;
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

const MESSAGE_FIELDS: [&str; 4] = ["message", "mensagem", "error", "detail"];
const MAX_MESSAGE_LEN: usize = 300;

/// Pull a human-readable message out of an error body.
fn extract_message(status: u16, body: &[u8]) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_slice(body) {
        for field in MESSAGE_FIELDS {
            if let Some(serde_json::Value::String(message)) = map.get(field) {
                if !message.trim().is_empty() {
                    return message.trim().to_string();
                }
            }
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if !text.is_empty() && !text.starts_with('{') {
        return text.chars().take(MAX_MESSAGE_LEN).collect();
    }

    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status))
}
