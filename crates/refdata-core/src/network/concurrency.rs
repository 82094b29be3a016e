//! Optimistic concurrency for writes.
//!
//! A caller that read an entity with its version token can make an update
//! conditional on that version. The token travels as an `If-Match` header and
//! the backend answers 412 when the stored version has moved on. That answer
//! becomes a [`VersionConflict`] carrying the server's current version and
//! the caller's payload, so the caller can reload and decide what to do.

use super::transport::{TransportFailure, TransportRequest, TransportResponse};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Precondition header carrying the expected version.
pub const IF_MATCH: &str = "If-Match";
/// Response header carrying the current version.
pub const ETAG: &str = "ETag";
/// Status the backend uses for a version mismatch.
pub const PRECONDITION_FAILED: u16 = 412;

/// Body fields that may carry the current version when no `ETag` is sent.
const VERSION_FIELDS: [&str; 4] = ["versaoAtual", "currentVersion", "versao", "version"];

/// Opaque version string of a previously fetched entity.
///
/// Owned by the caller; this layer only forwards it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConcurrencyToken(String);

impl ConcurrencyToken {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read the token the server attached to a response, if any.
    pub fn from_response(response: &TransportResponse) -> Option<Self> {
        response
            .header(ETAG)
            .filter(|v| !v.trim().is_empty())
            .map(|v| Self(v.trim().to_string()))
    }
}

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConcurrencyToken {
    fn from(version: &str) -> Self {
        Self::new(version)
    }
}

impl From<String> for ConcurrencyToken {
    fn from(version: String) -> Self {
        Self(version)
    }
}

/// A conditional write rejected because the stored version differs.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionConflict {
    pub submitted_version: Option<String>,
    pub current_version: Option<String>,
    pub submitted: serde_json::Value,
    pub message: String,
}

/// Attaches version tokens to writes and interprets version mismatches.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcurrencyGuard<'a> {
    token: Option<&'a ConcurrencyToken>,
}

impl<'a> ConcurrencyGuard<'a> {
    pub fn new(token: Option<&'a ConcurrencyToken>) -> Self {
        Self { token }
    }

    /// Whether a concurrency check was requested.
    pub fn is_conditional(&self) -> bool {
        self.token.is_some()
    }

    /// Attach the precondition header. Without a token the request is unchanged.
    pub fn attach(&self, request: TransportRequest) -> TransportRequest {
        match self.token {
            Some(token) => request.with_header(IF_MATCH, token.as_str()),
            None => request,
        }
    }

    /// Map a 412 failure to a [`VersionConflict`]; any other failure yields `None`.
    pub fn interpret_failure(
        &self,
        failure: &TransportFailure,
        submitted: &serde_json::Value,
    ) -> Option<VersionConflict> {
        if failure.status() != Some(PRECONDITION_FAILED) {
            return None;
        }

        Some(VersionConflict {
            submitted_version: self.token.map(|t| t.as_str().to_string()),
            current_version: current_version(failure),
            submitted: submitted.clone(),
            message: failure.message().to_string(),
        })
    }
}

/// Current version reported by a 412: the `ETag` header, else a body field.
fn current_version(failure: &TransportFailure) -> Option<String> {
    if let Some(etag) = failure.header(ETAG).filter(|v| !v.trim().is_empty()) {
        return Some(etag.trim().to_string());
    }

    let body = failure.body_json()?;
    VERSION_FIELDS.iter().find_map(|field| match body.get(*field)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
