//! Classification of transport failures.
//!
//! Maps a failure to a typed kind, a severity and retry eligibility. The
//! mapping is total and pure: the same failure always yields the same
//! classification.

use super::transport::TransportFailure;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Validation,
    Authorization,
    NotFound,
    Conflict,
    Server,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Network => "network",
            ErrorKind::Validation => "validation",
            ErrorKind::Authorization => "authorization",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Server => "server",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Derived description of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub kind: ErrorKind,
    pub retryable: bool,
    pub severity: Severity,
}

impl ErrorClassification {
    pub const fn new(kind: ErrorKind, retryable: bool, severity: Severity) -> Self {
        Self {
            kind,
            retryable,
            severity,
        }
    }
}

/// Classify a transport failure.
///
/// A request that could not even be built is a caller mistake, so it is
/// reported as a non-retryable `Validation` failure.
pub fn classify(failure: &TransportFailure) -> ErrorClassification {
    match failure {
        TransportFailure::InvalidRequest { .. } => {
            ErrorClassification::new(ErrorKind::Validation, false, Severity::Low)
        }
        TransportFailure::Connection { .. } => {
            ErrorClassification::new(ErrorKind::Network, true, Severity::High)
        }
        TransportFailure::Status { status, .. } => classify_status(*status),
    }
}

/// Classify an HTTP status.
///
/// 412 means the submitted version no longer matches and is reported as a
/// `Conflict`, never as a server error.
pub fn classify_status(status: u16) -> ErrorClassification {
    match status {
        400 | 422 => ErrorClassification::new(ErrorKind::Validation, false, Severity::Low),
        401 | 403 => ErrorClassification::new(ErrorKind::Authorization, false, Severity::Medium),
        404 => ErrorClassification::new(ErrorKind::NotFound, false, Severity::Low),
        409 | 412 => ErrorClassification::new(ErrorKind::Conflict, false, Severity::Medium),
        500 | 502 | 503 | 504 => ErrorClassification::new(ErrorKind::Server, true, Severity::High),
        _ => ErrorClassification::new(ErrorKind::Unknown, false, Severity::Low),
    }
}
