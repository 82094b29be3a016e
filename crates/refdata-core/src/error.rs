//! Error types for the reference-data access layer.
//!
//! Every failure that leaves the layer is typed with its [`ErrorClassification`]
//! so the presentation collaborator can render kind, severity, message and the
//! number of attempts made without inspecting transport details.

use crate::client::OperationKind;
use crate::network::{ErrorClassification, ErrorKind, Severity};
use thiserror::Error;

/// Main error type for reference-data operations.
#[derive(Debug, Error)]
pub enum RefDataError {
    /// A transport call failed and retries (if any) were exhausted.
    #[error("{operation} {entity} failed after {attempts} attempt(s): {message}")]
    Request {
        entity: String,
        operation: OperationKind,
        classification: ErrorClassification,
        /// HTTP status, absent for connection failures.
        status: Option<u16>,
        message: String,
        attempts: u32,
    },

    /// The backend rejected a conditional write because the stored version moved on.
    #[error("Version conflict on {entity} {id}: submitted {submitted_version:?}, current {current_version:?}")]
    VersionConflict {
        entity: String,
        id: String,
        submitted_version: Option<String>,
        /// Version the server reported as current, when it sent one.
        current_version: Option<String>,
        /// The payload the caller tried to write.
        submitted: serde_json::Value,
        message: String,
    },

    #[error("{operation} {entity} was cancelled")]
    Cancelled {
        entity: String,
        operation: OperationKind,
    },

    #[error("Reference client for {entity} has been shut down")]
    ClientShutdown { entity: String },

    /// The response body did not match the expected schema.
    #[error("Failed to decode {entity} response: {message}")]
    Decode {
        entity: String,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for reference-data operations.
pub type Result<T> = std::result::Result<T, RefDataError>;

impl From<serde_json::Error> for RefDataError {
    fn from(err: serde_json::Error) -> Self {
        RefDataError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl RefDataError {
    /// Classification of this error.
    ///
    /// Errors raised locally (decode, configuration, cancellation) are never
    /// retryable and classify as `Unknown`.
    pub fn classification(&self) -> ErrorClassification {
        match self {
            RefDataError::Request { classification, .. } => *classification,
            RefDataError::VersionConflict { .. } => ErrorClassification {
                kind: ErrorKind::Conflict,
                retryable: false,
                severity: Severity::Medium,
            },
            RefDataError::Decode { .. }
            | RefDataError::Json { .. }
            | RefDataError::InvalidUrl { .. }
            | RefDataError::Config { .. } => ErrorClassification {
                kind: ErrorKind::Unknown,
                retryable: false,
                severity: Severity::Medium,
            },
            RefDataError::Cancelled { .. } | RefDataError::ClientShutdown { .. } => {
                ErrorClassification {
                    kind: ErrorKind::Unknown,
                    retryable: false,
                    severity: Severity::Low,
                }
            }
        }
    }

    /// Shorthand for `classification().kind`.
    pub fn kind(&self) -> ErrorKind {
        self.classification().kind
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        self.classification().retryable
    }

    /// Number of transport calls made before the error surfaced.
    pub fn attempts(&self) -> u32 {
        match self {
            RefDataError::Request { attempts, .. } => *attempts,
            RefDataError::VersionConflict { .. } => 1,
            _ => 0,
        }
    }

    /// HTTP status that produced this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            RefDataError::Request { status, .. } => *status,
            RefDataError::VersionConflict { .. } => Some(412),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            RefDataError::Cancelled { .. } | RefDataError::ClientShutdown { .. }
        )
    }

    /// Server-reported current version carried by a version conflict.
    pub fn current_version(&self) -> Option<&str> {
        match self {
            RefDataError::VersionConflict {
                current_version, ..
            } => current_version.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn decode(entity: &str, err: serde_json::Error) -> Self {
        RefDataError::Decode {
            entity: entity.to_string(),
            message: err.to_string(),
            source: Some(err),
        }
    }
}
