//! Network layer for reference-data calls.
//!
//! This module provides:
//! - The transport boundary and a reqwest implementation
//! - Classification of transport failures
//! - Retry logic with exponential backoff
//! - Optimistic-concurrency handling for writes

mod classify;
mod concurrency;
mod http;
mod retry;
mod transport;

pub use classify::{classify, classify_status, ErrorClassification, ErrorKind, Severity};
pub use concurrency::{
    ConcurrencyGuard, ConcurrencyToken, VersionConflict, ETAG, IF_MATCH, PRECONDITION_FAILED,
};
pub use http::{Credential, HttpTransport};
pub use retry::{delay_for, retry_async, should_retry, RetryConfig, RetryError, RetryStats};
pub use transport::{Method, Transport, TransportFailure, TransportRequest, TransportResponse};
