//! Refdata Core - Resilient access layer for reference-data REST resources.
//!
//! Reference data (producers, suppliers, crops, units, ...) changes rarely
//! and is read constantly. This crate wraps one REST collection per
//! [`ResourceDescriptor`] in a [`ReferenceClient`] that:
//!
//! - serves reads from a TTL cache with insertion-order eviction
//! - retries reads on transient failures with exponential backoff
//! - sends writes exactly once and invalidates every cached view they touch
//! - turns a failed conditional update into a [`RefDataError::VersionConflict`]
//!
//! # Example
//!
//! ```rust,ignore
//! use refdata_core::{CallOptions, HttpTransport, ReferenceClient, ResourceDescriptor};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> refdata_core::Result<()> {
//!     let transport = Arc::new(HttpTransport::new("https://api.agro.example")?);
//!     let culturas: ReferenceClient<serde_json::Value> = ReferenceClient::new(
//!         ResourceDescriptor::new("Cultura", "/culturas"),
//!         transport,
//!         Default::default(),
//!     );
//!
//!     let ativas = culturas.get_active(&CallOptions::default()).await?;
//!     println!("{} active crops", ativas.len());
//!
//!     culturas.shutdown();
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cancel;
pub mod client;
pub mod config;
pub mod error;
pub mod network;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheEntry, CacheKey, CacheStats, CacheStore, InvalidationPattern};
pub use cancel::{CancellationToken, CancelledError};
pub use client::search::SearchDebouncer;
pub use client::{
    CallOptions, ClientOptions, OperationContext, OperationKind, ReferenceClient,
    ResourceDescriptor, SearchPage, SearchQuery, Versioned,
};
pub use config::ClientSettings;
pub use error::{RefDataError, Result};
pub use network::{
    ConcurrencyToken, Credential, ErrorClassification, ErrorKind, HttpTransport, RetryConfig,
    Severity, Transport, TransportFailure, TransportRequest, TransportResponse,
};
