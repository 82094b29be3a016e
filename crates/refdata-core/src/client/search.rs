//! Debounced search for type-ahead callers.
//!
//! Every submission supersedes the previous one. A superseded submission
//! resolves to `Ok(None)` whether it was still waiting out the debounce
//! window or already talking to the backend.

use super::{CallOptions, ReferenceClient, SearchPage, SearchQuery};
use crate::cancel::CancellationToken;
use crate::config::SearchDefaults;
use crate::error::{RefDataError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Debounces [`ReferenceClient::search`] so only the latest query reaches the backend.
pub struct SearchDebouncer<T, C = T, U = C> {
    client: ReferenceClient<T, C, U>,
    debounce: Duration,
    current: Mutex<Option<CancellationToken>>,
}

impl<T, C, U> SearchDebouncer<T, C, U>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
    C: Serialize,
    U: Serialize,
{
    pub fn new(client: ReferenceClient<T, C, U>, debounce: Duration) -> Self {
        Self {
            client,
            debounce,
            current: Mutex::new(None),
        }
    }

    /// Debouncer with the default window.
    pub fn with_default_window(client: ReferenceClient<T, C, U>) -> Self {
        Self::new(client, SearchDefaults::DEBOUNCE)
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Submit a query. Returns `Ok(None)` if a later submission superseded it.
    pub async fn submit(&self, query: SearchQuery) -> Result<Option<SearchPage<T>>> {
        let token = CancellationToken::new();
        if let Some(previous) = self.lock().replace(token.clone()) {
            previous.cancel();
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!("Search {:?} superseded before dispatch", query.term);
                return Ok(None);
            }
            _ = tokio::time::sleep(self.debounce) => {}
        }

        let opts = CallOptions::new().with_cancel(token.clone());
        match self.client.search(&query, &opts).await {
            Ok(page) => Ok(Some(page)),
            Err(RefDataError::Cancelled { .. }) if token.is_cancelled() => {
                debug!("Search {:?} superseded in flight", query.term);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Cancel the pending submission, if any.
    pub fn cancel_pending(&self) {
        if let Some(token) = self.lock().take() {
            token.cancel();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
