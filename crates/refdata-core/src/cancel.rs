//! Cancellation token for reference-data operations.
//!
//! Each logical operation runs under a token. Cancelling it aborts the
//! in-flight transport call and any pending backoff wait, so a retry never
//! fires after cancellation. Tokens form a tree: a child observes its
//! parent's cancellation, while cancelling a child leaves the parent intact.
//!
//! The tree itself is `tokio_util`'s token; this wrapper adds deadlines and
//! the `check` helper used by synchronous call sites.

use std::time::Duration;

/// A cancellation token for cooperative cancellation of async operations.
///
/// Clones share state: cancelling any clone cancels all of them.
///
/// # Example
///
/// ```
/// use refdata_core::CancellationToken;
///
/// let parent = CancellationToken::new();
/// let child = parent.child_token();
///
/// child.cancel();
/// assert!(child.is_cancelled());
/// assert!(!parent.is_cancelled());
///
/// let other = parent.child_token();
/// parent.cancel();
/// assert!(other.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of this token and every child derived from it.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Create a child token that is cancelled when this token is.
    pub fn child_token(&self) -> Self {
        Self {
            inner: self.inner.child_token(),
        }
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }

    /// Cancel this token once `deadline` has elapsed.
    ///
    /// Must be called from within a tokio runtime. The timer task ends early
    /// if the token is cancelled by other means first.
    pub fn cancel_after(&self, deadline: Duration) {
        let token = self.inner.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(deadline) => token.cancel(),
            }
        });
    }

    /// Check cancellation and return an error if cancelled.
    pub fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError)
        } else {
            Ok(())
        }
    }
}

impl From<tokio_util::sync::CancellationToken> for CancellationToken {
    fn from(inner: tokio_util::sync::CancellationToken) -> Self {
        Self { inner }
    }
}

/// Error returned when an operation is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelledError;

impl std::fmt::Display for CancelledError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Operation was cancelled")
    }
}

impl std::error::Error for CancelledError {}
