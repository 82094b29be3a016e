//! Retry logic with exponential backoff.
//!
//! Provides configurable retry behavior for read operations with:
//! - Exponential backoff (`base_delay * multiplier^attempt`)
//! - Optional delay cap and jitter
//! - Retry eligibility driven by error classification
//! - Cancellation of both the in-flight call and the backoff wait
//! - Statistics tracking
//!
//! Writes run with [`RetryConfig::no_retry`]: replaying a non-idempotent
//! request after an ambiguous failure could apply it twice.

use super::classify::{classify, ErrorClassification, ErrorKind};
use super::transport::TransportFailure;
use crate::cancel::CancellationToken;
use crate::config::RetryDefaults;
use rand::Rng;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt; total calls are `max_retries + 1`.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor per attempt, at least 1.
    pub backoff_multiplier: f64,
    /// Statuses eligible for retry.
    pub retryable_statuses: HashSet<u16>,
    /// Cap for a single delay; `None` leaves it unbounded.
    pub max_delay: Option<Duration>,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: RetryDefaults::MAX_RETRIES,
            base_delay: RetryDefaults::BASE_DELAY,
            backoff_multiplier: RetryDefaults::MULTIPLIER,
            retryable_statuses: RetryDefaults::RETRYABLE_STATUSES.into_iter().collect(),
            max_delay: None,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Config for non-idempotent operations: a single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the growth factor. Values below 1 are raised to 1.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Calculate the delay before retry number `attempt + 1` (0-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let mut secs = self.base_delay.as_secs_f64() * multiplier;
        if let Some(max) = self.max_delay {
            secs = secs.min(max.as_secs_f64());
        }

        if self.jitter {
            // Scale by a factor in [0.5, 1.5) so the mean stays put without
            // allowing near-zero delays.
            let factor = rand::rng().random_range(0.5..1.5);
            secs *= factor;
            if let Some(max) = self.max_delay {
                secs = secs.min(max.as_secs_f64());
            }
        }

        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Classify a failure, applying this config's retryable statuses.
    ///
    /// Connection failures stay retryable. A status failure is retryable iff
    /// its status is in `retryable_statuses`; conflicts never are.
    pub fn classify(&self, failure: &TransportFailure) -> ErrorClassification {
        let mut classification = classify(failure);
        if let Some(status) = failure.status() {
            classification.retryable = classification.kind != ErrorKind::Conflict
                && self.retryable_statuses.contains(&status);
        }
        classification
    }
}

/// Whether a failure with `classification` on `attempt` (0-indexed) gets another try.
pub fn should_retry(classification: &ErrorClassification, attempt: u32, config: &RetryConfig) -> bool {
    classification.retryable && attempt < config.max_retries
}

/// Backoff delay after `attempt` (0-indexed).
pub fn delay_for(attempt: u32, config: &RetryConfig) -> Duration {
    config.delay_for(attempt)
}

/// Statistics about a retry operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    /// Number of attempts made.
    pub attempts: u32,
    /// Total delay accumulated.
    pub total_delay: Duration,
    /// Whether the operation ultimately succeeded.
    pub success: bool,
    /// Last error message if failed.
    pub last_error: Option<String>,
}

/// Terminal outcome of a failed retry loop.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// The last error was terminal, or the retry budget ran out.
    Exhausted {
        error: E,
        classification: ErrorClassification,
    },
    /// The token was cancelled during a call or a backoff wait.
    Cancelled,
}

/// Retry an async operation with exponential backoff.
///
/// # Arguments
///
/// * `config` - Retry configuration
/// * `cancel` - Token scoped to the logical operation
/// * `operation` - Called with the 0-indexed attempt; each call is a fresh request
/// * `classify` - Classification used to decide retry eligibility
///
/// # Returns
///
/// A tuple of (Result, RetryStats)
pub async fn retry_async<F, Fut, T, E, C>(
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
    classify: C,
) -> (Result<T, RetryError<E>>, RetryStats)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    C: Fn(&E) -> ErrorClassification,
{
    let mut stats = RetryStats::default();
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return (Err(RetryError::Cancelled), stats);
        }
        stats.attempts = attempt + 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return (Err(RetryError::Cancelled), stats),
            outcome = operation(attempt) => outcome,
        };

        let error = match outcome {
            Ok(value) => {
                stats.success = true;
                if attempt > 0 {
                    debug!("Operation succeeded after {} attempts", attempt + 1);
                }
                return (Ok(value), stats);
            }
            Err(e) => e,
        };

        stats.last_error = Some(error.to_string());
        let classification = classify(&error);

        if !should_retry(&classification, attempt, config) {
            if classification.retryable {
                warn!(
                    "All {} attempts exhausted. Last error: {}",
                    attempt + 1,
                    error
                );
            } else {
                debug!("Error is not retryable ({}): {}", classification.kind, error);
            }
            return (
                Err(RetryError::Exhausted {
                    error,
                    classification,
                }),
                stats,
            );
        }

        let delay = config.delay_for(attempt);
        stats.total_delay += delay;
        warn!(
            "Attempt {}/{} failed: {}. Retrying in {:?}",
            attempt + 1,
            config.max_retries.saturating_add(1),
            error,
            delay
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return (Err(RetryError::Cancelled), stats),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::classify::Severity;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    const SERVER: ErrorClassification =
        ErrorClassification::new(ErrorKind::Server, true, Severity::High);
    const CONFLICT: ErrorClassification =
        ErrorClassification::new(ErrorKind::Conflict, false, Severity::Medium);

    fn status(code: u16) -> TransportFailure {
        TransportFailure::Status {
            status: code,
            message: String::new(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    #[test]
    fn test_delay_growth() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(1))
            .with_backoff_multiplier(2.0);

        assert_eq!(delay_for(0, &config), Duration::from_secs(1));
        assert_eq!(delay_for(1, &config), Duration::from_secs(2));
        assert_eq!(delay_for(2, &config), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(10))
            .with_max_delay(Duration::from_secs(30));

        // 10 * 2^3 = 80s, but capped at 30s
        assert_eq!(config.delay_for(3), Duration::from_secs(30));
    }

    #[test]
    fn test_delay_unbounded_without_cap() {
        let config = RetryConfig::new().with_base_delay(Duration::from_secs(1));
        assert_eq!(config.delay_for(10), Duration::from_secs(1024));
        // Absurd attempts saturate instead of panicking.
        assert_eq!(config.delay_for(5_000), Duration::MAX);
    }

    #[test]
    fn test_delay_with_jitter() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(2))
            .with_jitter(true);

        for _ in 0..20 {
            let delay = config.delay_for(0);
            assert!(
                delay >= Duration::from_secs(1) && delay <= Duration::from_secs(3),
                "Delay {:?} should be between 1s and 3s",
                delay
            );
        }
    }

    #[test]
    fn test_jitter_respects_cap() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(10))
            .with_max_delay(Duration::from_secs(10))
            .with_jitter(true);
        for _ in 0..20 {
            assert!(config.delay_for(2) <= Duration::from_secs(10));
        }
    }

    #[test]
    fn test_should_retry_budget() {
        let config = RetryConfig::new().with_max_retries(2);
        assert!(should_retry(&SERVER, 0, &config));
        assert!(should_retry(&SERVER, 1, &config));
        assert!(!should_retry(&SERVER, 2, &config));
        assert!(!should_retry(&CONFLICT, 0, &config));
        assert!(!should_retry(&SERVER, 0, &RetryConfig::no_retry()));
    }

    #[test]
    fn test_retryable_statuses_override() {
        let config = RetryConfig::new().with_retryable_statuses([503, 412]);
        assert!(config.classify(&status(503)).retryable);
        assert!(!config.classify(&status(500)).retryable);
        // Conflicts stay terminal even if listed.
        assert!(!config.classify(&status(412)).retryable);
        // Connection failures do not depend on the status set.
        assert!(config.classify(&TransportFailure::connection("x")).retryable);
    }

    #[test]
    fn test_default_statuses_match_classifier() {
        let config = RetryConfig::default();
        for code in [400, 401, 404, 409, 412, 418, 500, 502, 503, 504] {
            assert_eq!(config.classify(&status(code)), classify(&status(code)), "status {}", code);
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let config = RetryConfig::new().with_max_retries(3);

        let (result, stats) = retry_async(
            &config,
            &CancellationToken::new(),
            |_| async { Ok::<_, String>(42) },
            |_: &String| SERVER,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(stats.attempts, 1);
        assert!(stats.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let config = RetryConfig::new()
            .with_max_retries(3)
            .with_base_delay(Duration::from_millis(10));

        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let (result, stats) = retry_async(
            &config,
            &CancellationToken::new(),
            |_| {
                let counter = counter_clone.clone();
                async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err("temporary failure".to_string())
                    } else {
                        Ok(42)
                    }
                }
            },
            |_: &String| SERVER,
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.total_delay, Duration::from_millis(30));
        assert!(stats.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_makes_four_calls() {
        let config = RetryConfig::new().with_max_retries(3);
        let calls = Arc::new(AtomicU32::new(0));

        let (result, stats) = retry_async(
            &config,
            &CancellationToken::new(),
            |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>("always fails".to_string())
                }
            },
            |_: &String| SERVER,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(stats.attempts, 4);
        assert_eq!(stats.total_delay, Duration::from_secs(1 + 2 + 4));
        assert!(!stats.success);
        assert_eq!(stats.last_error, Some("always fails".to_string()));
        match result {
            Err(RetryError::Exhausted { classification, .. }) => {
                assert_eq!(classification, SERVER)
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_budget_logs_without_overflow() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_test_writer()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let config = RetryConfig::new()
            .with_max_retries(u32::MAX)
            .with_base_delay(Duration::from_millis(1));
        let calls = AtomicU32::new(0);

        let (result, stats) = retry_async(
            &config,
            &CancellationToken::new(),
            |_| {
                let count = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if count < 2 {
                        Err("flaky".to_string())
                    } else {
                        Ok(7)
                    }
                }
            },
            |_: &String| SERVER,
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(stats.attempts, 3);
    }

    #[tokio::test]
    async fn test_retry_non_retryable_error() {
        let config = RetryConfig::new().with_max_retries(3);

        let (result, stats) = retry_async(
            &config,
            &CancellationToken::new(),
            |_| async { Err::<i32, _>("version mismatch".to_string()) },
            |_: &String| CONFLICT,
        )
        .await;

        assert!(matches!(result, Err(RetryError::Exhausted { .. })));
        assert_eq!(stats.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff_prevents_retry() {
        let config = RetryConfig::new()
            .with_max_retries(3)
            .with_base_delay(Duration::from_secs(10));
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        token.cancel_after(Duration::from_secs(5));

        let (result, stats) = retry_async(
            &config,
            &token,
            |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<i32, _>("down".to_string())
                }
            },
            |_: &String| SERVER,
        )
        .await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(stats.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_in_flight_call() {
        let token = CancellationToken::new();
        token.cancel_after(Duration::from_secs(1));

        let (result, _) = retry_async(
            &RetryConfig::new(),
            &token,
            |_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, String>(1)
            },
            |_: &String| SERVER,
        )
        .await;

        assert_eq!(result, Err(RetryError::Cancelled));
    }

    #[tokio::test]
    async fn test_already_cancelled_makes_no_call() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = AtomicU32::new(0);

        let (result, stats) = retry_async(
            &RetryConfig::new(),
            &token,
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, String>(1) }
            },
            |_: &String| SERVER,
        )
        .await;

        assert_eq!(result, Err(RetryError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(stats.attempts, 0);
    }
}
