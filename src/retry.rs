// src/retry.rs
//
// Copyright, 2025.  Signal65 / Futurum Group.
//
//! Retry policy for storage writes.
//!
//! The default policy is flat: a fixed number of immediate attempts and every
//! failure is retried. [`RetryPolicy::exponential`] adds a capped exponential
//! backoff with jitter and stops early on errors that cannot succeed on a
//! second try.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::constants::{DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_BACKOFF_MS, DEFAULT_UPLOAD_ATTEMPTS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; zero means retry immediately.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Add up to 25% random jitter to each delay.
    pub jitter: bool,
    /// Stop on errors classified as [`ErrorClassification::NonRetryable`].
    pub classify_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::flat(DEFAULT_UPLOAD_ATTEMPTS)
    }
}

impl RetryPolicy {
    /// Immediate re-attempts with no error discrimination.
    pub fn flat(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: false,
            classify_errors: false,
        }
    }

    /// Capped exponential backoff with jitter, giving up early on terminal errors.
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
            jitter: true,
            classify_errors: true,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_error_classification(mut self, classify: bool) -> Self {
        self.classify_errors = classify;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (0-based).
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        if self.initial_backoff.is_zero() {
            return Duration::ZERO;
        }
        let base_ms = self.initial_backoff.as_millis() as u64;
        let factor = 2u64.saturating_pow(attempt);
        let capped_ms = base_ms
            .saturating_mul(factor)
            .min(self.max_backoff.as_millis() as u64);

        let final_ms = if self.jitter {
            let jitter_range = capped_ms / 4;
            capped_ms.saturating_add(rand::rng().random_range(0..=jitter_range))
        } else {
            capped_ms
        };
        Duration::from_millis(final_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    Retryable,
    NonRetryable,
}

/// Classify a storage error from its rendered message chain.
///
/// Throttling, 5xx, timeouts and connection failures are retryable.
/// Permission, missing-resource and other 4xx failures are terminal.
/// Anything unrecognised is treated as retryable.
pub fn classify_error(error: &str) -> ErrorClassification {
    let error_lower = error.to_lowercase();

    if error_lower.contains("slowdown")
        || error_lower.contains("toomanyrequests")
        || error_lower.contains("throttl")
        || error_lower.contains("service unavailable")
        || error_lower.contains("internalerror")
        || error_lower.contains("500")
        || error_lower.contains("502")
        || error_lower.contains("503")
        || error_lower.contains("504")
        || error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection reset")
        || error_lower.contains("connection refused")
    {
        return ErrorClassification::Retryable;
    }

    if error_lower.contains("accessdenied")
        || error_lower.contains("access denied")
        || error_lower.contains("invalidaccesskeyid")
        || error_lower.contains("signaturedoesnotmatch")
        || error_lower.contains("nosuchbucket")
        || error_lower.contains("nosuchkey")
        || error_lower.contains("invalidrequest")
        || error_lower.contains("400")
        || error_lower.contains("403")
        || error_lower.contains("404")
    {
        return ErrorClassification::NonRetryable;
    }

    ErrorClassification::Retryable
}

/// The operation failed on its final attempt.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// Attempts actually made.
    pub attempts: u32,
    pub last_error: E,
}

/// Execute `operation` under `policy`.
///
/// Returns the first success, or the error of the last attempt made.
pub async fn with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        attempt += 1;
        let rendered = format!("{err:#}");

        if policy.classify_errors && classify_error(&rendered) == ErrorClassification::NonRetryable {
            warn!(operation = operation_name, attempt, error = %rendered, "non-retryable error");
            return Err(RetryExhausted { attempts: attempt, last_error: err });
        }
        if attempt >= max_attempts {
            warn!(operation = operation_name, attempt, error = %rendered, "retry budget exhausted");
            return Err(RetryExhausted { attempts: attempt, last_error: err });
        }

        let backoff = policy.backoff_duration(attempt - 1);
        warn!(
            operation = operation_name,
            attempt,
            remaining = max_attempts - attempt,
            backoff_ms = backoff.as_millis() as u64,
            error = %rendered,
            "attempt failed, retrying"
        );
        if !backoff.is_zero() {
            sleep(backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_policy_is_flat_three() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff_duration(0), Duration::ZERO);
        assert_eq!(policy.backoff_duration(5), Duration::ZERO);
        assert!(!policy.classify_errors);
    }

    #[test]
    fn test_backoff_duration_no_jitter() {
        let policy = RetryPolicy::exponential(5).with_jitter(false);
        assert_eq!(policy.backoff_duration(0), Duration::from_millis(100));
        assert_eq!(policy.backoff_duration(1), Duration::from_millis(200));
        assert_eq!(policy.backoff_duration(2), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_duration_capped() {
        let policy = RetryPolicy::exponential(5)
            .with_backoff(Duration::from_millis(1000), Duration::from_millis(2000))
            .with_jitter(false);
        assert_eq!(policy.backoff_duration(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff_duration(40), Duration::from_millis(2000));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::flat(0).max_attempts, 1);
        assert_eq!(RetryPolicy::default().with_max_attempts(0).max_attempts, 1);
    }

    #[test]
    fn test_classify_error() {
        assert_eq!(classify_error("SlowDown: reduce request rate"), ErrorClassification::Retryable);
        assert_eq!(classify_error("PutObject timed out after 5s"), ErrorClassification::Retryable);
        assert_eq!(classify_error("AccessDenied: nope"), ErrorClassification::NonRetryable);
        assert_eq!(classify_error("NoSuchBucket"), ErrorClassification::NonRetryable);
        assert_eq!(classify_error("something odd"), ErrorClassification::Retryable);
    }

    #[tokio::test]
    async fn test_flat_policy_retries_every_error_and_keeps_last() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let res: Result<(), _> = with_retry(&RetryPolicy::default(), "put", || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("AccessDenied #{n}")) }
        })
        .await;

        let exhausted = res.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(exhausted.last_error, "AccessDenied #2");
    }

    #[tokio::test]
    async fn test_success_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let res: Result<u32, RetryExhausted<String>> = with_retry(&RetryPolicy::default(), "put", || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err("503".to_string()) } else { Ok(n) } }
        })
        .await;
        assert_eq!(res.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_classifying_policy_stops_on_terminal_error() {
        let policy = RetryPolicy::exponential(5).with_backoff(Duration::from_millis(1), Duration::from_millis(1));
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let res: Result<(), _> = with_retry(&policy, "put", || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err("AccessDenied: key revoked".to_string()) }
        })
        .await;
        assert_eq!(res.unwrap_err().attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
