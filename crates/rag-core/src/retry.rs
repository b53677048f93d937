//! Bounded retry with exponential backoff and per-attempt timeouts.
//!
//! Only calls to external collaborators go through here. None of them mutate
//! the chunk store, so repeating an attempt is always safe.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RagError, Result};

/// Retry and timeout settings for one external call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubled on every further retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for a single backoff delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Timeout applied to each attempt.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            timeout_ms: 60_000,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_timeout_ms() -> u64 {
    60_000
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are exhausted.
///
/// Every attempt is bounded by `policy.timeout_ms`; an elapsed timeout is
/// reported as [`RagError::Timeout`] and counts as retryable.
pub async fn with_retry<T, F, Fut>(service: &str, policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let timeout = Duration::from_millis(policy.timeout_ms);
    let mut attempt = 0;

    loop {
        let result = match tokio::time::timeout(timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(RagError::Timeout {
                service: service.to_string(),
                timeout_ms: policy.timeout_ms,
            }),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                let wait = policy.delay_for(attempt);
                warn!(
                    service,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    wait_ms = wait.as_millis() as u64,
                    error = %err,
                    "retryable error, backing off"
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
            timeout_ms: 50,
        }
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(10_000));
        assert_eq!(policy.delay_for(80), Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_retry("test", &fast_policy(3), move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(RagError::transient("test", "flaky"))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = with_retry("test", &fast_policy(2), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(RagError::transient("test", "down"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = with_retry("test", &fast_policy(5), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(RagError::permanent("test", "unauthorized"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let result: Result<()> = with_retry("slow", &fast_policy(1), || async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        })
        .await;

        match result {
            Err(RagError::Timeout { service, .. }) => assert_eq!(service, "slow"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
