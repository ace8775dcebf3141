// Copyright (c) 2026 AiVedha. All rights reserved.
// This software is proprietary and confidential.

/**
 * AiVedha Guard - Retry Policy
 * Exponential backoff with jitter for transient network failures
 *
 * @copyright 2026 AiVedha
 * @license Proprietary
 */

use crate::errors::AuditError;
use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy applied per transport attempt
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first; 1 disables retries
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Backoff multiplier per retry
    pub multiplier: f64,

    /// Upper bound on any single delay
    pub max_delay: Duration,

    /// Symmetric jitter fraction of the computed delay
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = 0.0;
        self
    }

    /// Delay before retry number `retry` (1-based): base * m^(retry-1),
    /// jittered by ±jitter, capped at max_delay
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = self.multiplier.powi(retry.saturating_sub(1) as i32);
        let mut millis = self.base_delay.as_millis() as f64 * exp;
        if self.jitter > 0.0 {
            let factor = rand::thread_rng().gen_range(1.0 - self.jitter..=1.0 + self.jitter);
            millis *= factor;
        }
        Duration::from_millis(millis as u64).min(self.max_delay)
    }
}

/// Run `operation` up to `policy.max_attempts` times, backing off between
/// retryable failures. `Retry-After` hints from the server take precedence
/// over the computed backoff.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, AuditError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, AuditError>>,
{
    let mut attempt = 1u32;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        "{} succeeded on attempt {}/{}",
                        operation_name, attempt, policy.max_attempts
                    );
                }
                return Ok(value);
            }
            Err(err) if attempt < policy.max_attempts && err.is_retryable() => {
                let delay = err.retry_after().unwrap_or_else(|| policy.delay_for(attempt));
                warn!(
                    "{} attempt {}/{} failed ({}), retrying in {:?}",
                    operation_name,
                    attempt,
                    policy.max_attempts,
                    err.kind(),
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if policy.max_attempts > 1 {
                    debug!(
                        "{} giving up after attempt {}/{}: {}",
                        operation_name, attempt, policy.max_attempts, err
                    );
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_exponentially_without_jitter() {
        let policy = RetryPolicy::default().without_jitter();
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(1000));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            max_delay: Duration::from_millis(600),
            jitter: 0.0,
            ..Default::default()
        };
        assert_eq!(policy.delay_for(5), Duration::from_millis(600));
    }

    #[test]
    fn jitter_stays_in_band() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let d = policy.delay_for(1).as_millis() as f64;
            assert!((200.0..=300.0).contains(&d), "delay {} out of band", d);
        }
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            jitter: 0.0,
            ..Default::default()
        };
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&policy, "probe", |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AuditError::Connect {
                        url: "https://example.org/".into(),
                        reason: "refused".into(),
                    })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn single_attempt_disables_retry() {
        let policy = RetryPolicy::default().with_max_attempts(1);
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&policy, "probe", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AuditError::Connect {
                    url: "https://example.org/".into(),
                    reason: "refused".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_retryable_fails_immediately() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(&policy, "probe", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AuditError::HttpStatus {
                    status: 404,
                    url: "https://example.org/".into(),
                    retry_after: None,
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
