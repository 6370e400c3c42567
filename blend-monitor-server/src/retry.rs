use std::future::Future;
use std::time::Duration;

use crate::db::DbError;

/// Bounded retry with a delay that grows linearly with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; attempt `n` waits `n * base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Errors that know whether another attempt could succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for DbError {
    fn is_transient(&self) -> bool {
        DbError::is_transient(self)
    }
}

/// Runs `operation` until it succeeds, fails with a permanent error, or the
/// policy's attempts are used up. The last error is returned on failure.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut operation: F) -> Result<T, E>
where
    E: Transient + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!("{} succeeded on attempt {}/{}", label, attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    "{} failed with transient error (attempt {}/{}), retrying in {:?}: {}",
                    label, attempt, max_attempts, delay, e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    tracing::error!("{} failed after {} attempts: {}", label, attempt, e);
                } else {
                    tracing::error!("{} failed with permanent error: {}", label, e);
                }
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn delay_is_linear() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn two_transient_failures_then_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<&str, DbError> = retry(&fast_policy(), "list users", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(DbError::Unavailable("connection terminated".into()))
            } else {
                Ok("users")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "users");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), DbError> = retry(&fast_policy(), "list users", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(DbError::Unavailable("connection refused".into()))
        })
        .await;

        assert!(matches!(result, Err(DbError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), DbError> = retry(&fast_policy(), "list users", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(DbError::Pool("pool closed".into()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
