//! Bounded exponential backoff for network collaborators.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Minimum pause requested by the remote side (e.g. a rate limit).
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub min_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Multiplier for each subsequent wait.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::page_fetch()
    }
}

impl RetryPolicy {
    /// Policy for page and image downloads: 3 attempts, 2s..10s.
    pub fn page_fetch() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
        }
    }

    /// Policy for vision model calls: 3 attempts, 4s..30s.
    pub fn vision() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }

    /// Retry without sleeping. Used by tests and local endpoints.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_factor: 1.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay after failed attempt `attempt` (1-indexed).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let secs = self.min_delay.as_secs_f64() * self.backoff_factor.powi((attempt - 1) as i32);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of attempts. The last error is returned unchanged.
pub async fn with_backoff<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && e.is_retryable() => {
                let mut delay = policy.delay_for(attempt);
                if let Some(requested) = e.retry_after() {
                    delay = delay.max(requested);
                }
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    label, attempt, policy.max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);

    impl Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky")
        }
    }

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn test_delay_progression_is_capped() {
        let policy = RetryPolicy::page_fetch();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, Flaky> = with_backoff(&RetryPolicy::immediate(3), "op", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(Flaky(true))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Flaky> = with_backoff(&RetryPolicy::immediate(2), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Flaky(true)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Flaky> = with_backoff(&RetryPolicy::immediate(5), "op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Flaky(false)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
