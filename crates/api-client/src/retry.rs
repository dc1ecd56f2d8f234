// In crates/api-client/src/retry.rs

use crate::{Error, Result};
use app_config::RetrySettings;
use std::future::Future;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};

/// Bounded exponential backoff with jitter, applied only to transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay_ms: settings.base_delay_ms,
            max_delay_ms: settings.max_delay_ms,
        }
    }

    /// A single attempt and no retries.
    pub fn none() -> Self {
        Self { max_attempts: 1, base_delay_ms: 0, max_delay_ms: 0 }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Delays between attempts: base, 2*base, 4*base... capped, then jittered.
    fn delays(&self) -> impl Iterator<Item = Duration> + Send {
        // from_millis(2) yields 2, 4, 8...; the factor scales that so the first delay is the base.
        ExponentialBackoff::from_millis(2)
            .factor((self.base_delay_ms / 2).max(1))
            .max_delay(Duration::from_millis(self.max_delay_ms))
            .map(jitter)
            .take(self.max_attempts.saturating_sub(1))
    }

    /// Runs `action`, retrying while it fails with a transient error.
    pub async fn run<T, F, Fut>(&self, op: &'static str, action: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        RetryIf::spawn(self.delays(), action, |e: &Error| {
            let transient = e.is_transient();
            if transient {
                tracing::warn!(op, error = %e, "Transient exchange error, retrying.");
            }
            transient
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::from_settings(&RetrySettings { max_attempts, base_delay_ms: 200, max_delay_ms: 2_000 })
    }

    #[test]
    fn delays_are_bounded() {
        let delays: Vec<Duration> = policy(5).delays().collect();
        assert_eq!(delays.len(), 4);
        assert!(delays.iter().all(|d| *d <= Duration::from_millis(2_000)));
        assert_eq!(RetryPolicy::none().delays().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = policy(3)
            .run("test", || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Network("connection reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_are_bounded() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<()> = policy(3)
            .run("test", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Http { status: 503, body: String::new() })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rejections_fail_immediately() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<()> = policy(3)
            .run("test", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::ApiError { code: 101204, msg: "Insufficient margin".into() })
            })
            .await;
        assert!(matches!(result, Err(Error::ApiError { code: 101204, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
