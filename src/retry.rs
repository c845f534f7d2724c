//! Registration retry with exponential backoff.
//!
//! This module provides [`RetryConfig`] and the [`retry_with_backoff`] helper
//! used by [`TypedSubscriber`](crate::TypedSubscriber) when a transport
//! reports a transient registration failure (for example a broker that is
//! still coming up).
//!
//! # Retry Strategy
//!
//! - Only [`Error::TransportRetryable`](crate::Error::TransportRetryable) is retried
//! - Exponential backoff with ±25% jitter
//! - Delay capped at `max_delay`
//! - Each attempt logged at debug level

use std::collections::hash_map::RandomState;
use std::future::Future;
use std::hash::BuildHasher;
use std::time::Duration;
use tokio::time::sleep;

use crate::{log_debug, Error};

/// Retry configuration with exponential backoff.
///
/// # Example
///
/// ```
/// use typed_sub::RetryConfig;
/// use std::time::Duration;
///
/// let retry_config = RetryConfig {
///     max_attempts: 5,
///     multiplier: 2.0,
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(10),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt (0 = no retries).
    pub max_attempts: u32,

    /// Backoff multiplier applied to the delay after each retry.
    pub multiplier: f32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    /// - `max_attempts`: 3
    /// - `multiplier`: 2.0
    /// - `initial_delay`: 100ms
    /// - `max_delay`: 5s
    fn default() -> Self {
        // ---
        Self {
            max_attempts: 3,
            multiplier: 2.0,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Run `operation`, retrying retryable transport errors with backoff.
///
/// With `retry_config == None` the operation runs exactly once. Errors other
/// than `TransportRetryable` are returned immediately.
pub(crate) async fn retry_with_backoff<F, Fut, T>(
    retry_config: Option<&RetryConfig>,
    mut operation: F,
) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let Some(retry_config) = retry_config else {
        return operation().await;
    };

    let mut attempt = 0;
    let mut current_delay = retry_config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(Error::TransportRetryable(details)) => {
                attempt += 1;

                if attempt > retry_config.max_attempts {
                    log_debug!(
                        "retry exhausted after {} attempts, last error: {details}",
                        retry_config.max_attempts
                    );
                    return Err(Error::TransportRetryable(details));
                }

                let jittered_delay = apply_jitter(current_delay);

                log_debug!(
                    "retry attempt {attempt}/{}, waiting {jittered_delay:?} (error: {details})",
                    retry_config.max_attempts
                );

                sleep(jittered_delay).await;

                let next_delay = Duration::from_secs_f64(
                    current_delay.as_secs_f64() * retry_config.multiplier as f64,
                );
                current_delay = next_delay.min(retry_config.max_delay);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Scale `delay` by a random factor in `0.75..=1.25`.
fn apply_jitter(delay: Duration) -> Duration {
    // ---
    let hash = RandomState::new().hash_one(std::time::SystemTime::now());
    let random_factor = (hash % 1000) as f64 / 1000.0;

    Duration::from_secs_f64(delay.as_secs_f64() * (0.75 + random_factor * 0.5))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            multiplier: 2.0,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn none_config_executes_once() {
        // ---
        let calls = Arc::new(AtomicU32::new(0));

        let result = retry_with_backoff(None, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::TransportRetryable("broker starting".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(Error::TransportRetryable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        // ---
        let calls = Arc::new(AtomicU32::new(0));
        let config = fast_config(3);

        let result = retry_with_backoff(Some(&config), || {
            let calls = calls.clone();
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::TransportRetryable("not yet".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        // ---
        let calls = Arc::new(AtomicU32::new(0));
        let config = fast_config(2);

        let result = retry_with_backoff(Some(&config), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::TransportRetryable("down".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(Error::TransportRetryable(_))));
        // initial attempt + 2 retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_fails_fast() {
        // ---
        let calls = Arc::new(AtomicU32::new(0));
        let config = fast_config(5);

        let result = retry_with_backoff(Some(&config), || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Transport("refused".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        // ---
        let delay = Duration::from_millis(100);

        for _ in 0..100 {
            let jittered = apply_jitter(delay);
            assert!(jittered >= Duration::from_millis(75), "too low: {jittered:?}");
            assert!(jittered <= Duration::from_millis(125), "too high: {jittered:?}");
        }
    }
}
