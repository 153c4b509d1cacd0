//! Retry with exponential backoff and jitter.

use crate::{CoreError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Short-lived operations: indexer/download-client polling.
    pub fn quick() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Long-running operations: grabs, imports.
    pub fn slow() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum RetryPolicy {
    All,
    Transient,
    Never,
}

pub async fn retry_with_backoff<F, Fut, T>(
    config: RetryConfig,
    policy: RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        debug!(operation = operation_name, attempt, max = config.max_attempts, "attempting");

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if !should_retry(&err, policy) {
                    debug!(operation = operation_name, %err, "non-retryable error");
                    return Err(err);
                }

                if attempt >= config.max_attempts {
                    error!(operation = operation_name, attempts = config.max_attempts, %err, "retries exhausted");
                    return Err(CoreError::RetryExhausted {
                        operation: operation_name.to_string(),
                        attempts: config.max_attempts,
                        last_error: Box::new(err),
                    });
                }

                warn!(operation = operation_name, attempt, max = config.max_attempts, %err, ?delay, "retrying");
                sleep(delay).await;
                delay = calculate_next_delay(delay, &config);
            }
        }
    }
}

fn should_retry(error: &CoreError, policy: RetryPolicy) -> bool {
    match policy {
        RetryPolicy::Never => false,
        RetryPolicy::All => true,
        RetryPolicy::Transient => error.is_transient(),
    }
}

fn calculate_next_delay(current: Duration, config: &RetryConfig) -> Duration {
    let mut next = current.mul_f64(config.backoff_multiplier);
    if next > config.max_delay {
        next = config.max_delay;
    }
    if config.jitter {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let jitter_factor = rng.gen_range(0.5..1.5);
        next = next.mul_f64(jitter_factor);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_without_retry() {
        let result = retry_with_backoff(RetryConfig::quick(), RetryPolicy::All, "noop", || async {
            Ok::<_, CoreError>(42)
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();
        let result = retry_with_backoff(RetryConfig::quick(), RetryPolicy::Transient, "flaky", move || {
            let a = a.clone();
            async move {
                if a.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CoreError::NetworkError { message: "boom".into() })
                } else {
                    Ok(1)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let attempts = Arc::new(AtomicU32::new(0));
        let a = attempts.clone();
        let result: Result<()> = retry_with_backoff(RetryConfig::quick(), RetryPolicy::Transient, "bad", move || {
            let a = a.clone();
            async move {
                a.fetch_add(1, Ordering::SeqCst);
                Err(CoreError::ValidationError { field: "x".into(), message: "bad".into() })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_retries_and_wraps_last_error() {
        let result: Result<()> = retry_with_backoff(
            RetryConfig { max_attempts: 2, initial_delay: Duration::from_millis(1), max_delay: Duration::from_millis(2), backoff_multiplier: 2.0, jitter: false },
            RetryPolicy::All,
            "always-fails",
            || async { Err(CoreError::TemporaryError { message: "nope".into() }) },
        )
        .await;
        assert!(matches!(result, Err(CoreError::RetryExhausted { attempts: 2, .. })));
    }
}
