//! Retry logic with exponential backoff for transient provider errors.

use crate::context::CancelToken;
use crate::error::{ProviderError, ProviderResult};
use crate::types::RetryConfig;
use std::time::Duration;

/// Callback trait for retry progress notifications.
pub trait RetryCallback: Sync {
    /// Called when an operation is being retried.
    ///
    /// # Arguments
    /// * `resource` - Logical name of the resource
    /// * `attempt` - Attempt that just failed (1-indexed)
    /// * `max_attempts` - Maximum number of attempts
    /// * `error` - The error that triggered the retry
    /// * `delay` - Time until the next attempt
    fn on_retry(
        &self,
        resource: &str,
        attempt: u32,
        max_attempts: u32,
        error: &ProviderError,
        delay: Duration,
    );
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {
    fn on_retry(&self, _: &str, _: u32, _: u32, _: &ProviderError, _: Duration) {}
}

/// Callback that logs retries as warnings.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(
        &self,
        resource: &str,
        attempt: u32,
        max_attempts: u32,
        error: &ProviderError,
        delay: Duration,
    ) {
        log::warn!(
            "{resource}: attempt {attempt}/{max_attempts} failed: {error}. Retrying in {:.1}s",
            delay.as_secs_f64()
        );
    }
}

/// Outcome of a retried operation together with the attempts it took
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: ProviderResult<T>,
    pub attempts: u32,
}

/// Execute an operation with retry logic.
///
/// Retries the operation while it returns a retryable error, sleeping with
/// exponential backoff between attempts. Cancellation is checked before
/// every attempt and interrupts the backoff sleep; either way the result is
/// a [`ProviderError::cancelled`] error.
///
/// The operation receives the 1-indexed attempt number.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    cancel: &CancelToken,
    callback: &dyn RetryCallback,
    resource: &str,
    mut operation: F,
) -> Attempted<T>
where
    F: FnMut(u32) -> ProviderResult<T>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Attempted {
                result: Err(ProviderError::cancelled()),
                attempts: attempt,
            };
        }
        attempt += 1;

        let error = match operation(attempt) {
            Ok(value) => {
                return Attempted {
                    result: Ok(value),
                    attempts: attempt,
                };
            }
            Err(e) => e,
        };

        if !error.is_retryable() || attempt >= max_attempts {
            return Attempted {
                result: Err(error),
                attempts: attempt,
            };
        }

        let delay = config.delay_for_attempt(attempt - 1);
        callback.on_retry(resource, attempt, max_attempts, &error, delay);
        if !cancel.sleep(delay) {
            return Attempted {
                result: Err(ProviderError::cancelled()),
                attempts: attempt,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(max_attempts, Duration::from_millis(1), 2.0)
    }

    #[test]
    fn test_with_retry_success_first_try() {
        let outcome = with_retry(&fast(3), &CancelToken::new(), &NoCallback, "a", |_| Ok(42));
        assert_eq!(outcome.result.unwrap(), 42);
        assert_eq!(outcome.attempts, 1);
    }

    #[test]
    fn test_with_retry_non_retryable_error() {
        let calls = AtomicU32::new(0);
        let outcome = with_retry(&fast(5), &CancelToken::new(), &NoCallback, "a", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(ProviderError::permanent("bad input"))
        });
        assert_eq!(outcome.result.unwrap_err().message, "bad input");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_with_retry_eventual_success() {
        let outcome = with_retry(&fast(5), &CancelToken::new(), &NoCallback, "a", |attempt| {
            if attempt < 3 {
                Err(ProviderError::retryable("throttled"))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(outcome.result.unwrap(), 3);
        assert_eq!(outcome.attempts, 3);
    }

    #[test]
    fn test_with_retry_exhausted() {
        struct Recording(Mutex<Vec<u32>>);
        impl RetryCallback for Recording {
            fn on_retry(&self, _: &str, attempt: u32, _: u32, _: &ProviderError, _: Duration) {
                self.0.lock().unwrap().push(attempt);
            }
        }

        let callback = Recording(Mutex::new(Vec::new()));
        let outcome = with_retry(&fast(3), &CancelToken::new(), &callback, "a", |_| {
            Err::<(), _>(ProviderError::retryable("throttled"))
        });
        assert!(outcome.result.unwrap_err().is_retryable());
        assert_eq!(outcome.attempts, 3);
        assert_eq!(*callback.0.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_cancel_before_first_attempt() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let outcome = with_retry(&fast(3), &cancel, &NoCallback, "a", |_| Ok(()));
        assert!(outcome.result.unwrap_err().is_cancelled());
        assert_eq!(outcome.attempts, 0);
    }

    #[test]
    fn test_cancel_interrupts_backoff() {
        let cancel = CancelToken::new();
        let config = RetryConfig::new(5, Duration::from_secs(30), 2.0);
        let outcome = with_retry(&config, &cancel, &NoCallback, "a", |_| {
            cancel.cancel();
            Err::<(), _>(ProviderError::retryable("throttled"))
        });
        assert!(outcome.result.unwrap_err().is_cancelled());
        assert_eq!(outcome.attempts, 1);
    }
}
