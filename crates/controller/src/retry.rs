//! Readiness polling with exponential backoff.
//!
//! The only place the CLI retries: waiting for a freshly deployed or
//! restarted Controller to come online.

use crate::client::ControllerApi;
use crate::error::{Error, Result};
use crate::types::ControllerStatus;
use std::thread;
use std::time::Duration;

/// Backoff schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Delay before attempt `attempt + 1` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// A config that tries exactly once.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Notified before every wait.
pub trait RetryCallback {
    /// `attempt` is 1-indexed; `delay` is the upcoming wait.
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay: Duration);
}

/// Callback that logs at info level.
pub struct LogCallback;

impl RetryCallback for LogCallback {
    fn on_retry(&self, attempt: u32, max_attempts: u32, error: &Error, delay: Duration) {
        log::info!(
            "Attempt {}/{} failed: {}. Retrying in {:.1}s",
            attempt,
            max_attempts,
            error,
            delay.as_secs_f64()
        );
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// runs out of attempts.
pub fn with_retry<T, F>(
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut last_error: Option<Error> = None;

    for attempt in 0..config.max_attempts {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if attempt + 1 >= config.max_attempts {
                    last_error = Some(e);
                    break;
                }
                let delay = config.delay_for_attempt(attempt);
                if let Some(cb) = callback {
                    cb.on_retry(attempt + 1, config.max_attempts, &e, delay);
                }
                thread::sleep(delay);
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::Other("retry exhausted".to_string())))
}

/// Poll the Controller's status until it reports online.
pub fn wait_until_ready(
    api: &dyn ControllerApi,
    config: &RetryConfig,
    callback: Option<&dyn RetryCallback>,
) -> Result<ControllerStatus> {
    with_retry(config, callback, || {
        let status = api.status()?;
        if status.is_online() {
            Ok(status)
        } else {
            Err(Error::Http {
                method: "GET".to_string(),
                path: "/api/v3/status".to_string(),
                message: format!("controller is {}", status.status),
                status: Some(503),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockController;
    use std::cell::Cell;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(5),
        }
    }

    fn unavailable() -> Error {
        Error::Http {
            method: "GET".into(),
            path: "/api/v3/status".into(),
            message: "connection refused".into(),
            status: None,
        }
    }

    #[test]
    fn test_delay_for_attempt() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[test]
    fn test_non_retryable_stops_immediately() {
        let attempts = Cell::new(0);
        let result: Result<()> = with_retry(&fast(5), None, || {
            attempts.set(attempts.get() + 1);
            Err(Error::not_found("agent", "edge-1"))
        });
        assert!(result.is_err());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_eventual_success() {
        let attempts = Cell::new(0);
        let result = with_retry(&fast(3), None, || {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 3 {
                Err(unavailable())
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_callback_invoked_between_attempts() {
        struct Counting(Arc<AtomicU32>);
        impl RetryCallback for Counting {
            fn on_retry(&self, _: u32, _: u32, _: &Error, _: Duration) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let count = Arc::new(AtomicU32::new(0));
        let callback = Counting(count.clone());
        let _: Result<()> = with_retry(&fast(3), Some(&callback), || Err(unavailable()));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wait_until_ready() {
        let mock = MockController::new();
        mock.set_unready(2);
        let status = wait_until_ready(&mock, &fast(5), None).unwrap();
        assert!(status.is_online());
        assert_eq!(mock.calls().len(), 3);
    }

    #[test]
    fn test_wait_until_ready_gives_up() {
        let mock = MockController::new();
        mock.set_unready(10);
        let err = wait_until_ready(&mock, &fast(3), None).unwrap_err();
        assert!(err.to_string().contains("starting"));
    }
}
