// src/retry.rs
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
        }
    }
}

/// Receives the final error of an operation that ran out of attempts.
/// Implementations must swallow their own failures.
#[async_trait]
pub trait FailureAlert: Send + Sync {
    async fn alert_failure(&self, operation: &str, last_error: &str, at: DateTime<Local>);
}

/// Runs `operation` until it succeeds or `policy.max_attempts` is reached.
/// On exhaustion the alert (if any) fires once and the last error is returned.
pub async fn with_retry<T, E, F, Fut>(
    label: &str,
    policy: &RetryPolicy,
    alert: Option<&dyn FailureAlert>,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("{} succeeded on attempt {}/{}", label, attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(e) if attempt >= max_attempts => {
                error!("{} failed after {} attempt(s): {}", label, attempt, e);
                if let Some(alert) = alert {
                    alert.alert_failure(label, &e.to_string(), Local::now()).await;
                }
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    label, attempt, max_attempts, e, policy.delay
                );
                sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use tokio::runtime::Runtime;

    #[derive(Default)]
    struct RecordingAlert {
        calls: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl FailureAlert for RecordingAlert {
        async fn alert_failure(&self, operation: &str, last_error: &str, _at: DateTime<Local>) {
            self.calls
                .lock()
                .unwrap()
                .push((operation.to_string(), last_error.to_string()));
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let rt = Runtime::new().unwrap();
        let attempts = AtomicU32::new(0);
        let alert = RecordingAlert::default();

        let result: Result<&str, String> = rt.block_on(with_retry(
            "fetch 22/01/2026",
            &fast_policy(),
            Some(&alert),
            || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("timeout #{}", n))
                } else {
                    Ok("page")
                }
            },
        ));

        assert_eq!(result, Ok("page"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(alert.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_exhaustion_alerts_once_and_returns_last_error() {
        let rt = Runtime::new().unwrap();
        let attempts = AtomicU32::new(0);
        let alert = RecordingAlert::default();

        let result: Result<(), String> =
            rt.block_on(with_retry("login", &fast_policy(), Some(&alert), || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                Err(format!("still on login page #{}", n))
            }));

        assert_eq!(result, Err("still on login page #3".to_string()));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        let calls = alert.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![("login".to_string(), "still on login page #3".to_string())]
        );
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        let rt = Runtime::new().unwrap();
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 0,
            delay: Duration::ZERO,
        };
        let result: Result<(), &str> = rt.block_on(with_retry("noop", &policy, None, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err("boom")
        }));
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
