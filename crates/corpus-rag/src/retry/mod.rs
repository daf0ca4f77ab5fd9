//! Bounded exponential backoff for flaky external calls

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::config::RetryConfig;
use crate::error::{Error, Result};

/// Retry policy wrapping any fallible async operation
///
/// Delays follow `min(base * multiplier^(attempt-1), max)`, optionally with
/// +/-10% jitter. The backoff sleep is a plain `tokio::time::sleep`, so
/// dropping the returned future cancels the wait along with the request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter: bool,
    /// Caller-supplied substrings that mark an error message retryable
    retryable_phrases: Vec<String>,
}

impl RetryPolicy {
    /// Create a policy from configuration
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter,
            retryable_phrases: Vec::new(),
        }
    }

    /// Extend the retryable classification with caller-supplied phrases
    pub fn with_retryable_phrases(mut self, phrases: Vec<String>) -> Self {
        self.retryable_phrases = phrases;
        self
    }

    /// Run `operation`, retrying retryable failures with backoff.
    /// Non-retryable failures and exhausted budgets re-raise the last error.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !self.is_retryable(&e) {
                        return Err(e);
                    }
                    if attempt < self.max_attempts {
                        let delay = self.delay_for_attempt(attempt);
                        tracing::warn!(
                            "Retryable failure (attempt {}/{}), retrying in {:?}: {}",
                            attempt,
                            self.max_attempts,
                            delay,
                            e
                        );
                        sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Internal("retry budget exhausted".to_string())))
    }

    /// Classify an error as retryable
    ///
    /// Network-class errors, rate-limit responses, and messages matching the
    /// caller-supplied phrase list are retryable; everything else is not.
    pub fn is_retryable(&self, error: &Error) -> bool {
        match error {
            Error::RateLimited(_) => true,
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => {
                let message = error.to_string().to_lowercase();
                if message.contains("rate limit")
                    || message.contains("too many requests")
                    || message.contains("429")
                    || message.contains("timed out")
                    || message.contains("connection refused")
                {
                    return true;
                }
                self.retryable_phrases
                    .iter()
                    .any(|phrase| message.contains(&phrase.to_lowercase()))
            }
        }
    }

    /// Backoff delay before the retry following `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let raw = self.base_delay.as_millis() as f64 * factor;
        let capped = raw.min(self.max_delay.as_millis() as f64);

        let millis = if self.jitter {
            let jitter = rand::thread_rng().gen_range(-0.1..=0.1);
            (capped * (1.0 + jitter)).max(0.0)
        } else {
            capped
        };

        Duration::from_millis(millis as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32, base_ms: u64, max_ms: u64, multiplier: f64) -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            max_attempts,
            base_delay_ms: base_ms,
            max_delay_ms: max_ms,
            backoff_multiplier: multiplier,
            jitter: false,
        })
    }

    #[test]
    fn backoff_schedule_doubles_then_caps() {
        let policy = policy(5, 1_000, 30_000, 2.0);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4_000));
        // Cap kicks in well before the raw exponential
        assert_eq!(policy.delay_for_attempt(20), Duration::from_millis(30_000));
    }

    #[tokio::test]
    async fn permanent_retryable_failure_is_attempted_exactly_max_times() {
        let policy = policy(3, 1, 10, 2.0);
        let attempts = AtomicU32::new(0);

        let result: Result<()> = policy
            .run(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::RateLimited("too many requests".to_string())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_failure_is_not_retried() {
        let policy = policy(3, 1, 10, 2.0);
        let attempts = AtomicU32::new(0);

        let result: Result<()> = policy
            .run(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Config("bad model".to_string())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = policy(3, 1, 10, 2.0);
        let attempts = AtomicU32::new(0);

        let result = policy
            .run(|| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(Error::RateLimited("slow down".to_string()))
                    } else {
                        Ok(42u32)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn caller_allow_list_extends_classification() {
        let policy = policy(3, 1, 10, 2.0).with_retryable_phrases(vec!["index warming".to_string()]);
        assert!(policy.is_retryable(&Error::Storage("index warming up".to_string())));
        assert!(!policy.is_retryable(&Error::Storage("constraint violated".to_string())));
    }
}
