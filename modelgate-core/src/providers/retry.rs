//! Retry policy with exponential backoff
//!
//! This module implements configurable retry policies with exponential backoff,
//! jitter, and `Retry-After` handling. Only retryable error kinds are retried,
//! and unclassified transport faults get a tighter cap than the rest.

use crate::config::ValidationError;
use crate::providers::error::InvokeError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    pub initial_delay_ms: u64,

    /// Maximum delay between retries (milliseconds)
    pub max_delay_ms: u64,

    /// Base for exponential backoff (e.g., 2.0 for doubling)
    #[serde(alias = "exponential_base")]
    pub backoff_multiplier: f64,

    /// Jitter factor (0.0 to 1.0) to randomize delays
    pub jitter_factor: f64,

    /// Whether to wait as long as the vendor's `Retry-After` asks
    pub respect_retry_after: bool,

    /// Longest `Retry-After` worth waiting for; a longer hint ends the retries
    pub max_retry_after_ms: u64,

    /// Attempt cap applied when the last failure was an unclassified transport fault
    pub max_unknown_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            respect_retry_after: true,
            max_retry_after_ms: 60_000,
            max_unknown_attempts: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Create a policy with a single attempt
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Disable jitter and shrink delays, for deterministic tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            jitter_factor: 0.0,
            respect_retry_after: false,
            ..Default::default()
        }
    }

    /// Calculate the delay before retry number `retry` (zero-based)
    pub fn calculate_delay(&self, retry: u32, error: &InvokeError) -> Duration {
        if let Some(retry_after) = self.vendor_delay(error) {
            return retry_after.min(self.max_retry_after());
        }

        let base_delay =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi(retry as i32);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let delay_with_jitter = if self.jitter_factor > 0.0 {
            let jitter_range = capped_delay * self.jitter_factor;
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped_delay + jitter).max(0.0)
        } else {
            capped_delay
        };

        Duration::from_millis(delay_with_jitter as u64)
    }

    /// Check whether another attempt is allowed after `attempts_made` attempts
    pub fn should_retry(&self, error: &InvokeError, attempts_made: u32) -> bool {
        if attempts_made >= self.max_attempts {
            return false;
        }

        if matches!(error, InvokeError::UnknownTransport { .. })
            && attempts_made >= self.max_unknown_attempts
        {
            return false;
        }

        if let Some(retry_after) = self.vendor_delay(error) {
            if retry_after > self.max_retry_after() {
                warn!(
                    retry_after_ms = retry_after.as_millis() as u64,
                    max_retry_after_ms = self.max_retry_after_ms,
                    "vendor asked for a longer wait than allowed; not retrying"
                );
                return false;
            }
        }

        error.is_retryable()
    }

    /// The vendor's `Retry-After`, when this policy honours it
    fn vendor_delay(&self, error: &InvokeError) -> Option<Duration> {
        match self.respect_retry_after {
            true => error.retry_after(),
            false => None,
        }
    }

    fn max_retry_after(&self) -> Duration {
        Duration::from_millis(self.max_retry_after_ms)
    }

    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.max_attempts == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.max_attempts", path),
                "Must be at least 1",
            ));
        }

        if self.max_delay_ms < self.initial_delay_ms {
            return Err(ValidationError::out_of_range(
                format!("{}.max_delay_ms", path),
                "Must be >= initial_delay_ms",
            ));
        }

        if self.max_retry_after_ms == 0 && self.respect_retry_after {
            return Err(ValidationError::out_of_range(
                format!("{}.max_retry_after_ms", path),
                "Must be greater than 0 when respect_retry_after is set",
            ));
        }

        if self.backoff_multiplier < 1.0 {
            return Err(ValidationError::out_of_range(
                format!("{}.backoff_multiplier", path),
                "Must be at least 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ValidationError::out_of_range(
                format!("{}.jitter_factor", path),
                "Must be between 0.0 and 1.0",
            ));
        }

        Ok(())
    }
}

/// Result of a retried operation
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Final result; on failure, the last classified error unchanged
    pub result: Result<T, InvokeError>,

    /// Attempts made, including the first
    pub attempts: u32,

    /// Total time spent sleeping between attempts
    pub total_delay: Duration,
}

/// Executor for retry operations
pub struct RetryExecutor<'a> {
    policy: &'a RetryPolicy,
}

impl<'a> RetryExecutor<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `operation` until it succeeds, fails fatally, or attempts run out.
    ///
    /// The closure receives the one-based attempt number.
    pub async fn execute<F, T, Fut>(&self, mut operation: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, InvokeError>>,
    {
        let mut attempts = 0;
        let mut total_delay = Duration::ZERO;

        loop {
            attempts += 1;
            match operation(attempts).await {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts,
                        total_delay,
                    };
                }
                Err(error) => {
                    if !self.policy.should_retry(&error, attempts) {
                        return RetryOutcome {
                            result: Err(error),
                            attempts,
                            total_delay,
                        };
                    }

                    let delay = self.policy.calculate_delay(attempts - 1, &error);
                    warn!(
                        attempt = attempts,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying after retryable failure"
                    );
                    total_delay += delay;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn server_error() -> InvokeError {
        InvokeError::ServerUnavailable {
            status: Some(503),
            message: "unavailable".into(),
        }
    }

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay_ms, 100);
        assert_eq!(policy.backoff_multiplier, 2.0);
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 1000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
            respect_retry_after: false,
            max_retry_after_ms: 60_000,
            max_unknown_attempts: 2,
        };

        let error = server_error();
        assert_eq!(policy.calculate_delay(0, &error).as_millis(), 100);
        assert_eq!(policy.calculate_delay(1, &error).as_millis(), 200);
        assert_eq!(policy.calculate_delay(2, &error).as_millis(), 400);
        assert_eq!(policy.calculate_delay(3, &error).as_millis(), 800);
        assert_eq!(policy.calculate_delay(4, &error).as_millis(), 1000);
    }

    #[test]
    fn test_retry_after_respected() {
        let policy = RetryPolicy::default();
        let error = InvokeError::RateLimit {
            message: "slow down".into(),
            retry_after: Some(Duration::from_secs(5)),
        };
        assert_eq!(policy.calculate_delay(0, &error).as_secs(), 5);
    }

    #[test]
    fn test_long_retry_after_stops_retrying() {
        let policy = RetryPolicy {
            max_retry_after_ms: 10_000,
            ..RetryPolicy::default()
        };
        let error = InvokeError::RateLimit {
            message: "come back tomorrow".into(),
            retry_after: Some(Duration::from_secs(86_400)),
        };
        assert!(!policy.should_retry(&error, 1));
        assert_eq!(policy.calculate_delay(0, &error), Duration::from_secs(10));

        let ignoring = RetryPolicy {
            respect_retry_after: false,
            ..policy
        };
        assert!(ignoring.should_retry(&error, 1));
        assert!(ignoring.calculate_delay(0, &error) <= Duration::from_millis(220));
    }

    #[tokio::test]
    async fn test_executor_surfaces_long_retry_after_immediately() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let outcome: RetryOutcome<()> = RetryExecutor::new(&policy)
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(InvokeError::RateLimit {
                        message: "slow down".into(),
                        retry_after: Some(Duration::from_secs(u64::MAX)),
                    })
                }
            })
            .await;

        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.total_delay, Duration::ZERO);
        assert!(matches!(outcome.result, Err(InvokeError::RateLimit { .. })));
    }

    #[test]
    fn test_should_retry_logic() {
        let policy = RetryPolicy::new(3);
        let error = server_error();
        assert!(policy.should_retry(&error, 1));
        assert!(policy.should_retry(&error, 2));
        assert!(!policy.should_retry(&error, 3));

        let auth = InvokeError::Auth { message: "bad key".into() };
        assert!(!policy.should_retry(&auth, 1));
    }

    #[test]
    fn test_unknown_transport_is_capped() {
        let policy = RetryPolicy::new(5);
        let error = InvokeError::UnknownTransport { message: "??".into() };
        assert!(policy.should_retry(&error, 1));
        assert!(!policy.should_retry(&error, 2));
    }

    #[tokio::test]
    async fn test_executor_surfaces_last_error_after_exhaustion() {
        let policy = RetryPolicy::immediate(3);
        let calls = AtomicU32::new(0);

        let outcome: RetryOutcome<()> = RetryExecutor::new(&policy)
            .execute(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(server_error()) }
            })
            .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            outcome.result,
            Err(InvokeError::ServerUnavailable { status: Some(503), .. })
        ));
    }

    #[tokio::test]
    async fn test_executor_recovers() {
        let policy = RetryPolicy::immediate(3);

        let outcome = RetryExecutor::new(&policy)
            .execute(|attempt| async move {
                if attempt < 2 {
                    Err(server_error())
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), 2);
        assert_eq!(outcome.attempts, 2);
    }
}
