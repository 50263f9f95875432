//! Retry policies with exponential backoff
//!
//! Transient store failures (network, timeouts, 408/429/5xx) are retried;
//! everything else fails on the first attempt.

use super::StoreError;
use log::{debug, warn};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No retries and no waiting (tests)
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(0),
            max_delay: Duration::from_millis(0),
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

/// Types of errors and their retry behavior
#[derive(Debug, Clone, PartialEq)]
pub enum RetryableError {
    /// Network-level errors (connection refused, DNS, etc)
    Network,
    /// HTTP 5xx server errors
    ServerError(u16),
    /// HTTP 429 Too Many Requests
    RateLimited,
    /// HTTP 408 or a local call timeout
    Timeout,
    /// Non-retryable client errors (4xx except 408, 429)
    ClientError(u16),
    /// Missing documents, version conflicts, bad payloads
    Permanent,
}

impl RetryableError {
    /// Determine if this error type should be retried
    pub fn should_retry(&self) -> bool {
        match self {
            RetryableError::Network => true,
            RetryableError::ServerError(_) => true,
            RetryableError::RateLimited => true,
            RetryableError::Timeout => true,
            RetryableError::ClientError(_) => false,
            RetryableError::Permanent => false,
        }
    }

    /// Classify an HTTP status code into retry behavior
    pub fn from_status_code(status: u16) -> Self {
        match status {
            408 => RetryableError::Timeout,
            429 => RetryableError::RateLimited,
            400..=499 => RetryableError::ClientError(status),
            500..=599 => RetryableError::ServerError(status),
            _ => RetryableError::Permanent,
        }
    }

    pub fn from_store_error(error: &StoreError) -> Self {
        match error {
            StoreError::Unavailable(_) => RetryableError::Network,
            StoreError::Timeout(_) => RetryableError::Timeout,
            StoreError::Http { status, .. } => Self::from_status_code(*status),
            StoreError::NotFound { .. } | StoreError::Conflict { .. } | StoreError::Serialization(_) => {
                RetryableError::Permanent
            }
        }
    }
}

/// Retry policy that implements exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute a store call with retry logic
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!("Store call succeeded after {} attempts", attempt);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    let should_retry = RetryableError::from_store_error(&error).should_retry();
                    if !should_retry || attempt >= max_attempts {
                        if should_retry {
                            warn!("Store call failed permanently on attempt {}: {}", attempt, error);
                        }
                        return Err(error);
                    }

                    let delay = self.calculate_delay(attempt);
                    warn!(
                        "Store call failed on attempt {}/{} (retrying in {:?}): {}",
                        attempt, max_attempts, delay, error
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Calculate exponential backoff delay with optional jitter
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.config.base_delay.as_millis() as f64)
            * self.config.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let mut delay = Duration::from_millis(delay_ms as u64);

        if delay > self.config.max_delay {
            delay = self.config.max_delay;
        }

        // Spread concurrent retries apart
        if self.config.jitter && !delay.is_zero() {
            let jitter_factor = rand::thread_rng().gen_range(0.5..=1.5);
            let jittered_ms = (delay.as_millis() as f64 * jitter_factor) as u64;
            delay = Duration::from_millis(jittered_ms);
        }

        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_status_code_classification() {
        assert_eq!(RetryableError::from_status_code(408), RetryableError::Timeout);
        assert_eq!(RetryableError::from_status_code(429), RetryableError::RateLimited);
        assert_eq!(RetryableError::from_status_code(404), RetryableError::ClientError(404));
        assert_eq!(RetryableError::from_status_code(503), RetryableError::ServerError(503));
    }

    #[test]
    fn test_store_error_classification() {
        assert!(RetryableError::from_store_error(&StoreError::Unavailable("down".into())).should_retry());
        assert!(RetryableError::from_store_error(&StoreError::Timeout(Duration::from_secs(1))).should_retry());
        assert!(
            !RetryableError::from_store_error(&StoreError::Conflict {
                collection: "surveys".into(),
                id: "s1".into()
            })
            .should_retry()
        );
        assert!(
            !RetryableError::from_store_error(&StoreError::Http {
                status: 400,
                body: String::new()
            })
            .should_retry()
        );
    }

    #[test]
    fn test_delay_calculation() {
        let config = RetryConfig {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter: false,
        };
        let policy = RetryPolicy::new(config);

        assert_eq!(policy.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(400));
        assert_eq!(policy.calculate_delay(4), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_retry_success_on_second_attempt() {
        let policy = RetryPolicy::new(fast_config(3));
        let attempts = Arc::new(AtomicU32::new(0));

        let result = policy
            .execute(|| {
                let attempts = attempts.clone();
                async move {
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(StoreError::Unavailable("connection reset".into()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let policy = RetryPolicy::new(fast_config(5));
        let attempts = Arc::new(AtomicU32::new(0));

        let result: Result<(), StoreError> = policy
            .execute(|| {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(StoreError::Http {
                        status: 404,
                        body: "missing".into(),
                    })
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
