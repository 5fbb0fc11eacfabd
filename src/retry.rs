//! Bounded retry with exponential backoff and jitter.
//!
//! One policy object is shared by the search and completion adapters so
//! both sides of the pipeline retry the same way. Regeneration after a
//! failed validation is NOT a retry — it is a separate, single forced
//! attempt owned by the pipeline.
//!
//! `max_attempts` bounds transport-level tries within ONE logical call.
//! The pipeline's two-completions-per-turn bound counts logical calls;
//! each of those calls carries its own attempt budget, so transient
//! failures can put more than two requests on the wire.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Whether a failed attempt is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Rate limit, server error, or network failure.
    Transient,
    /// Client error (4xx other than 429), bad config — retrying won't help.
    Permanent,
}

/// A provider failure tagged with its retry class.
#[derive(Debug)]
pub struct ProviderError {
    pub class: RetryClass,
    pub error: anyhow::Error,
}

impl ProviderError {
    pub fn transient(error: anyhow::Error) -> Self {
        Self {
            class: RetryClass::Transient,
            error,
        }
    }

    pub fn permanent(error: anyhow::Error) -> Self {
        Self {
            class: RetryClass::Permanent,
            error,
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, jitter: bool) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            jitter,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            config.jitter,
        )
    }

    /// A single-attempt policy (no retries, no delay).
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO, false)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before attempt `attempt` (1-based; attempt 0 never sleeps).
    /// Doubles per attempt, capped at 2^5 times the base, with up to 50%
    /// added jitter when enabled.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exp = (attempt - 1).min(5);
        let base = self.base_delay * (1u32 << exp);
        if self.jitter {
            let factor = rand::thread_rng().gen_range(1.0..1.5);
            base.mul_f64(factor)
        } else {
            base
        }
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ProviderError>>,
    {
        let mut last_err = None;

        for attempt in 0..self.max_attempts {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(ProviderError {
                    class: RetryClass::Permanent,
                    error,
                }) => return Err(error),
                Err(ProviderError { error, .. }) => {
                    last_err = Some(error);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("retries exhausted")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_first_try() {
        let policy = RetryPolicy::new(3, Duration::ZERO, false);
        let calls = AtomicU32::new(0);
        let result: anyhow::Result<u32> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(7) }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_until_exhausted() {
        let policy = RetryPolicy::new(3, Duration::ZERO, false);
        let calls = AtomicU32::new(0);
        let result: anyhow::Result<u32> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::transient(anyhow::anyhow!("503"))) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_error_stops_immediately() {
        let policy = RetryPolicy::new(5, Duration::ZERO, false);
        let calls = AtomicU32::new(0);
        let result: anyhow::Result<u32> = policy
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::permanent(anyhow::anyhow!("401"))) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100), false);
        assert_eq!(policy.delay_before(0), Duration::ZERO);
        assert_eq!(policy.delay_before(1), Duration::from_millis(100));
        assert_eq!(policy.delay_before(2), Duration::from_millis(200));
        assert_eq!(policy.delay_before(3), Duration::from_millis(400));
        // Capped at 2^5 x base
        assert_eq!(policy.delay_before(9), Duration::from_millis(3200));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), true);
        for _ in 0..50 {
            let d = policy.delay_before(1);
            assert!(d >= Duration::from_millis(100));
            assert!(d <= Duration::from_millis(150));
        }
    }
}
