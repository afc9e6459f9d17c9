//! Transport-level retry with exponential backoff and jitter.
//!
//! [`BackoffConfig`] controls how transient HTTP errors are retried with
//! increasing delays. [`BackoffConfig::sygra_default()`] matches the
//! retry loop's defaults: 8 attempts over the retryable status set
//! `{429, 500, 502, 503, 504, 599, 444}`.

use std::time::Duration;

/// Configuration for transport-level retry with exponential backoff and jitter.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Total number of attempts for one logical call (the retry loop runs
    /// `0..max_retries`), matching the source's `stop_after_attempt(retry_attempts)`
    /// semantics — not the number of retries *after* an initial attempt.
    pub max_retries: u32,

    /// Initial delay before first retry.
    pub initial_delay: Duration,

    /// Multiplier applied to delay after each retry.
    pub multiplier: f64,

    /// Maximum delay between retries.
    pub max_delay: Duration,

    /// Jitter strategy.
    pub jitter: JitterStrategy,

    /// HTTP status codes that trigger retry.
    pub retryable_statuses: Vec<u16>,

    /// Whether to respect `Retry-After` headers from the provider.
    pub respect_retry_after: bool,
}

/// Jitter strategy to prevent thundering herd on shared rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterStrategy {
    /// No jitter. Delay is exactly the calculated value.
    None,
    /// Full jitter: random value in `[0, calculated_delay]` (AWS best practice).
    Full,
    /// Equal jitter: `calculated_delay/2 + random in [0, calculated_delay/2]`.
    Equal,
    /// Decorrelated jitter: simplified to `random in [0, calculated_delay]` here.
    Decorrelated,
}

impl BackoffConfig {
    /// No transport retry: a single attempt, no retries after failure.
    pub fn none() -> Self {
        Self {
            max_retries: 1,
            ..Self::standard()
        }
    }

    /// Sensible defaults for cloud APIs: 3 retries, 1s initial, 2x multiplier.
    pub fn standard() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::Full,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            respect_retry_after: true,
        }
    }

    /// Default retry budget for model calls: `retry_attempts` defaults to 8,
    /// retryable set includes the gateway-timeout-adjacent 599 and 444 codes
    /// alongside the standard set.
    pub fn sygra_default() -> Self {
        Self {
            max_retries: 8,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::Full,
            retryable_statuses: crate::error::RETRYABLE_STATUS_CODES.to_vec(),
            respect_retry_after: true,
        }
    }

    /// Aggressive retry for high-throughput batch processing.
    pub fn aggressive() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(120),
            jitter: JitterStrategy::Full,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            respect_retry_after: true,
        }
    }

    /// Conservative retry for interactive use (user is waiting).
    pub fn interactive() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            multiplier: 1.5,
            max_delay: Duration::from_secs(10),
            jitter: JitterStrategy::Full,
            retryable_statuses: vec![429, 500, 502, 503, 504],
            respect_retry_after: true,
        }
    }

    /// Calculate the delay for attempt N (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => fastrand::f64() * capped,
            JitterStrategy::Equal => capped / 2.0 + fastrand::f64() * (capped / 2.0),
            JitterStrategy::Decorrelated => fastrand::f64() * capped,
        };

        Duration::from_secs_f64(jittered)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::sygra_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_exponential() {
        let config = BackoffConfig {
            max_retries: 5,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::None,
            retryable_statuses: vec![429],
            respect_retry_after: false,
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_delay_capped_at_max() {
        let config = BackoffConfig {
            max_retries: 10,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5),
            jitter: JitterStrategy::None,
            retryable_statuses: vec![429],
            respect_retry_after: false,
        };

        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(5));
    }

    #[test]
    fn test_sygra_default_matches_retry_budget() {
        let config = BackoffConfig::sygra_default();
        assert_eq!(config.max_retries, 8);
        for code in [429, 500, 502, 503, 504, 599, 444] {
            assert!(config.retryable_statuses.contains(&code));
        }
    }

    #[test]
    fn test_backoff_jitter_full_in_range() {
        let config = BackoffConfig {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: JitterStrategy::Full,
            retryable_statuses: vec![429],
            respect_retry_after: false,
        };

        for _ in 0..100 {
            let d = config.delay_for_attempt(0);
            assert!(d <= Duration::from_secs(1), "delay {:?} > 1s", d);
        }
    }
}
