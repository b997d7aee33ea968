//! Randomized exponential backoff for provider calls.
//!
//! Only errors that report themselves as transient are retried. There is no
//! attempt cap by default: the host action timeout bounds the total time.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Errors that can tell whether retrying may succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Lower bound on any wait, in seconds
    pub min_wait_secs: f64,
    /// Upper bound on any wait, in seconds
    pub max_wait_secs: f64,
    /// Scales the exponential window (`multiplier * 2^attempt`)
    pub multiplier: f64,
    /// Maximum number of attempts, `None` for unbounded
    pub max_attempts: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_wait_secs: 1.0,
            max_wait_secs: 60.0,
            multiplier: 1.0,
            max_attempts: None,
        }
    }
}

impl RetryConfig {
    /// Reject bounds that cannot describe a wait window
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("min_wait_secs", self.min_wait_secs),
            ("max_wait_secs", self.max_wait_secs),
            ("multiplier", self.multiplier),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("{name} must be a finite, non-negative number of seconds, got {value}"));
            }
        }
        if self.min_wait_secs > self.max_wait_secs {
            return Err(format!(
                "min_wait_secs ({}) is greater than max_wait_secs ({})",
                self.min_wait_secs, self.max_wait_secs
            ));
        }
        if self.max_attempts == Some(0) {
            return Err("max_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Non-negative, finite seconds as a duration; anything else is zero
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::ZERO)
}

#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether a failure on the zero-based `attempt` should be retried
    pub fn should_retry<E: Transient>(&self, error: &E, attempt: usize) -> bool {
        if let Some(max) = self.config.max_attempts {
            if attempt + 1 >= max {
                return false;
            }
        }
        error.is_transient()
    }

    /// Upper edge of the random window for the zero-based `attempt`
    pub fn window(&self, attempt: usize) -> Duration {
        let exp = self.config.multiplier * 2f64.powi(attempt.min(62) as i32);
        // max then min: an inverted pair resolves to the minimum instead of panicking
        let high = exp
            .min(self.config.max_wait_secs)
            .max(self.config.min_wait_secs);
        seconds(high)
    }

    /// Random delay in `[min_wait, window(attempt)]`
    pub fn next_delay(&self, attempt: usize) -> Duration {
        let low = seconds(self.config.min_wait_secs).as_secs_f64();
        let high = self.window(attempt).as_secs_f64();
        if high <= low {
            return seconds(low);
        }
        let secs = rand::thread_rng().gen_range(low..=high);
        Duration::from_secs_f64(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flaky(bool);

    impl Transient for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.min_wait_secs, 1.0);
        assert_eq!(config.max_wait_secs, 60.0);
        assert!(config.max_attempts.is_none());
    }

    #[test]
    fn test_window_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.window(0), Duration::from_secs(1));
        assert_eq!(policy.window(1), Duration::from_secs(2));
        assert_eq!(policy.window(3), Duration::from_secs(8));
        assert_eq!(policy.window(10), Duration::from_secs(60));
        assert_eq!(policy.window(1000), Duration::from_secs(60));
    }

    #[test]
    fn test_delay_stays_in_window() {
        let policy = RetryPolicy::default();
        for attempt in 0..8 {
            let delay = policy.next_delay(attempt);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= policy.window(attempt));
        }
    }

    #[test]
    fn test_should_retry_respects_classification() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&Flaky(true), 0));
        assert!(policy.should_retry(&Flaky(true), 500));
        assert!(!policy.should_retry(&Flaky(false), 0));
    }

    #[test]
    fn test_should_retry_respects_max_attempts() {
        let policy = RetryPolicy::new(RetryConfig {
            max_attempts: Some(3),
            ..RetryConfig::default()
        });
        assert!(policy.should_retry(&Flaky(true), 0));
        assert!(policy.should_retry(&Flaky(true), 1));
        assert!(!policy.should_retry(&Flaky(true), 2));
    }

    #[test]
    fn test_inverted_bounds_do_not_panic() {
        let policy = RetryPolicy::new(RetryConfig {
            max_wait_secs: 0.5,
            ..RetryConfig::default()
        });
        assert_eq!(policy.window(0), Duration::from_secs(1));
        assert_eq!(policy.window(20), Duration::from_secs(1));
        assert_eq!(policy.next_delay(3), Duration::from_secs(1));
    }

    #[test]
    fn test_negative_and_nan_bounds_do_not_panic() {
        let policy = RetryPolicy::new(RetryConfig {
            min_wait_secs: -2.0,
            max_wait_secs: 0.5,
            multiplier: 0.1,
            max_attempts: None,
        });
        assert!(policy.next_delay(0) <= Duration::from_millis(500));
        assert_eq!(policy.window(10), Duration::from_millis(500));

        let policy = RetryPolicy::new(RetryConfig {
            min_wait_secs: f64::NAN,
            max_wait_secs: f64::NAN,
            multiplier: f64::NAN,
            max_attempts: None,
        });
        assert_eq!(policy.window(0), Duration::ZERO);
        assert_eq!(policy.next_delay(0), Duration::ZERO);
    }

    #[test]
    fn test_validate() {
        assert!(RetryConfig::default().validate().is_ok());

        let inverted = RetryConfig {
            max_wait_secs: 0.5,
            ..RetryConfig::default()
        };
        assert_eq!(
            inverted.validate().unwrap_err(),
            "min_wait_secs (1) is greater than max_wait_secs (0.5)"
        );

        let negative = RetryConfig {
            min_wait_secs: -1.0,
            ..RetryConfig::default()
        };
        assert!(negative.validate().unwrap_err().starts_with("min_wait_secs must be"));

        let infinite = RetryConfig {
            max_wait_secs: f64::INFINITY,
            ..RetryConfig::default()
        };
        assert!(infinite.validate().unwrap_err().starts_with("max_wait_secs must be"));

        let zero_attempts = RetryConfig {
            max_attempts: Some(0),
            ..RetryConfig::default()
        };
        assert!(zero_attempts.validate().is_err());
    }

    #[test]
    fn test_config_from_toml_fills_defaults() {
        let config: RetryConfig = toml::from_str("max_attempts = 5").unwrap();
        assert_eq!(config.max_attempts, Some(5));
        assert_eq!(config.max_wait_secs, 60.0);
    }
}
