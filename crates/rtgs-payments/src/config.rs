//! Payment engine configuration

use std::time::Duration;

/// Posting transaction and retry tuning
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Soft timeout for one posting transaction
    pub transaction_timeout: Duration,
    /// Attempts for conflict-class errors (including the first)
    pub retry_attempts: u32,
    /// Backoff before the second attempt
    pub retry_initial_backoff: Duration,
    /// Backoff multiplier between attempts
    pub retry_multiplier: u32,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            transaction_timeout: Duration::from_secs(30),
            retry_attempts: 3,
            retry_initial_backoff: Duration::from_millis(100),
            retry_multiplier: 2,
        }
    }
}

impl PaymentConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            transaction_timeout: std::env::var("PAYMENT_TRANSACTION_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.transaction_timeout),
            retry_attempts: std::env::var("PAYMENT_RETRY_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.retry_attempts),
            retry_initial_backoff: std::env::var("PAYMENT_RETRY_INITIAL_BACKOFF_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_initial_backoff),
            retry_multiplier: std::env::var("PAYMENT_RETRY_MULTIPLIER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.retry_multiplier),
        }
    }

    /// Backoff to sleep after `attempt` failed attempts (1-based)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.retry_multiplier.saturating_pow(attempt.saturating_sub(1));
        self.retry_initial_backoff.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = PaymentConfig::default();
        assert_eq!(config.transaction_timeout, Duration::from_secs(30));
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_initial_backoff, Duration::from_millis(100));
        assert_eq!(config.retry_multiplier, 2);
    }

    #[test]
    fn test_backoff_doubles() {
        let config = PaymentConfig::default();
        assert_eq!(config.backoff_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.backoff_for_attempt(3), Duration::from_millis(400));
    }
}
