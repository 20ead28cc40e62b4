//! Backoff calculation

use super::config::RetryConfig;
use std::time::Duration;

/// Exponential backoff for `attempt` (1-based) with symmetric jitter
pub(super) fn calculate_backoff_delay(retry_config: &RetryConfig, attempt: u32) -> Duration {
    // Millisecond precision is plenty here
    #[allow(clippy::cast_precision_loss)]
    let base_delay = retry_config.initial_delay.as_millis().min(u128::from(u64::MAX)) as f64;
    #[allow(clippy::cast_precision_loss)]
    let max_delay = retry_config.max_delay.as_millis().min(u128::from(u64::MAX)) as f64;

    let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    let delay = (base_delay * retry_config.backoff_multiplier.powi(exponent)).min(max_delay);

    let jitter = delay * retry_config.jitter_factor * (rand::random::<f64>() - 0.5);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let final_delay = (delay + jitter).max(0.0).round() as u64;

    Duration::from_millis(final_delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_is_capped() {
        let config = RetryConfig {
            max_retries: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        };
        assert_eq!(calculate_backoff_delay(&config, 1), Duration::from_millis(100));
        assert_eq!(calculate_backoff_delay(&config, 2), Duration::from_millis(200));
        assert_eq!(calculate_backoff_delay(&config, 3), Duration::from_millis(350));
    }

    #[test]
    fn jitter_stays_within_factor() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(1000),
            jitter_factor: 0.2,
            ..RetryConfig::default()
        };
        for _ in 0..32 {
            let delay = calculate_backoff_delay(&config, 1).as_millis();
            assert!((900..=1100).contains(&delay), "delay {delay} out of range");
        }
    }
}
