//! Exponential backoff with jitter for the retry policy:
//! `min(max_delay, base * 2^(attempt-1)) * uniform(jitter_min, jitter_max)`.

use opal_domain::config::RetryConfig;
use std::time::Duration;

/// Computes the delay before retry attempt `attempt` (1-indexed: the first
/// retry is attempt 1).
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let base = config.base_delay_ms as f64;
    let max = config.max_delay_ms as f64;
    let exp = base * 2f64.powi(attempt as i32 - 1);
    let capped = exp.min(max);
    let jitter = rand::Rng::gen_range(&mut rand::thread_rng(), config.jitter_min..=config.jitter_max);
    Duration::from_millis((capped * jitter).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_jitter_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_min: 1.0,
            jitter_max: 1.0,
        }
    }

    #[test]
    fn delay_doubles_each_attempt_before_cap() {
        let cfg = fixed_jitter_config();
        assert_eq!(backoff_delay(&cfg, 1).as_millis(), 1000);
        assert_eq!(backoff_delay(&cfg, 2).as_millis(), 2000);
        assert_eq!(backoff_delay(&cfg, 3).as_millis(), 4000);
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let cfg = fixed_jitter_config();
        assert_eq!(backoff_delay(&cfg, 10).as_millis(), 30_000);
    }

    #[test]
    fn jitter_stays_within_configured_bounds() {
        let cfg = RetryConfig {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter_min: 0.5,
            jitter_max: 1.5,
        };
        for _ in 0..50 {
            let d = backoff_delay(&cfg, 1).as_millis() as f64;
            assert!(d >= 500.0 && d <= 1500.0, "delay {d} out of [500,1500]");
        }
    }
}
