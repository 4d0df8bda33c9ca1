//! 🔁 Retry: exponential backoff with jitter, OFF by default.
//!
//! Store failures are fatal. That is the contract, and `max_retries = 0` (the
//! default) keeps it exactly that way: one attempt, then the latch trips.
//! Turn the knob up and a flaky `GetObject` gets a few more chances before the
//! same fatal error surfaces. Only the last failure is reported.
//!
//! "He who retries forever, never learns the bucket is gone." 🦆

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::warn;

/// 🔧 How hard to try before giving up on a store call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryConfig {
    /// 🔢 extra attempts after the first. 0 = fail fast.
    #[serde(default)]
    pub max_retries: u32,
    /// ⏱️ first backoff, doubled each attempt
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// 🧱 backoff ceiling
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// 🎲 add up to 25% random jitter so a herd of readers doesn't stampede in sync
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_backoff_ms(mut self, initial_backoff_ms: u64) -> Self {
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    pub fn with_max_backoff_ms(mut self, max_backoff_ms: u64) -> Self {
        self.max_backoff_ms = max_backoff_ms;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// 📈 Backoff before retry number `attempt + 1`.
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let the_base_ms = self
            .initial_backoff_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let the_capped_ms = the_base_ms.min(self.max_backoff_ms);

        let the_final_ms = if self.jitter {
            let the_jitter_range = the_capped_ms / 4;
            let the_jitter = rand::rng().random_range(0..=the_jitter_range);
            the_capped_ms.saturating_add(the_jitter)
        } else {
            the_capped_ms
        };

        Duration::from_millis(the_final_ms)
    }
}

/// 🔁 Run `operation` up to `1 + max_retries` times. Returns the first success
/// or the last error.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut the_attempt = 0u32;
    loop {
        match operation().await {
            Ok(the_result) => return Ok(the_result),
            Err(e) if the_attempt >= config.max_retries => return Err(e),
            Err(e) => {
                let the_backoff = config.backoff_duration(the_attempt);
                warn!(
                    operation = operation_name,
                    attempt = the_attempt,
                    backoff_ms = the_backoff.as_millis() as u64,
                    error = %e,
                    "🔁 store call failed, backing off and trying again"
                );
                sleep(the_backoff).await;
                the_attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn the_one_where_the_default_is_to_not_retry_at_all() {
        let the_config = RetryConfig::default();
        assert_eq!(the_config.max_retries, 0);
        assert_eq!(the_config.initial_backoff_ms, 100);
        assert_eq!(the_config.max_backoff_ms, 10_000);
        assert!(the_config.jitter);
    }

    #[test]
    fn the_one_where_backoff_doubles_then_hits_the_ceiling() {
        let the_config = RetryConfig::default()
            .with_initial_backoff_ms(1000)
            .with_max_backoff_ms(3000)
            .with_jitter(false);

        assert_eq!(the_config.backoff_duration(0), Duration::from_millis(1000));
        assert_eq!(the_config.backoff_duration(1), Duration::from_millis(2000));
        assert_eq!(the_config.backoff_duration(2), Duration::from_millis(3000));
        assert_eq!(the_config.backoff_duration(63), Duration::from_millis(3000));
    }

    #[test]
    fn the_one_where_jitter_stays_inside_its_quarter() {
        let the_config = RetryConfig::default()
            .with_initial_backoff_ms(400)
            .with_jitter(true);
        for _ in 0..50 {
            let the_ms = the_config.backoff_duration(0).as_millis();
            assert!((400..=500).contains(&the_ms), "jitter escaped: {the_ms}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_fail_fast_means_one_attempt() {
        let the_attempts = AtomicU32::new(0);
        let the_result: Result<(), String> = with_retry(&RetryConfig::default(), "get_object", || {
            the_attempts.fetch_add(1, Ordering::SeqCst);
            async { Err("boom".to_string()) }
        })
        .await;

        assert_eq!(the_result, Err("boom".to_string()));
        assert_eq!(the_attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_third_time_is_the_charm() {
        let the_attempts = AtomicU32::new(0);
        let the_config = RetryConfig::default().with_max_retries(3).with_jitter(false);

        let the_result: Result<u32, String> = with_retry(&the_config, "get_object", || {
            let the_attempt = the_attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if the_attempt < 2 {
                    Err(format!("SlowDown #{the_attempt}"))
                } else {
                    Ok(the_attempt)
                }
            }
        })
        .await;

        assert_eq!(the_result, Ok(2));
        assert_eq!(the_attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_only_the_last_error_is_reported() {
        let the_attempts = AtomicU32::new(0);
        let the_config = RetryConfig::default().with_max_retries(2).with_jitter(false);

        let the_result: Result<(), String> = with_retry(&the_config, "get_object", || {
            let the_attempt = the_attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("attempt {the_attempt}")) }
        })
        .await;

        assert_eq!(the_result, Err("attempt 2".to_string()));
    }
}
