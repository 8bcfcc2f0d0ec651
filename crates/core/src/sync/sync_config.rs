use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Foreground sync cadence in seconds.
pub const SYNC_FOREGROUND_INTERVAL_SECS: u64 = 45;

/// Maximum jitter (seconds) added to periodic cycle intervals.
pub const SYNC_INTERVAL_JITTER_SECS: u64 = 5;

/// Delay before the next cycle while local changes are waiting to be pushed.
pub const SYNC_PENDING_OUTBOX_DELAY_MS: u64 = 2_000;

/// Tuning for the replication engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub push_batch_size: usize,
    pub pull_page_size: usize,
    pub foreground_interval_secs: u64,
    pub interval_jitter_secs: u64,
    pub backoff_base_secs: i64,
    pub backoff_max_exponent: i32,
    /// Delay applied to an entry rejected for authentication.
    pub reauth_retry_secs: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            push_batch_size: 200,
            pull_page_size: 500,
            foreground_interval_secs: SYNC_FOREGROUND_INTERVAL_SECS,
            interval_jitter_secs: SYNC_INTERVAL_JITTER_SECS,
            backoff_base_secs: 5,
            backoff_max_exponent: 8,
            reauth_retry_secs: 30,
        }
    }
}

impl SyncConfig {
    /// Exponential backoff in seconds with cap.
    pub fn backoff_seconds(&self, retry_count: i32) -> i64 {
        let capped = retry_count.clamp(0, self.backoff_max_exponent.max(0)) as u32;
        2_i64.saturating_pow(capped).saturating_mul(self.backoff_base_secs)
    }

    pub fn jitter(&self) -> Duration {
        let bound_ms = self.interval_jitter_secs.saturating_mul(1000);
        if bound_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..bound_ms))
    }

    pub fn foreground_interval(&self) -> Duration {
        Duration::from_secs(self.foreground_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_exponential_and_capped() {
        let config = SyncConfig::default();
        assert_eq!(config.backoff_seconds(0), 5);
        assert_eq!(config.backoff_seconds(1), 10);
        assert_eq!(config.backoff_seconds(2), 20);
        assert_eq!(config.backoff_seconds(9), config.backoff_seconds(8));
        assert_eq!(config.backoff_seconds(-3), 5);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{ "pullPageSize": 50 }"#).unwrap();
        assert_eq!(config.pull_page_size, 50);
        assert_eq!(config.push_batch_size, SyncConfig::default().push_batch_size);
    }

    #[test]
    fn jitter_stays_within_bound() {
        let config = SyncConfig::default();
        for _ in 0..20 {
            assert!(config.jitter() < Duration::from_secs(SYNC_INTERVAL_JITTER_SECS));
        }
        let none = SyncConfig {
            interval_jitter_secs: 0,
            ..SyncConfig::default()
        };
        assert_eq!(none.jitter(), Duration::ZERO);
    }
}
