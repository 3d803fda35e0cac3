use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning for the processing-status poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
  pub interval_ms:    u64,
  /// Upper bound for the delay between retries of a failing poll.
  pub max_backoff_ms: u64,
}

impl Default for PollConfig {
  fn default() -> Self { Self { interval_ms: 3_000, max_backoff_ms: 30_000 } }
}

impl PollConfig {
  pub fn interval(&self) -> Duration { Duration::from_millis(self.interval_ms) }

  /// Delay before the next tick after `failures` consecutive failed polls.
  ///
  /// The first failure keeps the normal interval; each further one doubles
  /// it, never exceeding `max_backoff_ms` (nor dropping below the interval).
  pub fn delay_after_failures(&self, failures: u32) -> Duration {
    let interval = self.interval();
    if failures <= 1 {
      return interval;
    }
    let cap = Duration::from_millis(self.max_backoff_ms).max(interval);
    let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
    interval.checked_mul(factor).map_or(cap, |d| d.min(cap))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// How long face suggestions for one title/content pair stay fresh.
  pub suggestion_staleness_ms: u64,
  pub poll:                    PollConfig,
}

impl Default for SyncConfig {
  fn default() -> Self { Self { suggestion_staleness_ms: 30_000, poll: PollConfig::default() } }
}

impl SyncConfig {
  pub fn suggestion_staleness(&self) -> Duration {
    Duration::from_millis(self.suggestion_staleness_ms)
  }
}
