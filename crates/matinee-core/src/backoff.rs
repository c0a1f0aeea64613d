//! Reconnect policy and backoff calculation.
//!
//! The async reconnect loop lives in `matinee-client` (which has access
//! to tokio); this module contains the portable, sync-only building
//! blocks:
//!
//! - [`ReconnectPolicy`]: attempt cap and delay parameters
//! - [`ReconnectPolicy::delay_for`]: exponential backoff, deterministic
//!
//! The backoff is intentionally jitter-free: the delay sequence for the
//! default policy is exactly `1000, 2000, 4000, 8000, 16000` ms, after
//! which no further attempt is scheduled until an external trigger
//! restarts the cycle.

use serde::{Deserialize, Serialize};

/// Default maximum reconnect attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default maximum delay in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;

/// Parameters governing reconnection after a dropped connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectPolicy {
    /// Maximum number of reconnect attempts before giving up (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for exponential backoff in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Cap on any single delay in ms (default: 60000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given zero-based attempt, or `None` when the
    /// attempt cap is reached and no retry may be scheduled.
    ///
    /// Formula: `min(max_delay, base_delay * 2^attempt)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Option<u64> {
        if attempt >= self.max_attempts {
            return None;
        }
        let exponential = self.base_delay_ms.saturating_mul(1u64 << attempt.min(31));
        Some(exponential.min(self.max_delay_ms))
    }

    /// Whether another attempt is permitted.
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay_ms, 1000);
        assert_eq!(policy.max_delay_ms, 60_000);
    }

    #[test]
    fn backoff_sequence_for_five_failures() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..5).map(|a| policy.delay_for(a).unwrap()).collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn sixth_failure_schedules_nothing() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(5), None);
        assert!(!policy.allows(5));
    }

    #[test]
    fn delay_caps_at_max() {
        let policy = ReconnectPolicy {
            max_attempts: 20,
            base_delay_ms: 1000,
            max_delay_ms: 10_000,
        };
        assert_eq!(policy.delay_for(10), Some(10_000));
    }

    #[test]
    fn high_attempt_does_not_overflow() {
        let policy = ReconnectPolicy {
            max_attempts: u32::MAX,
            base_delay_ms: 1000,
            max_delay_ms: u64::MAX,
        };
        // Shift is clamped to 31; saturating multiply keeps this finite.
        assert!(policy.delay_for(100).is_some());
    }

    #[test]
    fn zero_max_attempts_never_retries() {
        let policy = ReconnectPolicy {
            max_attempts: 0,
            ..ReconnectPolicy::default()
        };
        assert_eq!(policy.delay_for(0), None);
    }

    #[test]
    fn serde_defaults() {
        let policy: ReconnectPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay_ms, 1000);
    }

    #[test]
    fn serde_roundtrip() {
        let policy = ReconnectPolicy {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 4000,
        };
        let json = serde_json::to_string(&policy).unwrap();
        let back: ReconnectPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_attempts, 3);
        assert_eq!(back.base_delay_ms, 500);
        assert_eq!(back.max_delay_ms, 4000);
    }
}
