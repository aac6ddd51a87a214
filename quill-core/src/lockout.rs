//! Login lockout state machine.
//!
//! Lockout state is not stored. It is derived from two account columns,
//! `login_attempts` and `last_attempt_time`, by [`classify`]:
//!
//! | state       | condition                                                   |
//! | ----------- | ----------------------------------------------------------- |
//! | `Open`      | `attempts < max_attempts`                                   |
//! | `Locked`    | `attempts >= max_attempts` and `now < last + window`        |
//! | `Expirable` | `attempts >= max_attempts` and `now >= last + window`       |
//!
//! An `Expirable` account is reset lazily, the next time somebody tries to log
//! in to it. There is no background sweep.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCKOUT_MINUTES: i64 = 30;

/// Configuration for account lockout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutConfig {
    /// Consecutive failures that lock an account.
    pub max_attempts: u32,
    /// How long a locked account refuses logins after its last failure.
    pub lockout_window: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout_window: Duration::minutes(DEFAULT_LOCKOUT_MINUTES),
        }
    }
}

impl LockoutConfig {
    pub fn new(max_attempts: u32, lockout_minutes: i64) -> Self {
        Self {
            max_attempts,
            lockout_window: Duration::minutes(lockout_minutes),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_lockout_window(mut self, window: Duration) -> Self {
        self.lockout_window = window;
        self
    }

    /// Attempts left before the account locks.
    pub fn remaining_attempts(&self, attempts: u32) -> u32 {
        self.max_attempts.saturating_sub(attempts)
    }
}

/// Lockout state of one account at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockoutState {
    /// Password verification proceeds normally.
    Open,
    /// Verification is refused regardless of the password.
    Locked {
        #[serde(with = "duration_seconds")]
        remaining: Duration,
    },
    /// The lockout window has passed; the counter is reset on the next attempt.
    Expirable,
}

impl LockoutState {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockoutState::Locked { .. })
    }

    /// Remaining wait in whole minutes, rounded up. Zero unless locked.
    pub fn wait_minutes(&self) -> i64 {
        match self {
            LockoutState::Locked { remaining } => {
                let seconds = remaining.num_seconds().max(0);
                (seconds + 59) / 60
            }
            _ => 0,
        }
    }
}

/// Derive the lockout state from the stored counter and last failure time.
///
/// A counter at or above the limit with no recorded failure time is treated as
/// stale, i.e. `Expirable`.
pub fn classify(
    attempts: u32,
    last_attempt_time: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &LockoutConfig,
) -> LockoutState {
    if attempts < config.max_attempts {
        return LockoutState::Open;
    }

    match last_attempt_time {
        Some(last) => {
            let lock_until = last + config.lockout_window;
            if now < lock_until {
                LockoutState::Locked {
                    remaining: lock_until - now,
                }
            } else {
                LockoutState::Expirable
            }
        }
        None => LockoutState::Expirable,
    }
}

mod duration_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::seconds(i64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 11, 17, 0, 0).unwrap()
    }

    #[test]
    fn test_below_limit_is_open() {
        let config = LockoutConfig::default();
        assert_eq!(classify(0, None, now(), &config), LockoutState::Open);
        assert_eq!(
            classify(4, Some(now()), now(), &config),
            LockoutState::Open
        );
    }

    #[test]
    fn test_at_limit_with_recent_failure_is_locked() {
        let config = LockoutConfig::default();
        let state = classify(5, Some(now()), now(), &config);
        assert_eq!(
            state,
            LockoutState::Locked {
                remaining: Duration::minutes(30)
            }
        );
        assert_eq!(state.wait_minutes(), 30);
    }

    #[test]
    fn test_window_elapsed_is_expirable() {
        let config = LockoutConfig::default();
        let last = now() - Duration::minutes(30) - Duration::seconds(1);
        assert_eq!(
            classify(5, Some(last), now(), &config),
            LockoutState::Expirable
        );
    }

    #[test]
    fn test_window_boundary_is_expirable() {
        let config = LockoutConfig::default();
        let last = now() - Duration::minutes(30);
        assert_eq!(
            classify(5, Some(last), now(), &config),
            LockoutState::Expirable
        );
    }

    #[test]
    fn test_counter_without_timestamp_is_stale() {
        let config = LockoutConfig::default();
        assert_eq!(classify(9, None, now(), &config), LockoutState::Expirable);
    }

    #[test]
    fn test_wait_minutes_rounds_up() {
        let config = LockoutConfig::default();
        let last = now() - Duration::minutes(10) - Duration::seconds(1);
        let state = classify(5, Some(last), now(), &config);
        // 19m59s left
        assert_eq!(state.wait_minutes(), 20);

        let last = now() - Duration::minutes(29) - Duration::seconds(59);
        assert_eq!(classify(5, Some(last), now(), &config).wait_minutes(), 1);
    }

    #[test]
    fn test_remaining_attempts_saturates() {
        let config = LockoutConfig::default();
        assert_eq!(config.remaining_attempts(1), 4);
        assert_eq!(config.remaining_attempts(5), 0);
        assert_eq!(config.remaining_attempts(7), 0);
    }

    #[test]
    fn test_custom_config() {
        let config = LockoutConfig::default()
            .with_max_attempts(3)
            .with_lockout_window(Duration::minutes(15));
        assert_eq!(config, LockoutConfig::new(3, 15));
        assert!(classify(3, Some(now()), now(), &config).is_locked());
    }
}
