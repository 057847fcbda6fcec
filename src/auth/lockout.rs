//! Progressive lockout rules.
//!
//! Lock state is never stored as a flag. It is derived from `lockout_until` and
//! the current instant every time it is needed, so an expired window needs no
//! unlock step.

use time::{Duration, OffsetDateTime};

use crate::auth::error::AuthError;
use crate::auth::repo_types::{AccountSummary, User};
use crate::config::LockoutConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Failures that trigger a lockout, counted after the increment.
    pub max_attempts: u32,
    pub duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            duration: Duration::minutes(2),
        }
    }
}

impl TryFrom<&LockoutConfig> for LockoutPolicy {
    type Error = anyhow::Error;

    fn try_from(cfg: &LockoutConfig) -> anyhow::Result<Self> {
        cfg.validate()?;
        let seconds = cfg
            .duration_minutes
            .checked_mul(60)
            .ok_or_else(|| anyhow::anyhow!("lockout duration overflows"))?;
        Ok(Self {
            max_attempts: cfg.attempts,
            duration: Duration::seconds(seconds),
        })
    }
}

pub fn is_locked(lockout_until: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
    matches!(lockout_until, Some(until) if until > now)
}

impl User {
    pub fn is_locked(&self, now: OffsetDateTime) -> bool {
        is_locked(self.lockout_until, now)
    }

    /// Returns the active deadline, if the account is locked at `now`.
    pub fn active_lockout(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
        self.lockout_until.filter(|_| self.is_locked(now))
    }

    /// Counts one failed attempt and locks the account once the threshold is
    /// reached. Returns the new deadline when this attempt caused the lock.
    ///
    /// The user is left untouched if the deadline cannot be represented.
    pub fn record_failure(
        &mut self,
        policy: &LockoutPolicy,
        now: OffsetDateTime,
    ) -> Result<Option<OffsetDateTime>, AuthError> {
        let attempts = self.failed_login_attempts.saturating_add(1);
        let until = if attempts as i64 >= policy.max_attempts as i64 {
            let until = now
                .checked_add(policy.duration)
                .ok_or(AuthError::DeadlineOutOfRange)?;
            Some(until)
        } else {
            None
        };

        self.failed_login_attempts = attempts;
        if until.is_some() {
            self.lockout_until = until;
        }
        Ok(until)
    }

    pub fn clear_failures(&mut self) {
        self.failed_login_attempts = 0;
        self.lockout_until = None;
    }

    pub fn summary(&self, now: OffsetDateTime) -> AccountSummary {
        AccountSummary {
            id: self.id,
            username: self.username.clone(),
            failed_attempts: self.failed_login_attempts,
            locked_out: self.is_locked(now),
        }
    }
}

#[cfg(test)]
mod lockout_tests {
    use super::*;
    use time::macros::datetime;
    use uuid::Uuid;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "alice".into(),
            password_hash: "$argon2id$stub".into(),
            failed_login_attempts: 0,
            lockout_until: None,
            created_at: datetime!(2024-01-01 00:00 UTC),
        }
    }

    #[test]
    fn is_locked_is_strictly_after_now() {
        let now = datetime!(2024-01-01 12:00 UTC);
        assert!(!is_locked(None, now));
        assert!(!is_locked(Some(now), now));
        assert!(!is_locked(Some(now - Duration::seconds(1)), now));
        assert!(is_locked(Some(now + Duration::seconds(1)), now));
    }

    #[test]
    fn locks_on_the_attempt_that_reaches_the_threshold() {
        let policy = LockoutPolicy::default();
        let now = datetime!(2024-01-01 12:00 UTC);
        let mut u = user();

        assert_eq!(u.record_failure(&policy, now).unwrap(), None);
        assert_eq!(u.record_failure(&policy, now).unwrap(), None);
        assert!(!u.is_locked(now));

        let until = u
            .record_failure(&policy, now)
            .unwrap()
            .expect("third failure locks");
        assert_eq!(until, now + Duration::minutes(2));
        assert_eq!(u.failed_login_attempts, 3);
        assert!(u.is_locked(now));
    }

    #[test]
    fn threshold_of_one_locks_immediately() {
        let policy = LockoutPolicy {
            max_attempts: 1,
            duration: Duration::seconds(30),
        };
        let now = datetime!(2024-01-01 12:00 UTC);
        let mut u = user();
        assert_eq!(
            u.record_failure(&policy, now).unwrap(),
            Some(now + Duration::seconds(30))
        );
    }

    #[test]
    fn unrepresentable_deadline_is_an_error_and_mutates_nothing() {
        let policy = LockoutPolicy {
            max_attempts: 1,
            duration: Duration::MAX,
        };
        let now = datetime!(2024-01-01 12:00 UTC);
        let mut u = user();
        assert!(matches!(
            u.record_failure(&policy, now),
            Err(AuthError::DeadlineOutOfRange)
        ));
        assert_eq!(u.failed_login_attempts, 0);
        assert_eq!(u.lockout_until, None);
    }

    #[test]
    fn expired_lockout_is_not_active() {
        let now = datetime!(2024-01-01 12:00 UTC);
        let mut u = user();
        u.lockout_until = Some(now - Duration::minutes(1));
        assert_eq!(u.active_lockout(now), None);
        assert!(!u.summary(now).locked_out);
    }

    #[test]
    fn clear_failures_resets_both_fields() {
        let now = datetime!(2024-01-01 12:00 UTC);
        let mut u = user();
        u.failed_login_attempts = 5;
        u.lockout_until = Some(now + Duration::minutes(2));
        u.clear_failures();
        assert_eq!(u.failed_login_attempts, 0);
        assert_eq!(u.lockout_until, None);
    }

    #[test]
    fn policy_from_config() {
        let policy = LockoutPolicy::try_from(&LockoutConfig {
            attempts: 5,
            duration_minutes: 15,
        })
        .unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.duration, Duration::minutes(15));
    }

    #[test]
    fn oversized_config_is_rejected_without_panicking() {
        for duration_minutes in [10_000_000_000, i64::MAX] {
            let cfg = LockoutConfig {
                attempts: 1,
                duration_minutes,
            };
            assert!(LockoutPolicy::try_from(&cfg).is_err());
        }
    }
}
