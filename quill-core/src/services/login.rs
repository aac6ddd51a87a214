//! Password login gated by the lockout state machine.
//!
//! Each attempt against an existing account goes through three steps:
//!
//! 1. classify the account with [`classify`](crate::lockout::classify); a `Locked` account is
//!    rejected before the password is looked at, an `Expirable` one has its
//!    counter reset first
//! 2. verify the password
//! 3. persist the outcome: reset the counter on success, or increment it and
//!    stamp `last_attempt_time` on failure
//!
//! All of that bookkeeping is system-driven and bypasses audit attribution.
//! Every attempt is also appended to `login_history`, and reaching the limit
//! opens a row in `login_locks`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    Error,
    audit::AuditContext,
    crypto::verify_password,
    error::ValidationError,
    id::AccountId,
    lockout::{LockoutConfig, LockoutState},
    login::LoginStatus,
    repositories::{AccountRepository, LoginAuditRepository},
    user::{Account, ClientInfo},
};

/// Result of a login attempt.
///
/// Rejections are ordinary values, not errors: a locked account is an expected
/// outcome the page shows to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LoginOutcome {
    Authenticated(Account),
    /// Wrong password or unknown account. `remaining_attempts` is `None` for an
    /// unknown account, so nothing is revealed about which part was wrong.
    InvalidCredentials { remaining_attempts: Option<u32> },
    /// Too many failures; try again after `wait_minutes`.
    Locked { wait_minutes: i64 },
}

impl LoginOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, LoginOutcome::Authenticated(_))
    }

    pub fn account(&self) -> Option<&Account> {
        match self {
            LoginOutcome::Authenticated(account) => Some(account),
            _ => None,
        }
    }

    /// Human-readable explanation for the login page.
    pub fn message(&self) -> String {
        match self {
            LoginOutcome::Authenticated(account) => {
                format!("Welcome back, {}.", account.display_name())
            }
            LoginOutcome::InvalidCredentials {
                remaining_attempts: None,
            } => "Invalid username or password.".to_string(),
            LoginOutcome::InvalidCredentials {
                remaining_attempts: Some(n),
            } => format!("Incorrect password. {n} attempt(s) remaining."),
            LoginOutcome::Locked { wait_minutes } => format!(
                "This account is temporarily locked. Try again in {wait_minutes} minute(s)."
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoginService {
    config: LockoutConfig,
}

impl LoginService {
    pub fn new(config: LockoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    /// Attempt a login with a username or email and a password.
    ///
    /// The acting time is `ctx.timestamp()`.
    pub async fn login<R>(
        &self,
        repo: &mut R,
        identifier: &str,
        password: &str,
        client: &ClientInfo,
        ctx: &AuditContext,
    ) -> Result<LoginOutcome, Error>
    where
        R: AccountRepository + LoginAuditRepository + ?Sized,
    {
        let identifier = identifier.trim();
        if identifier.is_empty() || password.is_empty() {
            return Err(ValidationError::MissingField(
                "Username and password are required".to_string(),
            )
            .into());
        }

        let now = ctx.timestamp();

        let Some(mut account) = repo.find_account_by_login(identifier).await? else {
            tracing::debug!(identifier = %identifier, "Login attempt for unknown account");
            return Ok(LoginOutcome::InvalidCredentials {
                remaining_attempts: None,
            });
        };

        match account.lockout_state(now, &self.config) {
            state @ LockoutState::Locked { .. } => {
                repo.record_login(account.id, LoginStatus::Locked, client, now)
                    .await?;
                tracing::warn!(
                    account_id = %account.id,
                    attempts = account.login_attempts,
                    wait_minutes = state.wait_minutes(),
                    "Login refused: account locked"
                );
                return Ok(LoginOutcome::Locked {
                    wait_minutes: state.wait_minutes(),
                });
            }
            LockoutState::Expirable => {
                self.expire_lock(repo, account.id, now).await?;
                account.login_attempts = 0;
            }
            LockoutState::Open => {}
        }

        let verified = repo
            .password_hash(account.id)
            .await?
            .is_some_and(|hash| verify_password(password, &hash));

        if verified {
            repo.record_successful_login(account.id, now).await?;
            repo.record_login(account.id, LoginStatus::Success, client, now)
                .await?;

            account.login_attempts = 0;
            account.last_login = Some(now);
            tracing::info!(account_id = %account.id, "Login succeeded");
            return Ok(LoginOutcome::Authenticated(account));
        }

        let attempts = repo.record_failed_attempt(account.id, now).await?;
        repo.record_login(account.id, LoginStatus::Failure, client, now)
            .await?;

        let remaining = self.config.remaining_attempts(attempts);
        if remaining > 0 {
            tracing::info!(account_id = %account.id, attempts, remaining, "Login failed");
            return Ok(LoginOutcome::InvalidCredentials {
                remaining_attempts: Some(remaining),
            });
        }

        let lock_until = now + self.config.lockout_window;
        repo.open_lock(account.id, lock_until, now).await?;
        tracing::warn!(
            account_id = %account.id,
            attempts,
            lock_until = %lock_until,
            "Account locked after too many failed logins"
        );

        Ok(LoginOutcome::Locked {
            wait_minutes: LockoutState::Locked {
                remaining: self.config.lockout_window,
            }
            .wait_minutes(),
        })
    }

    /// Current lockout state of an account.
    pub async fn lockout_state<R>(
        &self,
        repo: &mut R,
        id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<LockoutState, Error>
    where
        R: AccountRepository + ?Sized,
    {
        let account = repo
            .find_account(id)
            .await?
            .ok_or(crate::error::AuthError::UserNotFound)?;
        Ok(account.lockout_state(now, &self.config))
    }

    /// Clear the failure counter of an account, locked or not.
    ///
    /// Returns whether the account was locked at `now`.
    pub async fn unlock<R>(
        &self,
        repo: &mut R,
        id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<bool, Error>
    where
        R: AccountRepository + LoginAuditRepository + ?Sized,
    {
        let was_locked = self.lockout_state(repo, id, now).await?.is_locked();
        self.expire_lock(repo, id, now).await?;
        tracing::info!(account_id = %id, was_locked, "Account unlocked");
        Ok(was_locked)
    }

    async fn expire_lock<R>(
        &self,
        repo: &mut R,
        id: AccountId,
        now: DateTime<Utc>,
    ) -> Result<(), Error>
    where
        R: AccountRepository + LoginAuditRepository + ?Sized,
    {
        repo.reset_login_attempts(id).await?;
        let released = repo.release_locks(id, now).await?;
        tracing::debug!(account_id = %id, released, "Lockout counter reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{MemoryStore, at};
    use chrono::Duration;

    const PASSWORD: &str = "correct-horse";

    async fn store_with_user() -> (MemoryStore, AccountId) {
        let mut store = MemoryStore::new();
        let id = store.add_account("alice", "alice@example.com", PASSWORD).await;
        (store, id)
    }

    fn client() -> ClientInfo {
        ClientInfo::new("127.0.0.1", "test-agent")
    }

    fn ctx(minutes: i64) -> AuditContext {
        AuditContext::new("anonymous", at(minutes))
    }

    #[tokio::test]
    async fn test_successful_login_resets_counter() {
        let (mut store, id) = store_with_user().await;
        store.set_attempts(id, 3, Some(at(0)));
        let service = LoginService::default();

        let outcome = service
            .login(&mut store, "alice", PASSWORD, &client(), &ctx(1))
            .await
            .unwrap();

        let account = outcome.account().unwrap();
        assert_eq!(account.login_attempts, 0);
        assert_eq!(account.last_login, Some(at(1)));
        assert_eq!(store.account(id).login_attempts, 0);
        assert_eq!(store.history_statuses(id), vec![LoginStatus::Success]);
    }

    #[tokio::test]
    async fn test_login_by_email() {
        let (mut store, _) = store_with_user().await;
        let outcome = LoginService::default()
            .login(&mut store, "alice@example.com", PASSWORD, &client(), &ctx(0))
            .await
            .unwrap();
        assert!(outcome.is_authenticated());
    }

    #[tokio::test]
    async fn test_unknown_account_is_generic_rejection() {
        let mut store = MemoryStore::new();
        let outcome = LoginService::default()
            .login(&mut store, "nobody", "whatever1", &client(), &ctx(0))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            LoginOutcome::InvalidCredentials {
                remaining_attempts: None
            }
        );
        assert_eq!(outcome.message(), "Invalid username or password.");
    }

    #[tokio::test]
    async fn test_empty_input_is_a_validation_error() {
        let mut store = MemoryStore::new();
        let err = LoginService::default()
            .login(&mut store, "  ", "x", &client(), &ctx(0))
            .await
            .unwrap_err();
        assert!(err.is_validation_error());
    }

    #[tokio::test]
    async fn test_failures_count_down_then_lock() {
        let (mut store, id) = store_with_user().await;
        let service = LoginService::default();

        for (i, expected) in [4, 3, 2, 1].into_iter().enumerate() {
            let outcome = service
                .login(&mut store, "alice", "wrong-pass", &client(), &ctx(i as i64))
                .await
                .unwrap();
            assert_eq!(
                outcome,
                LoginOutcome::InvalidCredentials {
                    remaining_attempts: Some(expected)
                }
            );
        }
        assert_eq!(store.account(id).login_attempts, 4);

        let outcome = service
            .login(&mut store, "alice", "wrong-pass", &client(), &ctx(4))
            .await
            .unwrap();
        assert_eq!(outcome, LoginOutcome::Locked { wait_minutes: 30 });
        assert_eq!(store.account(id).login_attempts, 5);
        assert_eq!(store.account(id).last_attempt_time, Some(at(4)));

        let lock = store.latest_lock_of(id).unwrap();
        assert_eq!(lock.lock_until, at(4) + Duration::minutes(30));
    }

    #[tokio::test]
    async fn test_locked_account_rejects_correct_password() {
        let (mut store, id) = store_with_user().await;
        store.set_attempts(id, 5, Some(at(0)));

        let outcome = LoginService::default()
            .login(&mut store, "alice", PASSWORD, &client(), &ctx(10))
            .await
            .unwrap();

        assert_eq!(outcome, LoginOutcome::Locked { wait_minutes: 20 });
        // counter untouched
        assert_eq!(store.account(id).login_attempts, 5);
        assert_eq!(store.account(id).last_attempt_time, Some(at(0)));
        assert_eq!(store.history_statuses(id), vec![LoginStatus::Locked]);
    }

    #[tokio::test]
    async fn test_expirable_account_is_reset_even_with_wrong_password() {
        let (mut store, id) = store_with_user().await;
        let last = at(0);
        store.set_attempts(id, 5, Some(last));

        // 30 minutes and 1 second later
        let ctx = AuditContext::new(
            "anonymous",
            last + Duration::minutes(30) + Duration::seconds(1),
        );
        let outcome = LoginService::default()
            .login(&mut store, "alice", "wrong-pass", &client(), &ctx)
            .await
            .unwrap();

        // the counter restarted from zero before this failure was counted
        assert_eq!(
            outcome,
            LoginOutcome::InvalidCredentials {
                remaining_attempts: Some(4)
            }
        );
        assert_eq!(store.account(id).login_attempts, 1);
    }

    #[tokio::test]
    async fn test_boundary_attempt_locks() {
        let (mut store, id) = store_with_user().await;
        store.set_attempts(id, 4, Some(at(0)));

        let outcome = LoginService::default()
            .login(&mut store, "alice", "wrong-pass", &client(), &ctx(1))
            .await
            .unwrap();

        assert!(matches!(outcome, LoginOutcome::Locked { .. }));
        assert!(
            store
                .account(id)
                .lockout_state(at(1), &LockoutConfig::default())
                .is_locked()
        );
    }

    #[tokio::test]
    async fn test_unlock_clears_counter_and_releases_lock() {
        let (mut store, id) = store_with_user().await;
        let service = LoginService::default();
        store.set_attempts(id, 4, Some(at(0)));
        service
            .login(&mut store, "alice", "wrong-pass", &client(), &ctx(0))
            .await
            .unwrap();

        assert!(service.unlock(&mut store, id, at(1)).await.unwrap());
        assert_eq!(store.account(id).login_attempts, 0);
        assert!(store.latest_lock_of(id).unwrap().released_at.is_some());

        assert!(!service.unlock(&mut store, id, at(2)).await.unwrap());
    }

    #[test]
    fn test_outcome_messages() {
        assert_eq!(
            LoginOutcome::InvalidCredentials {
                remaining_attempts: Some(2)
            }
            .message(),
            "Incorrect password. 2 attempt(s) remaining."
        );
        assert_eq!(
            LoginOutcome::Locked { wait_minutes: 7 }.message(),
            "This account is temporarily locked. Try again in 7 minute(s)."
        );
    }
}
