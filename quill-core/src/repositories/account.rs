//! Repository trait for accounts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    audit::AuditContext,
    id::AccountId,
    user::{Account, NewAccount, ProfileUpdate},
};

/// Storage operations on the `users` table.
///
/// Methods taking an [`AuditContext`] are user-driven changes and stamp the
/// audit columns. The lockout and reset-token bookkeeping methods are
/// system-driven and never touch `updated_by`/`updated_at`.
#[async_trait]
pub trait AccountRepository: Send {
    /// Insert a new account, stamping `created_by`/`created_at` from `ctx`.
    async fn create_account(
        &mut self,
        account: &NewAccount,
        ctx: &AuditContext,
    ) -> Result<Account, Error>;

    async fn find_account(&mut self, id: AccountId) -> Result<Option<Account>, Error>;

    async fn find_account_by_username(&mut self, username: &str)
    -> Result<Option<Account>, Error>;

    async fn find_account_by_email(&mut self, email: &str) -> Result<Option<Account>, Error>;

    /// Look up an account by username or email, whichever matches.
    async fn find_account_by_login(&mut self, identifier: &str)
    -> Result<Option<Account>, Error>;

    /// Whether another account already uses `username` or `email`.
    ///
    /// `exclude` skips one account, so a profile can be saved unchanged.
    async fn is_username_or_email_taken(
        &mut self,
        username: &str,
        email: &str,
        exclude: Option<AccountId>,
    ) -> Result<bool, Error>;

    async fn password_hash(&mut self, id: AccountId) -> Result<Option<String>, Error>;

    async fn set_password_hash(
        &mut self,
        id: AccountId,
        hash: &str,
        ctx: &AuditContext,
    ) -> Result<(), Error>;

    async fn update_profile(
        &mut self,
        id: AccountId,
        profile: &ProfileUpdate,
        ctx: &AuditContext,
    ) -> Result<(), Error>;

    /// Increment `login_attempts`, stamp `last_attempt_time`, and return the new count.
    async fn record_failed_attempt(
        &mut self,
        id: AccountId,
        at: DateTime<Utc>,
    ) -> Result<u32, Error>;

    /// Set `login_attempts` back to zero.
    async fn reset_login_attempts(&mut self, id: AccountId) -> Result<(), Error>;

    /// Reset `login_attempts` and stamp `last_login`.
    async fn record_successful_login(
        &mut self,
        id: AccountId,
        at: DateTime<Utc>,
    ) -> Result<(), Error>;

    /// Store the digest of a reset token, replacing any previous one.
    async fn set_reset_token(
        &mut self,
        id: AccountId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error>;

    /// Find the account holding an unexpired reset token with this digest.
    async fn find_account_by_reset_token(
        &mut self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, Error>;

    async fn clear_reset_token(&mut self, id: AccountId) -> Result<(), Error>;

    /// Delete the account row. Dependent rows must already be gone.
    async fn delete_account(&mut self, id: AccountId) -> Result<u64, Error>;
}
