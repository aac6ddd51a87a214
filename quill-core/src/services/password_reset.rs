//! Password reset by emailed token.
//!
//! The plaintext token only ever exists in the reset link; the account row
//! holds its SHA256 digest and an expiry. Requesting a new token replaces the
//! old one, so an account has at most one active token.

use chrono::{DateTime, Duration, Utc};

use crate::{
    Error,
    audit::AuditContext,
    crypto::{generate_secure_token, hash_password, hash_token},
    error::AuthError,
    repositories::{RepositoryProvider, finish_transaction},
    user::Account,
    validation::{validate_email, validate_new_password},
};

/// Default lifetime of a reset token.
pub const DEFAULT_RESET_TOKEN_HOURS: i64 = 24;

/// A freshly issued token and the account it belongs to.
#[derive(Debug, Clone)]
pub struct ResetRequest {
    pub account: Account,
    /// Plaintext token, to be sent to the account's email address.
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PasswordResetService {
    token_ttl: Duration,
}

impl Default for PasswordResetService {
    fn default() -> Self {
        Self::new(Duration::hours(DEFAULT_RESET_TOKEN_HOURS))
    }
}

impl PasswordResetService {
    pub fn new(token_ttl: Duration) -> Self {
        Self { token_ttl }
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// Issue a reset token for the account with this email.
    ///
    /// An unknown email yields `Ok(None)`; the page shows the same message
    /// either way so the form does not reveal which addresses are registered.
    pub async fn request_reset<R>(
        &self,
        repo: &mut R,
        email: &str,
        ctx: &AuditContext,
    ) -> Result<Option<ResetRequest>, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        let email = email.trim();
        validate_email(email)?;

        let Some(account) = repo.find_account_by_email(email).await? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(None);
        };

        let token = generate_secure_token()?;
        let expires_at = ctx.timestamp() + self.token_ttl;
        repo.set_reset_token(account.id, &hash_token(&token), expires_at)
            .await?;

        tracing::info!(
            account_id = %account.id,
            expires_at = %expires_at,
            "Password reset token issued"
        );
        Ok(Some(ResetRequest {
            account,
            token,
            expires_at,
        }))
    }

    /// Whether `token` is currently valid for some account.
    pub async fn verify_token<R>(
        &self,
        repo: &mut R,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        Ok(repo
            .find_account_by_reset_token(&hash_token(token), now)
            .await?
            .is_some())
    }

    /// Set a new password using a reset token.
    ///
    /// Consumes the token and clears the login failure counter, so a reset
    /// also unlocks a locked account. All of it commits or none of it does.
    pub async fn reset_password<R>(
        &self,
        repo: &mut R,
        token: &str,
        new_password: &str,
        confirm_password: &str,
        ctx: &AuditContext,
    ) -> Result<Account, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        let account = repo
            .find_account_by_reset_token(&hash_token(token), ctx.timestamp())
            .await?
            .ok_or(AuthError::InvalidResetToken)?;

        validate_new_password(new_password, confirm_password)?;

        let mut acting = ctx.clone();
        acting.set_current_user(account.username.clone());

        let password_hash = hash_password(new_password);

        repo.begin().await?;
        let result: Result<(), Error> = async {
            repo.set_password_hash(account.id, &password_hash, &acting)
                .await?;
            repo.clear_reset_token(account.id).await?;
            repo.reset_login_attempts(account.id).await?;
            repo.release_locks(account.id, ctx.timestamp()).await?;
            Ok(())
        }
        .await;
        finish_transaction(repo, result).await?;

        tracing::info!(account_id = %account.id, "Password reset completed");
        repo.find_account(account.id)
            .await?
            .ok_or_else(|| AuthError::UserNotFound.into())
    }
}

/// The link mailed to the user.
pub fn reset_link(site_url: &str, token: &str) -> String {
    format!(
        "{}/reset-password?token={token}",
        site_url.trim_end_matches('/')
    )
}
