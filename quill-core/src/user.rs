//! Accounts
//!
//! | Field               | Type               | Description                                      |
//! | ------------------- | ------------------ | ------------------------------------------------ |
//! | `id`                | `AccountId`        | Autoincrement row id.                            |
//! | `username`          | `String`           | Unique, `[A-Za-z0-9_]{3,20}`.                    |
//! | `email`             | `String`           | Unique.                                          |
//! | `login_attempts`    | `u32`              | Consecutive failed logins.                       |
//! | `last_attempt_time` | `Option<DateTime>` | Time of the most recent failed login.            |
//! | `last_login`        | `Option<DateTime>` | Time of the most recent successful login.        |
//!
//! The password hash and reset token are deliberately not part of [`Account`];
//! they are only reachable through the repository methods that need them.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{audit::AuditContext, id::AccountId, lockout};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub profile_image: Option<String>,
    pub bio: Option<String>,
    pub login_attempts: u32,
    pub last_attempt_time: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

impl Account {
    /// Name shown on public pages.
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }

    pub fn lockout_state(
        &self,
        now: DateTime<Utc>,
        config: &lockout::LockoutConfig,
    ) -> lockout::LockoutState {
        lockout::classify(self.login_attempts, self.last_attempt_time, now, config)
    }

    /// An audit context acting on behalf of this account.
    pub fn audit_context(&self) -> AuditContext {
        AuditContext::for_account(self)
    }
}

/// Fields visible on a public profile page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: AccountId,
    pub username: String,
    pub display_name: Option<String>,
    pub profile_image: Option<String>,
    pub bio: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<Account> for PublicProfile {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            username: account.username,
            display_name: account.display_name,
            profile_image: account.profile_image,
            bio: account.bio,
            created_at: account.created_at,
        }
    }
}

/// A validated account ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
}

/// Signup form input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub display_name: Option<String>,
}

/// Profile form input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub profile_image: Option<String>,
}

/// Where a login attempt came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip_address: String,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
        }
    }
}
