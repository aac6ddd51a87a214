//! Repository trait for the login history and lock log.
//!
//! Both tables are append-mostly records of what the lockout state machine
//! did. They are not consulted to decide whether an account is locked; that
//! is derived from the account row alone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    id::AccountId,
    login::{LoginLock, LoginRecord, LoginStatus},
    user::ClientInfo,
};

#[async_trait]
pub trait LoginAuditRepository: Send {
    /// Append a row to `login_history`.
    async fn record_login(
        &mut self,
        id: AccountId,
        status: LoginStatus,
        client: &ClientInfo,
        at: DateTime<Utc>,
    ) -> Result<(), Error>;

    /// Most recent attempts first.
    async fn login_history(
        &mut self,
        id: AccountId,
        limit: u32,
    ) -> Result<Vec<LoginRecord>, Error>;

    /// Append a row to `login_locks`.
    async fn open_lock(
        &mut self,
        id: AccountId,
        lock_until: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<(), Error>;

    /// Stamp `released_at` on every unreleased lock of the account.
    async fn release_locks(&mut self, id: AccountId, at: DateTime<Utc>) -> Result<u64, Error>;

    /// The newest unreleased lock, if any.
    async fn latest_lock(&mut self, id: AccountId) -> Result<Option<LoginLock>, Error>;

    /// Delete history and lock rows of the account.
    async fn delete_login_records(&mut self, id: AccountId) -> Result<u64, Error>;
}
