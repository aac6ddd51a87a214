//! Repository traits for the data access layer
//!
//! Services never see SQL. They talk to storage through these traits, which a
//! storage backend implements on its request-scoped handle.
//!
//! # Trait Hierarchy
//!
//! - Individual `*Repository` traits define the operations for each data domain
//! - [`Transactional`] exposes explicit transaction control on the same handle
//! - [`RepositoryProvider`] is a supertrait combining all of the above
//!
//! All methods take `&mut self`: a handle owns exactly one connection and is
//! used by one request at a time, and a transaction opened through
//! [`Transactional`] covers every repository call made on that handle until it
//! is committed or rolled back.

pub mod account;
pub mod category;
pub mod login_audit;
pub mod post;

pub use account::AccountRepository;
pub use category::CategoryRepository;
pub use login_audit::LoginAuditRepository;
pub use post::PostRepository;

use async_trait::async_trait;

use crate::Error;

/// Explicit transaction control.
///
/// Transactions do not nest: `begin` while one is open, or `commit`/`rollback`
/// with none open, fails with
/// [`StorageError::Transaction`](crate::error::StorageError::Transaction).
#[async_trait]
pub trait Transactional: Send {
    async fn begin(&mut self) -> Result<(), Error>;

    async fn commit(&mut self) -> Result<(), Error>;

    async fn rollback(&mut self) -> Result<(), Error>;

    fn in_transaction(&self) -> bool;
}

/// Everything a service needs from storage.
///
/// Blanket-implemented for any type implementing all repository traits.
pub trait RepositoryProvider:
    AccountRepository + PostRepository + CategoryRepository + LoginAuditRepository + Transactional
{
}

impl<T> RepositoryProvider for T where
    T: AccountRepository
        + PostRepository
        + CategoryRepository
        + LoginAuditRepository
        + Transactional
{
}

/// Commit if `result` is `Ok`, roll back otherwise.
///
/// A failed rollback is logged; the original error is returned.
pub async fn finish_transaction<R, T>(repo: &mut R, result: Result<T, Error>) -> Result<T, Error>
where
    R: Transactional + ?Sized,
{
    match result {
        Ok(value) => {
            repo.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = repo.rollback().await {
                tracing::error!(error = %rollback_err, original = %e, "Rollback failed");
            }
            Err(e)
        }
    }
}
