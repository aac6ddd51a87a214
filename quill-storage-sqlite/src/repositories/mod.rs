//! Repository implementations for SQLite storage
//!
//! Every `quill_core` repository trait is implemented directly on
//! [`Database`], so all of them share its connection and its transaction.
//! User-driven writes go through [`Database::execute`] and get stamped;
//! bookkeeping writes are built with `without_audit`.

mod account;
mod category;
mod login_audit;
mod post;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quill_core::{AuditContext, Error, audit::SYSTEM_ACTOR, repositories::Transactional};

use crate::Database;

#[async_trait]
impl Transactional for Database {
    async fn begin(&mut self) -> Result<(), Error> {
        self.begin_transaction().await
    }

    async fn commit(&mut self) -> Result<(), Error> {
        Database::commit(self).await
    }

    async fn rollback(&mut self) -> Result<(), Error> {
        Database::rollback(self).await
    }

    fn in_transaction(&self) -> bool {
        Database::in_transaction(self)
    }
}

/// Context for system-driven bookkeeping writes. Only used for logging,
/// since those mutations are never stamped.
fn bookkeeping(at: DateTime<Utc>) -> AuditContext {
    AuditContext::new(SYSTEM_ACTOR, at)
}

/// Stored unix seconds to a timestamp. Out-of-range values read as the epoch.
fn timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn optional_timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
