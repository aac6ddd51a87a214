//! Audit attribution for mutating statements
//!
//! Rows in tables that carry `created_by`/`created_at` or `updated_by`/`updated_at`
//! columns are stamped with the identity and timestamp of the acting request.
//!
//! Which tables carry which columns is declared once, in [`Table::audit_columns`],
//! instead of being discovered at runtime. The storage backend verifies this
//! declaration against the live schema when it connects.
//!
//! The acting identity travels in an explicit [`AuditContext`] value that callers
//! hand to every mutation. A context belongs to one request; nothing about it is
//! stored on the connection.

use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::user::Account;

/// Identity used when the platform itself, rather than a signed-in user, acts.
pub const SYSTEM_ACTOR: &str = "system";

/// Identity used for requests without a signed-in user (signup, password reset).
pub const ANONYMOUS_ACTOR: &str = "anonymous";

/// The acting identity and acting timestamp of one request.
///
/// The timestamp is captured when the context is created, not when rows are
/// persisted: every stamp written during the request carries the same value
/// until [`AuditContext::refresh_timestamp`] is called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    actor: String,
    timestamp: DateTime<Utc>,
}

impl AuditContext {
    pub fn new(actor: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            actor: actor.into(),
            // stored as unix seconds, so keep the in-memory value comparable
            timestamp: timestamp.trunc_subsecs(0),
        }
    }

    /// A context for `actor` stamped with the current time.
    pub fn now(actor: impl Into<String>) -> Self {
        Self::new(actor, Utc::now())
    }

    pub fn system() -> Self {
        Self::now(SYSTEM_ACTOR)
    }

    pub fn anonymous() -> Self {
        Self::now(ANONYMOUS_ACTOR)
    }

    /// A context acting on behalf of a signed-in account.
    pub fn for_account(account: &Account) -> Self {
        Self::now(account.username.clone())
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Replace the identity used for subsequent audit stamps.
    pub fn set_current_user(&mut self, identity: impl Into<String>) {
        self.actor = identity.into();
    }

    /// Re-read the clock for subsequent audit stamps.
    pub fn refresh_timestamp(&mut self) {
        self.timestamp = Utc::now().trunc_subsecs(0);
    }

    /// Same actor, different acting time.
    pub fn at(&self, timestamp: DateTime<Utc>) -> Self {
        Self::new(self.actor.clone(), timestamp)
    }
}

/// Tables owned by the data access layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Table {
    Users,
    Posts,
    Categories,
    PostCategories,
    LoginHistory,
    LoginLocks,
}

/// Which audit column pairs a table declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuditColumns {
    /// `created_by` and `created_at`
    pub created: bool,
    /// `updated_by` and `updated_at`
    pub updated: bool,
}

impl AuditColumns {
    pub const NONE: AuditColumns = AuditColumns {
        created: false,
        updated: false,
    };

    pub const CREATED: AuditColumns = AuditColumns {
        created: true,
        updated: false,
    };

    pub const FULL: AuditColumns = AuditColumns {
        created: true,
        updated: true,
    };
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Users,
        Table::Posts,
        Table::Categories,
        Table::PostCategories,
        Table::LoginHistory,
        Table::LoginLocks,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Posts => "posts",
            Table::Categories => "categories",
            Table::PostCategories => "post_categories",
            Table::LoginHistory => "login_history",
            Table::LoginLocks => "login_locks",
        }
    }

    /// The audit columns this table declares.
    ///
    /// `login_history` and `login_locks` have a `created_at` column but no
    /// `created_by`, so they are not audit-capable: both columns of a pair
    /// must be present.
    pub fn audit_columns(&self) -> AuditColumns {
        match self {
            Table::Users | Table::Posts => AuditColumns::FULL,
            Table::Categories => AuditColumns::CREATED,
            Table::PostCategories | Table::LoginHistory | Table::LoginLocks => AuditColumns::NONE,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_set_current_user_changes_actor_only() {
        let ts = Utc.with_ymd_and_hms(2025, 3, 11, 17, 1, 16).unwrap();
        let mut ctx = AuditContext::new("alice", ts);

        ctx.set_current_user("bob");

        assert_eq!(ctx.actor(), "bob");
        assert_eq!(ctx.timestamp(), ts);
    }

    #[test]
    fn test_timestamp_is_truncated_to_seconds() {
        let ts = Utc.timestamp_opt(1_700_000_000, 999_000_000).unwrap();
        let ctx = AuditContext::new("alice", ts);
        assert_eq!(ctx.timestamp().timestamp_subsec_nanos(), 0);
        assert_eq!(ctx.timestamp().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_audit_policy() {
        assert_eq!(Table::Users.audit_columns(), AuditColumns::FULL);
        assert_eq!(Table::Posts.audit_columns(), AuditColumns::FULL);
        assert_eq!(Table::Categories.audit_columns(), AuditColumns::CREATED);
        assert_eq!(Table::PostCategories.audit_columns(), AuditColumns::NONE);
        assert_eq!(Table::LoginHistory.audit_columns(), AuditColumns::NONE);
        assert_eq!(Table::LoginLocks.audit_columns(), AuditColumns::NONE);
    }

    #[test]
    fn test_table_names() {
        let names: Vec<_> = Table::ALL.iter().map(Table::name).collect();
        assert_eq!(
            names,
            vec![
                "users",
                "posts",
                "categories",
                "post_categories",
                "login_history",
                "login_locks"
            ]
        );
    }
}
