use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quill_core::{
    AccountId, ClientInfo, Error, Mutation, Table, Value,
    error::StorageError,
    login::{LoginLock, LoginRecord, LoginStatus},
    repositories::LoginAuditRepository,
};

use super::{bookkeeping, optional_timestamp, timestamp};
use crate::{Database, Params};

#[derive(Debug, sqlx::FromRow)]
struct SqliteLoginRecord {
    id: i64,
    user_id: i64,
    login_time: i64,
    ip_address: Option<String>,
    user_agent: Option<String>,
    status: String,
}

impl TryFrom<SqliteLoginRecord> for LoginRecord {
    type Error = Error;

    fn try_from(row: SqliteLoginRecord) -> Result<Self, Self::Error> {
        let status: LoginStatus = row.status.parse().map_err(|_| {
            StorageError::Query(format!(
                "login record {} has unknown status '{}'",
                row.id, row.status
            ))
        })?;

        Ok(LoginRecord {
            id: row.id,
            user_id: AccountId::new(row.user_id),
            login_time: timestamp(row.login_time),
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            status,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteLoginLock {
    id: i64,
    user_id: i64,
    lock_until: i64,
    created_at: i64,
    released_at: Option<i64>,
}

impl From<SqliteLoginLock> for LoginLock {
    fn from(row: SqliteLoginLock) -> Self {
        LoginLock {
            id: row.id,
            user_id: AccountId::new(row.user_id),
            lock_until: timestamp(row.lock_until),
            created_at: timestamp(row.created_at),
            released_at: optional_timestamp(row.released_at),
        }
    }
}

#[async_trait]
impl LoginAuditRepository for Database {
    async fn record_login(
        &mut self,
        id: AccountId,
        status: LoginStatus,
        client: &ClientInfo,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.execute(
            &Mutation::insert(Table::LoginHistory)
                .value("user_id", id)
                .value("login_time", at)
                .value("ip_address", &client.ip_address)
                .value("user_agent", &client.user_agent)
                .value("status", status.as_str())
                .value("created_at", at)
                .without_audit(),
            &bookkeeping(at),
        )
        .await?;
        Ok(())
    }

    async fn login_history(
        &mut self,
        id: AccountId,
        limit: u32,
    ) -> Result<Vec<LoginRecord>, Error> {
        let rows: Vec<SqliteLoginRecord> = self
            .fetch_all(
                r#"
                SELECT id, user_id, login_time, ip_address, user_agent, status
                FROM login_history
                WHERE user_id = :user
                ORDER BY login_time DESC, id DESC
                LIMIT :limit
                "#,
                &Params::new().bind("user", id).bind("limit", limit),
            )
            .await?;

        rows.into_iter().map(LoginRecord::try_from).collect()
    }

    async fn open_lock(
        &mut self,
        id: AccountId,
        lock_until: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.execute(
            &Mutation::insert(Table::LoginLocks)
                .value("user_id", id)
                .value("lock_until", lock_until)
                .value("created_at", at)
                .without_audit(),
            &bookkeeping(at),
        )
        .await?;

        tracing::debug!(account_id = %id, lock_until = %lock_until, "Lock recorded");
        Ok(())
    }

    async fn release_locks(&mut self, id: AccountId, at: DateTime<Utc>) -> Result<u64, Error> {
        let executed = self
            .execute(
                &Mutation::update(Table::LoginLocks)
                    .set("released_at", at)
                    .filter("user_id", id)
                    .filter("released_at", Value::Null)
                    .without_audit(),
                &bookkeeping(at),
            )
            .await?;
        Ok(executed.rows_affected)
    }

    async fn latest_lock(&mut self, id: AccountId) -> Result<Option<LoginLock>, Error> {
        let row: Option<SqliteLoginLock> = self
            .fetch_optional(
                r#"
                SELECT id, user_id, lock_until, created_at, released_at
                FROM login_locks
                WHERE user_id = :user AND released_at IS NULL
                ORDER BY created_at DESC, id DESC
                LIMIT 1
                "#,
                &Params::new().bind("user", id),
            )
            .await?;

        Ok(row.map(LoginLock::from))
    }

    async fn delete_login_records(&mut self, id: AccountId) -> Result<u64, Error> {
        let ctx = bookkeeping(Utc::now());
        let history = self
            .execute(
                &Mutation::delete(Table::LoginHistory).filter("user_id", id),
                &ctx,
            )
            .await?;
        let locks = self
            .execute(&Mutation::delete(Table::LoginLocks).filter("user_id", id), &ctx)
            .await?;
        Ok(history.rows_affected + locks.rows_affected)
    }
}
