//! SQLite data access layer for quill
//!
//! [`Database`] is a request-scoped handle owning exactly one SQLite
//! connection. It offers two ways to reach the datastore:
//!
//! - [`Database::query`] runs raw SQL with named `:placeholders`, unmodified
//! - [`Database::execute`] runs a typed [`Mutation`], stamping the audit
//!   columns from an [`AuditContext`] first
//!
//! On top of these it implements every `quill_core` repository trait, so a
//! transaction opened with [`Database::begin_transaction`] covers all of them.
//!
//! # Example
//!
//! ```rust,no_run
//! use quill_core::{AuditContext, Mutation, Table};
//! use quill_storage_sqlite::{Database, Params};
//!
//! # async fn example() -> Result<(), quill_core::Error> {
//! let mut db = Database::connect("sqlite://quill.db?mode=rwc").await?;
//! let ctx = AuditContext::now("alice");
//!
//! db.execute(
//!     &Mutation::update(Table::Posts).set("title", "Renamed").filter("id", 1),
//!     &ctx,
//! )
//! .await?;
//!
//! let rows = db
//!     .query("SELECT updated_by FROM posts WHERE id = :id", &Params::new().bind("id", 1))
//!     .await?;
//! # let _ = rows;
//! db.close().await?;
//! # Ok(())
//! # }
//! ```
mod repositories;
mod schema;
mod statement;

use std::str::FromStr;

use chrono::Utc;
use quill_core::{AuditContext, Error, Mutation, error::StorageError};
use sqlx::{
    ConnectOptions, Connection, FromRow, SqliteConnection,
    sqlite::{SqliteConnectOptions, SqliteRow},
};

pub use schema::table_columns;
pub use statement::Params;

use statement::Prepared;

/// Outcome of [`Database::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Executed {
    pub rows_affected: u64,
    /// Rowid of the last inserted row on this connection.
    pub last_insert_id: i64,
}

/// One connection to the quill datastore.
pub struct Database {
    conn: Option<SqliteConnection>,
    in_transaction: bool,
}

impl Database {
    /// Open the datastore at `url`, creating the file and schema if missing.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(url).map_err(|e| {
            tracing::error!(error = %e, url, "Invalid database URL");
            StorageError::Connection(e.to_string())
        })?;

        Self::connect_with(options.create_if_missing(true)).await
    }

    /// Open a connection with explicit options. Foreign keys are always enforced.
    pub async fn connect_with(options: SqliteConnectOptions) -> Result<Self, Error> {
        let conn = options.foreign_keys(true).connect().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to open database");
            StorageError::Connection(e.to_string())
        })?;

        let mut db = Self {
            conn: Some(conn),
            in_transaction: false,
        };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// A private in-memory datastore with the schema applied.
    pub async fn open_in_memory() -> Result<Self, Error> {
        Self::connect("sqlite::memory:").await
    }

    /// Create missing tables and check the audit policy against them.
    pub async fn ensure_schema(&mut self) -> Result<(), Error> {
        let conn = self.conn()?;
        schema::ensure_schema(conn).await?;
        schema::verify_audit_columns(conn).await
    }

    pub(crate) fn conn(&mut self) -> Result<&mut SqliteConnection, Error> {
        self.conn.as_mut().ok_or_else(|| {
            StorageError::Connection("database connection is closed".to_string()).into()
        })
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Run a raw statement and return every row.
    ///
    /// `:name` placeholders are bound from `params`. The statement text is
    /// otherwise passed to SQLite as written; audit columns are not touched.
    pub async fn query(&mut self, sql: &str, params: &Params) -> Result<Vec<SqliteRow>, Error> {
        let prepared = statement::expand_named(sql, params)?;
        let conn = self.conn()?;
        prepared
            .bind()
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| statement_failed(&e, &prepared, None))
    }

    /// Like [`query`](Self::query), returning the first row if any.
    pub async fn query_optional(
        &mut self,
        sql: &str,
        params: &Params,
    ) -> Result<Option<SqliteRow>, Error> {
        let prepared = statement::expand_named(sql, params)?;
        let conn = self.conn()?;
        prepared
            .bind()
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| statement_failed(&e, &prepared, None))
    }

    /// [`query`](Self::query), decoding every row as `T`.
    pub(crate) async fn fetch_all<T>(
        &mut self,
        sql: &str,
        params: &Params,
    ) -> Result<Vec<T>, Error>
    where
        T: for<'r> FromRow<'r, SqliteRow>,
    {
        self.query(sql, params).await?.iter().map(decode_row).collect()
    }

    /// [`query_optional`](Self::query_optional), decoding the row as `T`.
    pub(crate) async fn fetch_optional<T>(
        &mut self,
        sql: &str,
        params: &Params,
    ) -> Result<Option<T>, Error>
    where
        T: for<'r> FromRow<'r, SqliteRow>,
    {
        self.query_optional(sql, params)
            .await?
            .as_ref()
            .map(decode_row)
            .transpose()
    }

    /// Like [`fetch_optional`](Self::fetch_optional), but a missing row is `NotFound`.
    pub(crate) async fn fetch_one<T>(&mut self, sql: &str, params: &Params) -> Result<T, Error>
    where
        T: for<'r> FromRow<'r, SqliteRow>,
    {
        self.fetch_optional(sql, params)
            .await?
            .ok_or_else(|| StorageError::NotFound.into())
    }

    /// Run a raw statement that returns no rows. Nothing is stamped; `ctx`
    /// names the actor in failure logs.
    pub(crate) async fn execute_raw(
        &mut self,
        sql: &str,
        params: &Params,
        ctx: &AuditContext,
    ) -> Result<Executed, Error> {
        let prepared = statement::expand_named(sql, params)?;
        let conn = self.conn()?;

        let result = prepared
            .bind()
            .execute(&mut *conn)
            .await
            .map_err(|e| statement_failed(&e, &prepared, Some(ctx)))?;

        Ok(Executed {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_rowid(),
        })
    }

    /// Stamp `mutation` from `ctx` and run it.
    pub async fn execute(
        &mut self,
        mutation: &Mutation,
        ctx: &AuditContext,
    ) -> Result<Executed, Error> {
        let stamped = mutation.clone().stamped(ctx);
        let prepared = statement::render(&stamped)?;
        let conn = self.conn()?;

        let result = prepared
            .bind()
            .execute(&mut *conn)
            .await
            .map_err(|e| statement_failed(&e, &prepared, Some(ctx)))?;

        Ok(Executed {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_rowid(),
        })
    }

    /// Rowid of the most recent successful INSERT on this connection.
    pub async fn last_insert_id(&mut self) -> Result<i64, Error> {
        let conn = self.conn()?;
        sqlx::query_scalar::<_, i64>("SELECT last_insert_rowid()")
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to read last insert id");
                StorageError::Query(e.to_string()).into()
            })
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Open a transaction. Transactions do not nest.
    pub async fn begin_transaction(&mut self) -> Result<(), Error> {
        if self.in_transaction {
            return Err(
                StorageError::Transaction("a transaction is already open".to_string()).into(),
            );
        }
        self.run_control("BEGIN").await?;
        self.in_transaction = true;
        tracing::debug!("Transaction started");
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<(), Error> {
        if !self.in_transaction {
            return Err(StorageError::Transaction("no transaction to commit".to_string()).into());
        }
        self.run_control("COMMIT").await?;
        self.in_transaction = false;
        tracing::debug!("Transaction committed");
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<(), Error> {
        if !self.in_transaction {
            return Err(StorageError::Transaction("no transaction to roll back".to_string()).into());
        }
        // SQLite ends the transaction even when ROLLBACK reports an error
        self.in_transaction = false;
        self.run_control("ROLLBACK").await?;
        tracing::debug!("Transaction rolled back");
        Ok(())
    }

    async fn run_control(&mut self, statement: &'static str) -> Result<(), Error> {
        let conn = self.conn()?;
        sqlx::query(statement)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, statement, "Transaction control failed");
                StorageError::Transaction(e.to_string())
            })?;
        Ok(())
    }

    /// Release the connection. Closing twice is a no-op.
    ///
    /// A transaction still open at this point is abandoned and SQLite rolls it back.
    pub async fn close(&mut self) -> Result<(), Error> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };

        if self.in_transaction {
            tracing::warn!("Closing database with an open transaction; it will be rolled back");
            self.in_transaction = false;
        }

        conn.close().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to close database");
            StorageError::Connection(e.to_string()).into()
        })
    }
}

fn decode_row<T>(row: &SqliteRow) -> Result<T, Error>
where
    T: for<'r> FromRow<'r, SqliteRow>,
{
    T::from_row(row).map_err(|e| {
        tracing::error!(error = %e, "Failed to decode row");
        StorageError::Query(format!("Failed to decode row: {e}")).into()
    })
}

/// Log a failed statement with its (redacted) parameters and acting
/// identity, and classify the error.
fn statement_failed(error: &sqlx::Error, prepared: &Prepared, ctx: Option<&AuditContext>) -> Error {
    let (actor, timestamp) = match ctx {
        Some(ctx) => (ctx.actor().to_string(), ctx.timestamp()),
        None => ("-".to_string(), Utc::now()),
    };

    tracing::error!(
        error = %error,
        statement = %prepared.sql,
        params = %prepared.describe(),
        actor = %actor,
        timestamp = %timestamp,
        "Statement failed"
    );

    let constraint = error.as_database_error().is_some_and(|db| {
        db.is_unique_violation() || db.is_foreign_key_violation() || db.is_check_violation()
    });
    if constraint {
        StorageError::Constraint(error.to_string()).into()
    } else {
        StorageError::Query(error.to_string()).into()
    }
}
