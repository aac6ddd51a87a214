//! Table definitions owned by the data access layer.
//!
//! Every statement is idempotent; running [`ensure_schema`] against an
//! existing database leaves it unchanged. Timestamps are INTEGER unix seconds.
//! Audit columns have no defaults, so a row nobody stamped keeps them NULL.

use quill_core::{Error, Table, error::StorageError, mutation};
use sqlx::{Row, SqliteConnection};

const TABLES: [&str; 6] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        display_name TEXT,
        profile_image TEXT,
        bio TEXT,
        created_at INTEGER,
        updated_at INTEGER,
        created_by TEXT,
        updated_by TEXT,
        last_login INTEGER,
        reset_token TEXT,
        reset_token_expires_at INTEGER,
        login_attempts INTEGER NOT NULL DEFAULT 0,
        last_attempt_time INTEGER
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        title TEXT NOT NULL,
        content TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'draft' CHECK (status IN ('draft', 'published')),
        featured_image TEXT,
        view_count INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER,
        updated_at INTEGER,
        created_by TEXT,
        updated_by TEXT
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        slug TEXT NOT NULL UNIQUE,
        created_at INTEGER,
        created_by TEXT
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS post_categories (
        post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
        PRIMARY KEY (post_id, category_id)
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS login_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        login_time INTEGER NOT NULL,
        ip_address TEXT,
        user_agent TEXT,
        status TEXT NOT NULL CHECK (status IN ('success', 'failure', 'locked')),
        created_at INTEGER
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS login_locks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        lock_until INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        released_at INTEGER
    )"#,
];

const INDEXES: [&str; 6] = [
    "CREATE INDEX IF NOT EXISTS idx_posts_user_id ON posts(user_id)",
    "CREATE INDEX IF NOT EXISTS idx_posts_status_created_at ON posts(status, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_post_categories_category_id ON post_categories(category_id)",
    "CREATE INDEX IF NOT EXISTS idx_users_reset_token ON users(reset_token)",
    "CREATE INDEX IF NOT EXISTS idx_login_history_user_id ON login_history(user_id, login_time)",
    "CREATE INDEX IF NOT EXISTS idx_login_locks_user_id ON login_locks(user_id)",
];

/// Create every table and index that does not exist yet.
pub async fn ensure_schema(conn: &mut SqliteConnection) -> Result<(), Error> {
    for statement in TABLES.iter().chain(INDEXES.iter()) {
        sqlx::query(statement).execute(&mut *conn).await.map_err(|e| {
            tracing::error!(error = %e, statement = statement.trim(), "Failed to create schema");
            StorageError::Schema(e.to_string())
        })?;
    }

    tracing::debug!(tables = TABLES.len(), indexes = INDEXES.len(), "Schema ensured");
    Ok(())
}

/// Column names of `table` as reported by SQLite.
pub async fn table_columns(
    conn: &mut SqliteConnection,
    table: Table,
) -> Result<Vec<String>, Error> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table.name()))
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, table = %table, "Failed to read table info");
            StorageError::Schema(e.to_string())
        })?;

    rows.iter()
        .map(|row| {
            row.try_get::<String, _>("name")
                .map_err(|e| StorageError::Schema(e.to_string()).into())
        })
        .collect()
}

/// Check the declared audit policy against the live schema.
///
/// A table declared audit-capable must have both columns of each declared
/// pair. A table that has a complete pair it does not declare is only
/// reported: its rows will simply not be stamped.
pub async fn verify_audit_columns(conn: &mut SqliteConnection) -> Result<(), Error> {
    for table in Table::ALL {
        let columns = table_columns(conn, table).await?;
        let has = |name: &str| columns.iter().any(|c| c.eq_ignore_ascii_case(name));
        let declared = table.audit_columns();

        let created = has(mutation::CREATED_BY) && has(mutation::CREATED_AT);
        let updated = has(mutation::UPDATED_BY) && has(mutation::UPDATED_AT);

        if declared.created && !created {
            return Err(StorageError::Schema(format!(
                "table {table} is declared with created_by/created_at but lacks them"
            ))
            .into());
        }
        if declared.updated && !updated {
            return Err(StorageError::Schema(format!(
                "table {table} is declared with updated_by/updated_at but lacks them"
            ))
            .into());
        }
        if (created && !declared.created) || (updated && !declared.updated) {
            tracing::warn!(
                table = %table,
                "Table has audit columns that are not declared audit-capable"
            );
        }
    }

    Ok(())
}
