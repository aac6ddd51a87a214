use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quill_core::{
    AccountId, AuditContext, Error, Mutation, Table, Value,
    error::StorageError,
    repositories::AccountRepository,
    user::{Account, NewAccount, ProfileUpdate},
};

use super::{bookkeeping, optional_timestamp};
use crate::{Database, Params};

macro_rules! select_account {
    ($where:literal) => {
        concat!(
            "SELECT id, username, email, display_name, profile_image, bio, login_attempts, \
             last_attempt_time, last_login, reset_token_expires_at, \
             created_at, created_by, updated_at, updated_by FROM users ",
            $where
        )
    };
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteAccount {
    id: i64,
    username: String,
    email: String,
    display_name: Option<String>,
    profile_image: Option<String>,
    bio: Option<String>,
    login_attempts: i64,
    last_attempt_time: Option<i64>,
    last_login: Option<i64>,
    reset_token_expires_at: Option<i64>,
    created_at: Option<i64>,
    created_by: Option<String>,
    updated_at: Option<i64>,
    updated_by: Option<String>,
}

impl From<SqliteAccount> for Account {
    fn from(row: SqliteAccount) -> Self {
        Account {
            id: AccountId::new(row.id),
            username: row.username,
            email: row.email,
            display_name: row.display_name,
            profile_image: row.profile_image,
            bio: row.bio,
            login_attempts: u32::try_from(row.login_attempts.max(0)).unwrap_or(u32::MAX),
            last_attempt_time: optional_timestamp(row.last_attempt_time),
            last_login: optional_timestamp(row.last_login),
            reset_token_expires_at: optional_timestamp(row.reset_token_expires_at),
            created_at: optional_timestamp(row.created_at),
            created_by: row.created_by,
            updated_at: optional_timestamp(row.updated_at),
            updated_by: row.updated_by,
        }
    }
}

impl Database {
    async fn fetch_account(
        &mut self,
        sql: &'static str,
        params: &Params,
    ) -> Result<Option<Account>, Error> {
        let row: Option<SqliteAccount> = self.fetch_optional(sql, params).await?;
        Ok(row.map(Account::from))
    }

    /// Run a bookkeeping update on one account, failing if it does not exist.
    async fn update_account_unaudited(
        &mut self,
        mutation: Mutation,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        let executed = self
            .execute(&mutation.without_audit(), &bookkeeping(at))
            .await?;
        if executed.rows_affected == 0 {
            return Err(StorageError::NotFound.into());
        }
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for Database {
    async fn create_account(
        &mut self,
        account: &NewAccount,
        ctx: &AuditContext,
    ) -> Result<Account, Error> {
        let executed = self
            .execute(
                &Mutation::insert(Table::Users)
                    .value("username", &account.username)
                    .value("email", &account.email)
                    .value("password_hash", &account.password_hash)
                    .value("display_name", account.display_name.clone())
                    .value("login_attempts", 0),
                ctx,
            )
            .await?;

        self.find_account(AccountId::new(executed.last_insert_id))
            .await?
            .ok_or_else(|| StorageError::NotFound.into())
    }

    async fn find_account(&mut self, id: AccountId) -> Result<Option<Account>, Error> {
        self.fetch_account(select_account!("WHERE id = :id"), &Params::new().bind("id", id))
            .await
    }

    async fn find_account_by_username(
        &mut self,
        username: &str,
    ) -> Result<Option<Account>, Error> {
        self.fetch_account(
            select_account!("WHERE username = :username"),
            &Params::new().bind("username", username),
        )
        .await
    }

    async fn find_account_by_email(&mut self, email: &str) -> Result<Option<Account>, Error> {
        self.fetch_account(
            select_account!("WHERE email = :email"),
            &Params::new().bind("email", email),
        )
        .await
    }

    async fn find_account_by_login(
        &mut self,
        identifier: &str,
    ) -> Result<Option<Account>, Error> {
        self.fetch_account(
            select_account!("WHERE username = :login OR email = :login ORDER BY id LIMIT 1"),
            &Params::new().bind("login", identifier),
        )
        .await
    }

    async fn is_username_or_email_taken(
        &mut self,
        username: &str,
        email: &str,
        exclude: Option<AccountId>,
    ) -> Result<bool, Error> {
        let (taken,): (i64,) = self
            .fetch_one(
                r#"
                SELECT EXISTS(
                    SELECT 1 FROM users
                    WHERE (username = :username OR email = :email)
                      AND (:exclude IS NULL OR id != :exclude)
                )
                "#,
                &Params::new()
                    .bind("username", username)
                    .bind("email", email)
                    .bind("exclude", exclude),
            )
            .await?;

        Ok(taken != 0)
    }

    async fn password_hash(&mut self, id: AccountId) -> Result<Option<String>, Error> {
        let row: Option<(String,)> = self
            .fetch_optional(
                "SELECT password_hash FROM users WHERE id = :id",
                &Params::new().bind("id", id),
            )
            .await?;
        Ok(row.map(|(hash,)| hash))
    }

    async fn set_password_hash(
        &mut self,
        id: AccountId,
        hash: &str,
        ctx: &AuditContext,
    ) -> Result<(), Error> {
        let executed = self
            .execute(
                &Mutation::update(Table::Users)
                    .set("password_hash", hash)
                    .filter("id", id),
                ctx,
            )
            .await?;
        if executed.rows_affected == 0 {
            return Err(StorageError::NotFound.into());
        }
        Ok(())
    }

    async fn update_profile(
        &mut self,
        id: AccountId,
        profile: &ProfileUpdate,
        ctx: &AuditContext,
    ) -> Result<(), Error> {
        let executed = self
            .execute(
                &Mutation::update(Table::Users)
                    .set("username", &profile.username)
                    .set("email", &profile.email)
                    .set("display_name", profile.display_name.clone())
                    .set("bio", profile.bio.clone())
                    .set("profile_image", profile.profile_image.clone())
                    .filter("id", id),
                ctx,
            )
            .await?;
        if executed.rows_affected == 0 {
            return Err(StorageError::NotFound.into());
        }
        Ok(())
    }

    async fn record_failed_attempt(
        &mut self,
        id: AccountId,
        at: DateTime<Utc>,
    ) -> Result<u32, Error> {
        self.update_account_unaudited(
            Mutation::update(Table::Users)
                .increment("login_attempts", 1)
                .set("last_attempt_time", at)
                .filter("id", id),
            at,
        )
        .await?;

        let (attempts,): (i64,) = self
            .fetch_one(
                "SELECT login_attempts FROM users WHERE id = :id",
                &Params::new().bind("id", id),
            )
            .await?;

        Ok(u32::try_from(attempts.max(0)).unwrap_or(u32::MAX))
    }

    async fn reset_login_attempts(&mut self, id: AccountId) -> Result<(), Error> {
        self.update_account_unaudited(
            Mutation::update(Table::Users)
                .set("login_attempts", 0)
                .filter("id", id),
            Utc::now(),
        )
        .await
    }

    async fn record_successful_login(
        &mut self,
        id: AccountId,
        at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.update_account_unaudited(
            Mutation::update(Table::Users)
                .set("login_attempts", 0)
                .set("last_login", at)
                .filter("id", id),
            at,
        )
        .await
    }

    async fn set_reset_token(
        &mut self,
        id: AccountId,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.update_account_unaudited(
            Mutation::update(Table::Users)
                .set("reset_token", token_hash)
                .set("reset_token_expires_at", expires_at)
                .filter("id", id),
            Utc::now(),
        )
        .await
    }

    async fn find_account_by_reset_token(
        &mut self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Account>, Error> {
        self.fetch_account(
            select_account!("WHERE reset_token = :token AND reset_token_expires_at > :now"),
            &Params::new().bind("token", token_hash).bind("now", now),
        )
        .await
    }

    async fn clear_reset_token(&mut self, id: AccountId) -> Result<(), Error> {
        self.update_account_unaudited(
            Mutation::update(Table::Users)
                .set("reset_token", Value::Null)
                .set("reset_token_expires_at", Value::Null)
                .filter("id", id),
            Utc::now(),
        )
        .await
    }

    async fn delete_account(&mut self, id: AccountId) -> Result<u64, Error> {
        let executed = self
            .execute(
                &Mutation::delete(Table::Users).filter("id", id),
                &bookkeeping(Utc::now()),
            )
            .await?;
        Ok(executed.rows_affected)
    }
}
