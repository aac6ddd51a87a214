//! # Quill
//!
//! Quill is a small blogging platform. Authors sign up, write posts in
//! draft or published state, tag them with categories and attach images;
//! readers browse published posts.
//!
//! Every row written on behalf of a user carries who wrote it and when
//! (`created_by`/`created_at`, `updated_by`/`updated_at`), and repeated
//! failed logins lock an account for a while.
//!
//! This crate wires the pieces together:
//! - [`QuillConfig`] loads settings from YAML and `QUILL_` environment variables
//! - [`Quill`] owns the services and the upload store and opens one
//!   [`Database`] per request
//!
//! ## Example
//!
//! ```rust,no_run
//! use quill::{AuditContext, ClientInfo, Quill, QuillConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let quill = Quill::new(QuillConfig::load("quill.yaml")?);
//!     quill.init().await?;
//!
//!     let outcome = quill
//!         .login(
//!             "alice",
//!             "correct-horse",
//!             &ClientInfo::new("127.0.0.1", "curl/8.0"),
//!             &AuditContext::anonymous(),
//!         )
//!         .await?;
//!     println!("{}", outcome.message());
//!     Ok(())
//! }
//! ```
pub mod config;

use chrono::{DateTime, Utc};
use quill_core::services::{
    AccountService, CategoryService, LoginService, PasswordResetService, PostService, reset_link,
};

pub use config::{ConfigError, QuillConfig};

/// Re-export core types from quill_core
pub use quill_core::{
    Account, AccountId, AuditContext, Category, CategoryId, ClientInfo, Error, LockoutConfig,
    LockoutState, Post, PostDraft, PostId, PostStatus,
    error::{AuthError, StorageError, UploadError, ValidationError},
    post::{Page, PostQuery, PostSort, PublishedPost},
    services::{Dashboard, LoginOutcome, OwnedPost, ProfilePage},
    uploads::{IncomingFile, UploadKind, UploadStore},
    user::{ProfileUpdate, SignupRequest},
};

/// Re-export the storage backend
pub use quill_storage_sqlite::{Database, Params};

/// Errors returned by [`Quill`].
#[derive(Debug, thiserror::Error)]
pub enum QuillError {
    #[error(transparent)]
    Core(#[from] Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<UploadError> for QuillError {
    fn from(e: UploadError) -> Self {
        QuillError::Core(e.into())
    }
}

impl QuillError {
    /// The request cannot continue (the datastore is unreachable).
    pub fn is_fatal(&self) -> bool {
        matches!(self, QuillError::Core(e) if e.is_fatal())
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, QuillError::Core(e) if e.is_validation_error())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, QuillError::Core(e) if e.is_not_found())
    }
}

/// A reset link ready to be mailed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordResetMail {
    pub to: String,
    pub username: String,
    pub link: String,
    pub expires_at: DateTime<Utc>,
}

/// The application: configuration, services and uploaded files.
///
/// `Quill` holds no connection. Each operation opens a [`Database`], runs,
/// and closes it again, so one `Quill` can be shared across requests.
pub struct Quill {
    config: QuillConfig,
    uploads: UploadStore,
    login: LoginService,
    accounts: AccountService,
    posts: PostService,
    categories: CategoryService,
    password_reset: PasswordResetService,
}

impl Quill {
    pub fn new(config: QuillConfig) -> Self {
        Self {
            uploads: UploadStore::new(config.upload_dir.clone()),
            login: LoginService::new(config.lockout.into()),
            accounts: AccountService::new(),
            posts: PostService::new(),
            categories: CategoryService::new(),
            password_reset: PasswordResetService::new(config.password_reset.token_ttl()),
            config,
        }
    }

    pub fn config(&self) -> &QuillConfig {
        &self.config
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    /// Open a request-scoped handle on the datastore.
    pub async fn open(&self) -> Result<Database, QuillError> {
        Ok(Database::connect(&self.config.database_url).await?)
    }

    /// Create the schema and the upload directories.
    pub async fn init(&self) -> Result<(), QuillError> {
        let db = self.open().await?;
        finish(db, Ok(())).await?;
        self.uploads.ensure_directories().await?;
        tracing::info!(
            database_url = %self.config.database_url,
            upload_dir = %self.config.upload_dir.display(),
            "Initialized"
        );
        Ok(())
    }

    pub async fn signup(
        &self,
        request: &SignupRequest,
        ctx: &AuditContext,
    ) -> Result<Account, QuillError> {
        let mut db = self.open().await?;
        let result = self.accounts.signup(&mut db, request, ctx).await;
        finish(db, result).await
    }

    /// Attempt a login. Wrong passwords and locked accounts are outcomes, not errors.
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        client: &ClientInfo,
        ctx: &AuditContext,
    ) -> Result<LoginOutcome, QuillError> {
        let mut db = self.open().await?;
        let result = self
            .login
            .login(&mut db, identifier, password, client, ctx)
            .await;
        finish(db, result).await
    }

    /// Clear the failure counter of `username`. Returns whether it was locked.
    pub async fn unlock(&self, username: &str, ctx: &AuditContext) -> Result<bool, QuillError> {
        let mut db = self.open().await?;
        let result = async {
            let account = self.account_named(&mut db, username).await?;
            self.login.unlock(&mut db, account.id, ctx.timestamp()).await
        }
        .await;
        finish(db, result).await
    }

    pub async fn lockout_state(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<LockoutState, QuillError> {
        let mut db = self.open().await?;
        let result = async {
            let account = self.account_named(&mut db, username).await?;
            self.login.lockout_state(&mut db, account.id, now).await
        }
        .await;
        finish(db, result).await
    }

    async fn account_named(&self, db: &mut Database, username: &str) -> Result<Account, Error> {
        use quill_core::repositories::AccountRepository;

        db.find_account_by_username(username)
            .await?
            .ok_or_else(|| AuthError::UserNotFound.into())
    }

    /// Issue a reset token for `email`. `None` when no account uses it.
    pub async fn request_password_reset(
        &self,
        email: &str,
        ctx: &AuditContext,
    ) -> Result<Option<PasswordResetMail>, QuillError> {
        let mut db = self.open().await?;
        let result = self.password_reset.request_reset(&mut db, email, ctx).await;
        let issued = finish(db, result).await?;

        Ok(issued.map(|request| PasswordResetMail {
            to: request.account.email,
            username: request.account.username,
            link: reset_link(&self.config.site_url, &request.token),
            expires_at: request.expires_at,
        }))
    }

    pub async fn verify_reset_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, QuillError> {
        let mut db = self.open().await?;
        let result = self.password_reset.verify_token(&mut db, token, now).await;
        finish(db, result).await
    }

    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
        ctx: &AuditContext,
    ) -> Result<Account, QuillError> {
        let mut db = self.open().await?;
        let result = self
            .password_reset
            .reset_password(&mut db, token, new_password, confirm_password, ctx)
            .await;
        finish(db, result).await
    }

    pub async fn account(&self, id: AccountId) -> Result<Account, QuillError> {
        let mut db = self.open().await?;
        let result = self.accounts.get_account(&mut db, id).await;
        finish(db, result).await
    }

    pub async fn public_profile(&self, id: AccountId) -> Result<ProfilePage, QuillError> {
        let mut db = self.open().await?;
        let result = self.accounts.public_profile(&mut db, id).await;
        finish(db, result).await
    }

    /// Save a profile, optionally with a new profile image.
    ///
    /// Without a new image the current one is kept. The replaced image file is
    /// removed once the change is stored; a newly stored file is removed again
    /// if saving fails.
    pub async fn update_profile(
        &self,
        id: AccountId,
        update: &ProfileUpdate,
        image: Option<&IncomingFile>,
        ctx: &AuditContext,
    ) -> Result<Account, QuillError> {
        let mut db = self.open().await?;
        let stored = match self.store_image(UploadKind::Profile, image).await {
            Ok(stored) => stored,
            Err(e) => return finish(db, Err(e)).await,
        };

        let mut update = update.clone();
        if stored.is_some() {
            update.profile_image = stored.clone();
        }

        let result = self.accounts.update_profile(&mut db, id, &update, ctx).await;
        match &result {
            Ok(saved) => self.uploads.remove_all(saved.replaced_image.iter()).await,
            Err(_) => self.uploads.remove_all(stored).await,
        }
        finish(db, result).await.map(|saved| saved.account)
    }

    pub async fn change_password(
        &self,
        id: AccountId,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
        ctx: &AuditContext,
    ) -> Result<(), QuillError> {
        let mut db = self.open().await?;
        let result = self
            .accounts
            .change_password(
                &mut db,
                id,
                current_password,
                new_password,
                confirm_password,
                ctx,
            )
            .await;
        finish(db, result).await
    }

    /// Delete an account with all its posts and login records, then its files.
    pub async fn delete_account(
        &self,
        id: AccountId,
        password: &str,
        ctx: &AuditContext,
    ) -> Result<(), QuillError> {
        let mut db = self.open().await?;
        let result = self.accounts.delete_account(&mut db, id, password, ctx).await;
        let files = finish(db, result).await?;
        self.uploads.remove_all(files).await;
        Ok(())
    }

    pub async fn create_post(
        &self,
        owner: AccountId,
        draft: &PostDraft,
        image: Option<&IncomingFile>,
        ctx: &AuditContext,
    ) -> Result<Post, QuillError> {
        let mut db = self.open().await?;
        let stored = match self.store_image(UploadKind::Post, image).await {
            Ok(stored) => stored,
            Err(e) => return finish(db, Err(e)).await,
        };

        let mut draft = draft.clone();
        if stored.is_some() {
            draft.featured_image = stored.clone();
        }

        let result = self.posts.create_post(&mut db, owner, &draft, ctx).await;
        if result.is_err() {
            self.uploads.remove_all(stored).await;
        }
        finish(db, result).await
    }

    pub async fn update_post(
        &self,
        owner: AccountId,
        id: PostId,
        draft: &PostDraft,
        image: Option<&IncomingFile>,
        ctx: &AuditContext,
    ) -> Result<Post, QuillError> {
        let mut db = self.open().await?;
        let stored = match self.store_image(UploadKind::Post, image).await {
            Ok(stored) => stored,
            Err(e) => return finish(db, Err(e)).await,
        };

        let mut draft = draft.clone();
        if stored.is_some() {
            draft.featured_image = stored.clone();
        }

        let result = self.posts.update_post(&mut db, owner, id, &draft, ctx).await;
        match &result {
            Ok(saved) => self.uploads.remove_all(saved.replaced_image.iter()).await,
            Err(_) => self.uploads.remove_all(stored).await,
        }
        finish(db, result).await.map(|saved| saved.post)
    }

    pub async fn delete_post(&self, owner: AccountId, id: PostId) -> Result<(), QuillError> {
        let mut db = self.open().await?;
        let result = self.posts.delete_post(&mut db, owner, id).await;
        let image = finish(db, result).await?;
        self.uploads.remove_all(image).await;
        Ok(())
    }

    pub async fn owned_post(&self, owner: AccountId, id: PostId) -> Result<OwnedPost, QuillError> {
        let mut db = self.open().await?;
        let result = self.posts.get_owned_post(&mut db, owner, id).await;
        finish(db, result).await
    }

    pub async fn dashboard(
        &self,
        owner: AccountId,
        query: &PostQuery,
    ) -> Result<Dashboard, QuillError> {
        let mut db = self.open().await?;
        let result = self.posts.dashboard(&mut db, owner, query).await;
        finish(db, result).await
    }

    pub async fn list_published(&self, page: u32) -> Result<Page<PublishedPost>, QuillError> {
        let mut db = self.open().await?;
        let result = self.posts.list_published(&mut db, page).await;
        finish(db, result).await
    }

    /// Load a published post for reading, counting the view.
    pub async fn read_published(&self, id: PostId) -> Result<PublishedPost, QuillError> {
        let mut db = self.open().await?;
        let result = self.posts.read_published(&mut db, id).await;
        finish(db, result).await
    }

    pub async fn list_categories(&self) -> Result<Vec<Category>, QuillError> {
        let mut db = self.open().await?;
        let result = self.categories.list_categories(&mut db).await;
        finish(db, result).await
    }

    pub async fn create_category(
        &self,
        name: &str,
        ctx: &AuditContext,
    ) -> Result<Category, QuillError> {
        let mut db = self.open().await?;
        let result = self.categories.create_category(&mut db, name, ctx).await;
        finish(db, result).await
    }

    /// Store an image embedded in post content and return its public URL.
    pub async fn upload_content_image(&self, file: &IncomingFile) -> Result<String, QuillError> {
        let path = self.uploads.store(UploadKind::Content, file).await?;
        Ok(format!("{}/{path}", self.config.site_url.trim_end_matches('/')))
    }

    async fn store_image(
        &self,
        kind: UploadKind,
        image: Option<&IncomingFile>,
    ) -> Result<Option<String>, Error> {
        match image {
            Some(file) => Ok(Some(self.uploads.store(kind, file).await?)),
            None => Ok(None),
        }
    }
}

/// Close the request's handle and hand back the operation's result.
async fn finish<T>(mut db: Database, result: Result<T, Error>) -> Result<T, QuillError> {
    let closed = db.close().await;
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), closed) => {
            if let Err(close_err) = closed {
                tracing::warn!(error = %close_err, "Failed to close database after error");
            }
            Err(e.into())
        }
    }
}
