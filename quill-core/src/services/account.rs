//! Signup, profile and account lifecycle.

use serde::Serialize;

use crate::{
    Error,
    audit::AuditContext,
    crypto::{hash_password, verify_password},
    error::{AuthError, StorageError},
    id::AccountId,
    post::PublishedPost,
    repositories::{RepositoryProvider, finish_transaction},
    user::{Account, NewAccount, ProfileUpdate, PublicProfile, SignupRequest},
    validation::{
        validate_display_name, validate_email, validate_new_password, validate_username,
    },
};

/// A public profile page: the account and its published posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfilePage {
    pub profile: PublicProfile,
    pub posts: Vec<PublishedPost>,
}

/// Result of saving a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSaved {
    pub account: Account,
    /// The previous profile image, when a new one replaced it. The caller
    /// removes the file.
    pub replaced_image: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AccountService;

impl AccountService {
    pub fn new() -> Self {
        Self
    }

    /// Register a new account.
    ///
    /// Unlike login, signup does report a taken username or email: the form
    /// has to tell the user what to change.
    pub async fn signup<R>(
        &self,
        repo: &mut R,
        request: &SignupRequest,
        ctx: &AuditContext,
    ) -> Result<Account, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        let username = request.username.trim();
        let email = request.email.trim();
        let display_name = normalize(request.display_name.as_deref());

        validate_username(username)?;
        validate_email(email)?;
        validate_new_password(&request.password, &request.confirm_password)?;
        validate_display_name(display_name.as_deref())?;

        if repo
            .is_username_or_email_taken(username, email, None)
            .await?
        {
            return Err(AuthError::UserAlreadyExists.into());
        }

        let account = repo
            .create_account(
                &NewAccount {
                    username: username.to_string(),
                    email: email.to_string(),
                    password_hash: hash_password(&request.password),
                    display_name,
                },
                ctx,
            )
            .await?;

        tracing::info!(account_id = %account.id, username = %account.username, "Account created");
        Ok(account)
    }

    pub async fn get_account<R>(&self, repo: &mut R, id: AccountId) -> Result<Account, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        repo.find_account(id)
            .await?
            .ok_or_else(|| AuthError::UserNotFound.into())
    }

    pub async fn public_profile<R>(&self, repo: &mut R, id: AccountId) -> Result<ProfilePage, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        let account = self.get_account(repo, id).await?;
        let posts = repo.published_by_author(id).await?;
        Ok(ProfilePage {
            profile: account.into(),
            posts,
        })
    }

    pub async fn update_profile<R>(
        &self,
        repo: &mut R,
        id: AccountId,
        update: &ProfileUpdate,
        ctx: &AuditContext,
    ) -> Result<ProfileSaved, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        let username = update.username.trim().to_string();
        let email = update.email.trim().to_string();
        let display_name = normalize(update.display_name.as_deref());

        validate_username(&username)?;
        validate_email(&email)?;
        validate_display_name(display_name.as_deref())?;

        let current = self.get_account(repo, id).await?;

        // No new image keeps the current one
        let update = ProfileUpdate {
            username,
            email,
            display_name,
            bio: normalize(update.bio.as_deref()),
            profile_image: update
                .profile_image
                .clone()
                .or_else(|| current.profile_image.clone()),
        };

        if repo
            .is_username_or_email_taken(&update.username, &update.email, Some(id))
            .await?
        {
            return Err(AuthError::UserAlreadyExists.into());
        }

        repo.update_profile(id, &update, ctx).await?;

        let replaced_image = match (&current.profile_image, &update.profile_image) {
            (Some(old), new) if new.as_ref() != Some(old) => Some(old.clone()),
            _ => None,
        };

        let account = self.get_account(repo, id).await?;
        tracing::info!(account_id = %id, "Profile updated");
        Ok(ProfileSaved {
            account,
            replaced_image,
        })
    }

    pub async fn change_password<R>(
        &self,
        repo: &mut R,
        id: AccountId,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
        ctx: &AuditContext,
    ) -> Result<(), Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        self.verify_current_password(repo, id, current_password)
            .await?;
        validate_new_password(new_password, confirm_password)?;

        repo.set_password_hash(id, &hash_password(new_password), ctx)
            .await?;

        tracing::info!(account_id = %id, "Password changed");
        Ok(())
    }

    /// Delete an account and everything it owns.
    ///
    /// Category links, posts, login history and locks, then the account row are
    /// removed in one transaction. Returns the upload paths (profile image and
    /// featured images) that belonged to the account; the caller removes the
    /// files once this has returned.
    pub async fn delete_account<R>(
        &self,
        repo: &mut R,
        id: AccountId,
        password: &str,
        ctx: &AuditContext,
    ) -> Result<Vec<String>, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        self.verify_current_password(repo, id, password).await?;
        let account = self.get_account(repo, id).await?;

        repo.begin().await?;
        let result = Self::delete_account_rows(repo, id).await;
        let mut files = finish_transaction(repo, result).await?;

        files.extend(account.profile_image);
        tracing::info!(
            account_id = %id,
            actor = %ctx.actor(),
            files = files.len(),
            "Account deleted"
        );
        Ok(files)
    }

    async fn delete_account_rows<R>(repo: &mut R, id: AccountId) -> Result<Vec<String>, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        let images = repo.featured_images_of(id).await?;
        repo.delete_category_links_of(id).await?;
        let posts = repo.delete_posts_of(id).await?;
        repo.delete_login_records(id).await?;

        if repo.delete_account(id).await? == 0 {
            return Err(StorageError::NotFound.into());
        }

        tracing::debug!(account_id = %id, posts, "Account rows deleted");
        Ok(images)
    }

    async fn verify_current_password<R>(
        &self,
        repo: &mut R,
        id: AccountId,
        password: &str,
    ) -> Result<(), Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        let verified = repo
            .password_hash(id)
            .await?
            .is_some_and(|hash| verify_password(password, &hash));

        if verified {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials.into())
        }
    }
}

/// Trim optional free-text input; blank becomes `None`.
fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
