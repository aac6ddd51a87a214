//! Post authoring and public reading.
//!
//! Every multi-statement write (a post row plus its category links) runs in
//! one transaction. Image files are never touched here: operations that make
//! an upload obsolete return its path for the caller to remove after commit.

use serde::Serialize;

use crate::{
    Error,
    audit::AuditContext,
    error::StorageError,
    id::{AccountId, CategoryId, PostId},
    post::{PUBLIC_PAGE_SIZE, Page, Post, PostDraft, PostQuery, PublishedPost, StatusCounts},
    repositories::{RepositoryProvider, finish_transaction},
};

/// An owned post together with its category links, as loaded into the editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnedPost {
    pub post: Post,
    pub category_ids: Vec<CategoryId>,
}

/// Result of saving an edited post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostSaved {
    pub post: Post,
    /// The previous featured image, when a new one replaced it.
    pub replaced_image: Option<String>,
}

/// The owner's dashboard: one page of posts plus per-status counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub posts: Page<Post>,
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostService;

impl PostService {
    pub fn new() -> Self {
        Self
    }

    pub async fn create_post<R>(
        &self,
        repo: &mut R,
        owner: AccountId,
        draft: &PostDraft,
        ctx: &AuditContext,
    ) -> Result<Post, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        repo.begin().await?;
        let result: Result<Post, Error> = async {
            let post = repo.insert_post(owner, draft, ctx).await?;
            repo.set_post_categories(post.id, &draft.category_ids)
                .await?;
            Ok(post)
        }
        .await;
        let post = finish_transaction(repo, result).await?;

        tracing::info!(post_id = %post.id, owner = %owner, status = %post.status, "Post created");
        Ok(post)
    }

    /// Save an edited post.
    ///
    /// A draft without a featured image keeps the current one.
    pub async fn update_post<R>(
        &self,
        repo: &mut R,
        owner: AccountId,
        id: PostId,
        draft: &PostDraft,
        ctx: &AuditContext,
    ) -> Result<PostSaved, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        let current = repo
            .find_owned_post(owner, id)
            .await?
            .ok_or(StorageError::NotFound)?;

        let mut draft = draft.clone();
        if draft.featured_image.is_none() {
            draft.featured_image = current.featured_image.clone();
        }

        repo.begin().await?;
        let result: Result<Post, Error> = async {
            if repo.update_post(owner, id, &draft, ctx).await? == 0 {
                return Err(StorageError::NotFound.into());
            }
            repo.set_post_categories(id, &draft.category_ids).await?;
            repo.find_owned_post(owner, id)
                .await?
                .ok_or_else(|| Error::from(StorageError::NotFound))
        }
        .await;
        let post = finish_transaction(repo, result).await?;

        let replaced_image = current
            .featured_image
            .filter(|old| post.featured_image.as_ref() != Some(old));

        tracing::info!(post_id = %id, owner = %owner, "Post updated");
        Ok(PostSaved {
            post,
            replaced_image,
        })
    }

    /// Delete an owned post and its category links.
    ///
    /// Returns the featured image path, if any, for removal after commit.
    pub async fn delete_post<R>(
        &self,
        repo: &mut R,
        owner: AccountId,
        id: PostId,
    ) -> Result<Option<String>, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        let post = repo
            .find_owned_post(owner, id)
            .await?
            .ok_or(StorageError::NotFound)?;

        repo.begin().await?;
        let result: Result<(), Error> = async {
            repo.delete_post_categories(id).await?;
            if repo.delete_post(owner, id).await? == 0 {
                return Err(StorageError::NotFound.into());
            }
            Ok(())
        }
        .await;
        finish_transaction(repo, result).await?;

        tracing::info!(post_id = %id, owner = %owner, "Post deleted");
        Ok(post.featured_image)
    }

    pub async fn get_owned_post<R>(
        &self,
        repo: &mut R,
        owner: AccountId,
        id: PostId,
    ) -> Result<OwnedPost, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        let post = repo
            .find_owned_post(owner, id)
            .await?
            .ok_or(StorageError::NotFound)?;
        let category_ids = repo.post_category_ids(id).await?;
        Ok(OwnedPost { post, category_ids })
    }

    pub async fn dashboard<R>(
        &self,
        repo: &mut R,
        owner: AccountId,
        query: &PostQuery,
    ) -> Result<Dashboard, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        let posts = repo.list_owned_posts(owner, query).await?;
        let counts = repo.status_counts(owner).await?;
        Ok(Dashboard { posts, counts })
    }

    /// Front page listing, newest first.
    pub async fn list_published<R>(
        &self,
        repo: &mut R,
        page: u32,
    ) -> Result<Page<PublishedPost>, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        repo.list_published(page.max(1), PUBLIC_PAGE_SIZE).await
    }

    /// Load a published post for reading and count the view.
    pub async fn read_published<R>(&self, repo: &mut R, id: PostId) -> Result<PublishedPost, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        let mut post = repo
            .find_published(id)
            .await?
            .ok_or(StorageError::NotFound)?;

        repo.increment_view_count(id).await?;
        post.post.view_count += 1;
        Ok(post)
    }
}
