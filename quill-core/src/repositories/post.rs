//! Repository trait for posts and their category links.

use async_trait::async_trait;

use crate::{
    Error,
    audit::AuditContext,
    id::{AccountId, CategoryId, PostId},
    post::{Page, Post, PostDraft, PostQuery, PublishedPost, StatusCounts},
};

/// Storage operations on `posts` and `post_categories`.
///
/// Owner-scoped methods take the owning account's id and behave as if a post
/// belonging to someone else does not exist.
#[async_trait]
pub trait PostRepository: Send {
    /// Insert a post owned by `owner`. Category links are not written.
    async fn insert_post(
        &mut self,
        owner: AccountId,
        draft: &PostDraft,
        ctx: &AuditContext,
    ) -> Result<Post, Error>;

    /// Update title, content, status and featured image of an owned post.
    ///
    /// Returns the number of rows changed (0 when the post is missing or foreign).
    async fn update_post(
        &mut self,
        owner: AccountId,
        id: PostId,
        draft: &PostDraft,
        ctx: &AuditContext,
    ) -> Result<u64, Error>;

    /// Delete an owned post row. Category links must be removed first.
    async fn delete_post(&mut self, owner: AccountId, id: PostId) -> Result<u64, Error>;

    async fn find_owned_post(
        &mut self,
        owner: AccountId,
        id: PostId,
    ) -> Result<Option<Post>, Error>;

    async fn post_category_ids(&mut self, id: PostId) -> Result<Vec<CategoryId>, Error>;

    /// Replace the category links of a post.
    async fn set_post_categories(
        &mut self,
        id: PostId,
        categories: &[CategoryId],
    ) -> Result<(), Error>;

    async fn delete_post_categories(&mut self, id: PostId) -> Result<u64, Error>;

    async fn list_owned_posts(
        &mut self,
        owner: AccountId,
        query: &PostQuery,
    ) -> Result<Page<Post>, Error>;

    async fn status_counts(&mut self, owner: AccountId) -> Result<StatusCounts, Error>;

    /// Published posts, newest first, with author and category names.
    async fn list_published(
        &mut self,
        page: u32,
        per_page: u32,
    ) -> Result<Page<PublishedPost>, Error>;

    async fn find_published(&mut self, id: PostId) -> Result<Option<PublishedPost>, Error>;

    async fn published_by_author(&mut self, owner: AccountId)
    -> Result<Vec<PublishedPost>, Error>;

    /// Bump `view_count` without touching the audit columns.
    async fn increment_view_count(&mut self, id: PostId) -> Result<(), Error>;

    /// Featured image paths of every post owned by `owner`.
    async fn featured_images_of(&mut self, owner: AccountId) -> Result<Vec<String>, Error>;

    /// Remove category links of every post owned by `owner`.
    async fn delete_category_links_of(&mut self, owner: AccountId) -> Result<u64, Error>;

    async fn delete_posts_of(&mut self, owner: AccountId) -> Result<u64, Error>;
}
