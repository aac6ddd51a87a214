use async_trait::async_trait;
use chrono::Utc;
use quill_core::{
    AccountId, AuditContext, CategoryId, Error, Mutation, PostId, Table,
    error::StorageError,
    post::{Page, Post, PostDraft, PostQuery, PostSort, PublishedPost, StatusCounts},
    repositories::PostRepository,
};
use super::{bookkeeping, like_pattern, optional_timestamp};
use crate::{Database, Params};

const POST_COLUMNS: &str = "p.id, p.user_id, p.title, p.content, p.status, p.featured_image, \
     p.view_count, p.created_at, p.created_by, p.updated_at, p.updated_by";

/// Separates category names in the aggregated column. Cannot appear in a name.
const CATEGORY_SEPARATOR: char = '\u{1f}';

macro_rules! select_published {
    ($where:literal) => {
        concat!(
            "SELECT p.id, p.user_id, p.title, p.content, p.status, p.featured_image, \
             p.view_count, p.created_at, p.created_by, p.updated_at, p.updated_by, \
             u.username AS author_username, u.display_name AS author_display_name, \
             u.profile_image AS author_image, \
             (SELECT GROUP_CONCAT(c.name, char(31)) FROM post_categories pc \
              JOIN categories c ON c.id = pc.category_id \
              WHERE pc.post_id = p.id) AS category_names \
             FROM posts p JOIN users u ON u.id = p.user_id \
             WHERE p.status = 'published' ",
            $where
        )
    };
}

#[derive(Debug, sqlx::FromRow)]
struct SqlitePost {
    id: i64,
    user_id: i64,
    title: String,
    content: String,
    status: String,
    featured_image: Option<String>,
    view_count: i64,
    created_at: Option<i64>,
    created_by: Option<String>,
    updated_at: Option<i64>,
    updated_by: Option<String>,
}

impl TryFrom<SqlitePost> for Post {
    type Error = Error;

    fn try_from(row: SqlitePost) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|_| {
            StorageError::Query(format!("post {} has unknown status '{}'", row.id, row.status))
        })?;

        Ok(Post {
            id: PostId::new(row.id),
            user_id: AccountId::new(row.user_id),
            title: row.title,
            content: row.content,
            status,
            featured_image: row.featured_image,
            view_count: row.view_count,
            created_at: optional_timestamp(row.created_at),
            created_by: row.created_by,
            updated_at: optional_timestamp(row.updated_at),
            updated_by: row.updated_by,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqlitePublishedPost {
    #[sqlx(flatten)]
    post: SqlitePost,
    author_username: String,
    author_display_name: Option<String>,
    author_image: Option<String>,
    category_names: Option<String>,
}

impl TryFrom<SqlitePublishedPost> for PublishedPost {
    type Error = Error;

    fn try_from(row: SqlitePublishedPost) -> Result<Self, Self::Error> {
        let mut categories: Vec<String> = row
            .category_names
            .map(|names| names.split(CATEGORY_SEPARATOR).map(str::to_string).collect())
            .unwrap_or_default();
        categories.sort();

        Ok(PublishedPost {
            post: row.post.try_into()?,
            author_username: row.author_username,
            author_display_name: row.author_display_name,
            author_image: row.author_image,
            categories,
        })
    }
}

fn order_by(sort: PostSort) -> &'static str {
    match sort {
        PostSort::Newest => "p.created_at DESC, p.id DESC",
        PostSort::Oldest => "p.created_at ASC, p.id ASC",
        PostSort::Title => "p.title COLLATE NOCASE ASC, p.id ASC",
        PostSort::Views => "p.view_count DESC, p.id DESC",
    }
}

#[async_trait]
impl PostRepository for Database {
    async fn insert_post(
        &mut self,
        owner: AccountId,
        draft: &PostDraft,
        ctx: &AuditContext,
    ) -> Result<Post, Error> {
        let executed = self
            .execute(
                &Mutation::insert(Table::Posts)
                    .value("user_id", owner)
                    .value("title", &draft.title)
                    .value("content", &draft.content)
                    .value("status", draft.status.as_str())
                    .value("featured_image", draft.featured_image.clone()),
                ctx,
            )
            .await?;

        self.find_owned_post(owner, PostId::new(executed.last_insert_id))
            .await?
            .ok_or_else(|| StorageError::NotFound.into())
    }

    async fn update_post(
        &mut self,
        owner: AccountId,
        id: PostId,
        draft: &PostDraft,
        ctx: &AuditContext,
    ) -> Result<u64, Error> {
        let executed = self
            .execute(
                &Mutation::update(Table::Posts)
                    .set("title", &draft.title)
                    .set("content", &draft.content)
                    .set("status", draft.status.as_str())
                    .set("featured_image", draft.featured_image.clone())
                    .filter("id", id)
                    .filter("user_id", owner),
                ctx,
            )
            .await?;
        Ok(executed.rows_affected)
    }

    async fn delete_post(&mut self, owner: AccountId, id: PostId) -> Result<u64, Error> {
        let executed = self
            .execute(
                &Mutation::delete(Table::Posts)
                    .filter("id", id)
                    .filter("user_id", owner),
                &bookkeeping(Utc::now()),
            )
            .await?;
        Ok(executed.rows_affected)
    }

    async fn find_owned_post(
        &mut self,
        owner: AccountId,
        id: PostId,
    ) -> Result<Option<Post>, Error> {
        let row: Option<SqlitePost> = self
            .fetch_optional(
                r#"
                SELECT id, user_id, title, content, status, featured_image, view_count,
                       created_at, created_by, updated_at, updated_by
                FROM posts
                WHERE id = :id AND user_id = :owner
                "#,
                &Params::new().bind("id", id).bind("owner", owner),
            )
            .await?;

        row.map(Post::try_from).transpose()
    }

    async fn post_category_ids(&mut self, id: PostId) -> Result<Vec<CategoryId>, Error> {
        let ids: Vec<(i64,)> = self
            .fetch_all(
                "SELECT category_id FROM post_categories \
                 WHERE post_id = :post ORDER BY category_id",
                &Params::new().bind("post", id),
            )
            .await?;

        Ok(ids.into_iter().map(|(id,)| CategoryId::new(id)).collect())
    }

    async fn set_post_categories(
        &mut self,
        id: PostId,
        categories: &[CategoryId],
    ) -> Result<(), Error> {
        let ctx = bookkeeping(Utc::now());
        self.execute(
            &Mutation::delete(Table::PostCategories).filter("post_id", id),
            &ctx,
        )
        .await?;

        for category in categories {
            self.execute(
                &Mutation::insert(Table::PostCategories)
                    .value("post_id", id)
                    .value("category_id", *category),
                &ctx,
            )
            .await?;
        }
        Ok(())
    }

    async fn delete_post_categories(&mut self, id: PostId) -> Result<u64, Error> {
        let executed = self
            .execute(
                &Mutation::delete(Table::PostCategories).filter("post_id", id),
                &bookkeeping(Utc::now()),
            )
            .await?;
        Ok(executed.rows_affected)
    }

    async fn list_owned_posts(
        &mut self,
        owner: AccountId,
        query: &PostQuery,
    ) -> Result<Page<Post>, Error> {
        let filter = "FROM posts p \
             WHERE p.user_id = :owner \
             AND (:search IS NULL \
                  OR p.title LIKE :search ESCAPE '\\' \
                  OR p.content LIKE :search ESCAPE '\\') \
             AND (:status IS NULL OR p.status = :status)";

        let params = Params::new()
            .bind("owner", owner)
            .bind("search", query.search.as_deref().map(like_pattern))
            .bind("status", query.status.map(|s| s.as_str()))
            .bind("limit", query.per_page)
            .bind("offset", query.offset());

        let (total,): (i64,) = self
            .fetch_one(&format!("SELECT COUNT(*) {filter}"), &params)
            .await?;

        let rows: Vec<SqlitePost> = self
            .fetch_all(
                &format!(
                    "SELECT {POST_COLUMNS} {filter} ORDER BY {} LIMIT :limit OFFSET :offset",
                    order_by(query.sort)
                ),
                &params,
            )
            .await?;

        let items = rows
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or(0),
            page: query.page.max(1),
            per_page: query.per_page,
        })
    }

    async fn status_counts(&mut self, owner: AccountId) -> Result<StatusCounts, Error> {
        let rows: Vec<(String, i64)> = self
            .fetch_all(
                "SELECT status, COUNT(*) FROM posts WHERE user_id = :owner GROUP BY status",
                &Params::new().bind("owner", owner),
            )
            .await?;

        let mut counts = StatusCounts::default();
        for (status, count) in rows {
            let count = u64::try_from(count).unwrap_or(0);
            match status.as_str() {
                "draft" => counts.draft = count,
                "published" => counts.published = count,
                other => tracing::warn!(status = other, "Ignoring posts with unknown status"),
            }
        }
        Ok(counts)
    }

    async fn list_published(
        &mut self,
        page: u32,
        per_page: u32,
    ) -> Result<Page<PublishedPost>, Error> {
        let page = page.max(1);
        let offset = (page - 1).saturating_mul(per_page);

        let (total,): (i64,) = self
            .fetch_one(
                "SELECT COUNT(*) FROM posts WHERE status = 'published'",
                &Params::new(),
            )
            .await?;

        let rows: Vec<SqlitePublishedPost> = self
            .fetch_all(
                select_published!(
                    "ORDER BY p.created_at DESC, p.id DESC LIMIT :limit OFFSET :offset"
                ),
                &Params::new().bind("limit", per_page).bind("offset", offset),
            )
            .await?;

        Ok(Page {
            items: rows
                .into_iter()
                .map(PublishedPost::try_from)
                .collect::<Result<_, _>>()?,
            total: u64::try_from(total).unwrap_or(0),
            page,
            per_page,
        })
    }

    async fn find_published(&mut self, id: PostId) -> Result<Option<PublishedPost>, Error> {
        let row: Option<SqlitePublishedPost> = self
            .fetch_optional(
                select_published!("AND p.id = :id"),
                &Params::new().bind("id", id),
            )
            .await?;

        row.map(PublishedPost::try_from).transpose()
    }

    async fn published_by_author(
        &mut self,
        owner: AccountId,
    ) -> Result<Vec<PublishedPost>, Error> {
        let rows: Vec<SqlitePublishedPost> = self
            .fetch_all(
                select_published!("AND p.user_id = :owner ORDER BY p.created_at DESC, p.id DESC"),
                &Params::new().bind("owner", owner),
            )
            .await?;

        rows.into_iter().map(PublishedPost::try_from).collect()
    }

    async fn increment_view_count(&mut self, id: PostId) -> Result<(), Error> {
        self.execute(
            &Mutation::update(Table::Posts)
                .increment("view_count", 1)
                .filter("id", id)
                .without_audit(),
            &bookkeeping(Utc::now()),
        )
        .await?;
        Ok(())
    }

    async fn featured_images_of(&mut self, owner: AccountId) -> Result<Vec<String>, Error> {
        let rows: Vec<(String,)> = self
            .fetch_all(
                r#"
                SELECT featured_image FROM posts
                WHERE user_id = :owner AND featured_image IS NOT NULL AND featured_image != ''
                ORDER BY id
                "#,
                &Params::new().bind("owner", owner),
            )
            .await?;
        Ok(rows.into_iter().map(|(image,)| image).collect())
    }

    async fn delete_category_links_of(&mut self, owner: AccountId) -> Result<u64, Error> {
        let executed = self
            .execute_raw(
                "DELETE FROM post_categories \
                 WHERE post_id IN (SELECT id FROM posts WHERE user_id = :owner)",
                &Params::new().bind("owner", owner),
                &bookkeeping(Utc::now()),
            )
            .await?;
        Ok(executed.rows_affected)
    }

    async fn delete_posts_of(&mut self, owner: AccountId) -> Result<u64, Error> {
        let executed = self
            .execute(
                &Mutation::delete(Table::Posts).filter("user_id", owner),
                &bookkeeping(Utc::now()),
            )
            .await?;
        Ok(executed.rows_affected)
    }
}
