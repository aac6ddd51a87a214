//! Posts and listing queries
use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ValidationError, utilities::RequiredFieldExt},
    id::{AccountId, CategoryId, PostId},
    validation::validate_title,
};

/// Posts per page in the owner's dashboard.
pub const OWNER_PAGE_SIZE: u32 = 10;

/// Posts per page on the public front page (a 3x3 grid).
pub const PUBLIC_PAGE_SIZE: u32 = 9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PostStatus::Draft),
            "published" => Ok(PostStatus::Published),
            other => Err(ValidationError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub user_id: AccountId,
    pub title: String,
    pub content: String,
    pub status: PostStatus,
    pub featured_image: Option<String>,
    pub view_count: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<String>,
}

impl Post {
    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }
}

/// A published post as shown on public pages, joined with its author and
/// category names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedPost {
    pub post: Post,
    pub author_username: String,
    pub author_display_name: Option<String>,
    pub author_image: Option<String>,
    pub categories: Vec<String>,
}

impl PublishedPost {
    pub fn author_name(&self) -> &str {
        self.author_display_name
            .as_deref()
            .unwrap_or(&self.author_username)
    }
}

/// Validated input for creating or editing a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub status: PostStatus,
    pub featured_image: Option<String>,
    pub category_ids: Vec<CategoryId>,
}

impl PostDraft {
    pub fn builder() -> PostDraftBuilder {
        PostDraftBuilder::default()
    }
}

/// Builder for [`PostDraft`]
///
/// ```rust
/// use quill_core::post::{PostDraft, PostStatus};
///
/// let draft = PostDraft::builder()
///     .title("Hello")
///     .content("<p>First post</p>")
///     .status("published")
///     .build()
///     .unwrap();
///
/// assert_eq!(draft.status, PostStatus::Published);
/// ```
#[derive(Debug, Default)]
pub struct PostDraftBuilder {
    title: Option<String>,
    content: Option<String>,
    status: Option<String>,
    featured_image: Option<String>,
    category_ids: Vec<CategoryId>,
}

impl PostDraftBuilder {
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Status as submitted by the form, parsed on [`build`](Self::build).
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn featured_image(mut self, path: Option<String>) -> Self {
        self.featured_image = path;
        self
    }

    pub fn categories(mut self, ids: impl IntoIterator<Item = CategoryId>) -> Self {
        self.category_ids = ids.into_iter().collect();
        self
    }

    pub fn build(self) -> Result<PostDraft, ValidationError> {
        let title = self.title.require_field("Title")?.trim().to_string();
        validate_title(&title)?;

        let status = match self.status {
            Some(s) => s.parse()?,
            None => PostStatus::Draft,
        };

        let mut category_ids = self.category_ids;
        category_ids.sort();
        category_ids.dedup();

        Ok(PostDraft {
            title,
            content: self.content.unwrap_or_default(),
            status,
            featured_image: self.featured_image,
            category_ids,
        })
    }
}

/// Sort order for the owner's post list. Unknown values fall back to newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostSort {
    #[default]
    Newest,
    Oldest,
    Title,
    Views,
}

impl PostSort {
    pub fn parse_lenient(s: &str) -> Self {
        match s {
            "oldest" => PostSort::Oldest,
            "title" => PostSort::Title,
            "views" => PostSort::Views,
            _ => PostSort::Newest,
        }
    }
}

/// Filter, sort and paging for the owner's post list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    /// Substring matched against title and content.
    pub search: Option<String>,
    pub status: Option<PostStatus>,
    pub sort: PostSort,
    /// 1-based.
    pub page: u32,
    pub per_page: u32,
}

impl Default for PostQuery {
    fn default() -> Self {
        Self {
            search: None,
            status: None,
            sort: PostSort::default(),
            page: 1,
            per_page: OWNER_PAGE_SIZE,
        }
    }
}

impl PostQuery {
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        self.search = (!search.trim().is_empty()).then_some(search);
        self
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_sort(mut self, sort: PostSort) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    pub fn offset(&self) -> u32 {
        self.page.max(1).saturating_sub(1).saturating_mul(self.per_page)
    }
}

/// Post counts per status for one owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub draft: u64,
    pub published: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.draft + self.published
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    /// At least one page, even when empty.
    pub fn total_pages(&self) -> u64 {
        if self.per_page == 0 {
            return 1;
        }
        self.total.div_ceil(u64::from(self.per_page)).max(1)
    }

    pub fn has_next(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing() {
        assert_eq!("draft".parse::<PostStatus>().unwrap(), PostStatus::Draft);
        assert_eq!(
            "published".parse::<PostStatus>().unwrap(),
            PostStatus::Published
        );
        assert!(matches!(
            "archived".parse::<PostStatus>(),
            Err(ValidationError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_draft_builder_requires_title() {
        assert!(matches!(
            PostDraft::builder().content("body").build(),
            Err(ValidationError::MissingField(_))
        ));
        assert!(PostDraft::builder().title("   ").build().is_err());
    }

    #[test]
    fn test_draft_builder_defaults_and_dedup() {
        let draft = PostDraft::builder()
            .title("  Hello  ")
            .categories([CategoryId::new(3), CategoryId::new(1), CategoryId::new(3)])
            .build()
            .unwrap();

        assert_eq!(draft.title, "Hello");
        assert_eq!(draft.content, "");
        assert_eq!(draft.status, PostStatus::Draft);
        assert_eq!(draft.category_ids, vec![CategoryId::new(1), CategoryId::new(3)]);
    }

    #[test]
    fn test_sort_parsing_is_lenient() {
        assert_eq!(PostSort::parse_lenient("views"), PostSort::Views);
        assert_eq!(PostSort::parse_lenient("bogus"), PostSort::Newest);
    }

    #[test]
    fn test_query_offset() {
        let query = PostQuery::default();
        assert_eq!(query.offset(), 0);
        assert_eq!(query.clone().with_page(3).offset(), 20);
        assert_eq!(query.with_page(0).page, 1);
    }

    #[test]
    fn test_blank_search_is_ignored() {
        assert_eq!(PostQuery::default().with_search("  ").search, None);
        assert_eq!(
            PostQuery::default().with_search("rust").search.as_deref(),
            Some("rust")
        );
    }

    #[test]
    fn test_page_math() {
        let page: Page<()> = Page {
            items: vec![],
            total: 0,
            page: 1,
            per_page: 9,
        };
        assert_eq!(page.total_pages(), 1);
        assert!(!page.has_next());

        let page: Page<()> = Page {
            items: vec![],
            total: 19,
            page: 2,
            per_page: 9,
        };
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());
    }
}
