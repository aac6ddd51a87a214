use async_trait::async_trait;
use quill_core::{
    AuditContext, Category, CategoryId, Error, Mutation, Table, error::StorageError,
    repositories::CategoryRepository,
};

use super::optional_timestamp;
use crate::{Database, Params};

#[derive(Debug, sqlx::FromRow)]
struct SqliteCategory {
    id: i64,
    name: String,
    slug: String,
    created_at: Option<i64>,
    created_by: Option<String>,
}

impl From<SqliteCategory> for Category {
    fn from(row: SqliteCategory) -> Self {
        Category {
            id: CategoryId::new(row.id),
            name: row.name,
            slug: row.slug,
            created_at: optional_timestamp(row.created_at),
            created_by: row.created_by,
        }
    }
}

#[async_trait]
impl CategoryRepository for Database {
    async fn list_categories(&mut self) -> Result<Vec<Category>, Error> {
        let rows: Vec<SqliteCategory> = self
            .fetch_all(
                "SELECT id, name, slug, created_at, created_by FROM categories ORDER BY name",
                &Params::new(),
            )
            .await?;

        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn find_category(&mut self, id: CategoryId) -> Result<Option<Category>, Error> {
        let row: Option<SqliteCategory> = self
            .fetch_optional(
                "SELECT id, name, slug, created_at, created_by FROM categories WHERE id = :id",
                &Params::new().bind("id", id),
            )
            .await?;

        Ok(row.map(Category::from))
    }

    async fn category_exists(&mut self, name: &str, slug: &str) -> Result<bool, Error> {
        let (exists,): (i64,) = self
            .fetch_one(
                "SELECT EXISTS(SELECT 1 FROM categories WHERE name = :name OR slug = :slug)",
                &Params::new().bind("name", name).bind("slug", slug),
            )
            .await?;

        Ok(exists != 0)
    }

    async fn create_category(
        &mut self,
        name: &str,
        slug: &str,
        ctx: &AuditContext,
    ) -> Result<Category, Error> {
        let executed = self
            .execute(
                &Mutation::insert(Table::Categories)
                    .value("name", name)
                    .value("slug", slug),
                ctx,
            )
            .await?;

        self.find_category(CategoryId::new(executed.last_insert_id))
            .await?
            .ok_or_else(|| StorageError::NotFound.into())
    }
}
