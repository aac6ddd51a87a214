use async_trait::async_trait;

use crate::{Error, audit::AuditContext, category::Category, id::CategoryId};

#[async_trait]
pub trait CategoryRepository: Send {
    /// All categories ordered by name.
    async fn list_categories(&mut self) -> Result<Vec<Category>, Error>;

    async fn find_category(&mut self, id: CategoryId) -> Result<Option<Category>, Error>;

    /// Whether a category with this name or slug exists.
    async fn category_exists(&mut self, name: &str, slug: &str) -> Result<bool, Error>;

    async fn create_category(
        &mut self,
        name: &str,
        slug: &str,
        ctx: &AuditContext,
    ) -> Result<Category, Error>;
}
