use crate::{
    Error,
    audit::AuditContext,
    category::{Category, slugify},
    error::ValidationError,
    repositories::RepositoryProvider,
    validation::validate_category_name,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryService;

impl CategoryService {
    pub fn new() -> Self {
        Self
    }

    pub async fn list_categories<R>(&self, repo: &mut R) -> Result<Vec<Category>, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        repo.list_categories().await
    }

    /// Create a category, deriving its slug from the name.
    pub async fn create_category<R>(
        &self,
        repo: &mut R,
        name: &str,
        ctx: &AuditContext,
    ) -> Result<Category, Error>
    where
        R: RepositoryProvider + ?Sized,
    {
        let name = name.trim();
        validate_category_name(name)?;

        let slug = slugify(name);
        if slug.is_empty() {
            return Err(ValidationError::InvalidField(format!(
                "Category name '{name}' has no usable characters"
            ))
            .into());
        }

        if repo.category_exists(name, &slug).await? {
            return Err(ValidationError::InvalidField(format!(
                "Category '{name}' already exists"
            ))
            .into());
        }

        let category = repo.create_category(name, &slug, ctx).await?;
        tracing::info!(category_id = %category.id, slug = %category.slug, "Category created");
        Ok(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::{MemoryStore, at};

    #[tokio::test]
    async fn test_create_category() {
        let mut store = MemoryStore::new();
        let ctx = AuditContext::new("alice", at(0));

        let category = CategoryService
            .create_category(&mut store, " Web Development ", &ctx)
            .await
            .unwrap();

        assert_eq!(category.name, "Web Development");
        assert_eq!(category.slug, "web-development");
        assert_eq!(category.created_by.as_deref(), Some("alice"));

        let err = CategoryService
            .create_category(&mut store, "web development", &ctx)
            .await
            .unwrap_err();
        assert!(err.is_validation_error());

        let err = CategoryService
            .create_category(&mut store, "!!!", &ctx)
            .await
            .unwrap_err();
        assert!(err.is_validation_error());
    }

    #[tokio::test]
    async fn test_list_is_sorted_by_name() {
        let mut store = MemoryStore::new();
        let ctx = AuditContext::new("alice", at(0));
        for name in ["Zig", "Ada", "Rust"] {
            CategoryService
                .create_category(&mut store, name, &ctx)
                .await
                .unwrap();
        }

        let names: Vec<_> = CategoryService
            .list_categories(&mut store)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Ada", "Rust", "Zig"]);
    }
}
