//! Category service
//!
//! Category management for the admin panel:
//! - Paginated, searchable listing with blog counts
//! - Name and slug uniqueness
//! - Slug generation from the name
//! - Deletion refused while blogs still use the category
//!
//! Single categories are cached by id and invalidated on every write.

use crate::cache::{Cache, CacheLayer};
use crate::db::is_unique_violation;
use crate::db::repositories::CategoryRepository;
use crate::models::{
    Category, CategoryWithCount, CreateCategoryInput, ListParams, NewAuditLog, PagedResult,
    UpdateCategoryInput,
};
use crate::services::audit::{actions, targets, AuditService};
use crate::services::slug::generate_slug;
use anyhow::Context;
use std::sync::Arc;

const CACHE_KEY_CATEGORY_BY_ID: &str = "category:id:";

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("A category with this name already exists")]
    DuplicateName(String),

    #[error("A category with this slug already exists")]
    DuplicateSlug(String),

    #[error("Category not found")]
    NotFound(i64),

    /// Blogs still reference the category
    #[error(
        "Cannot delete category: {0} blog(s) are using this category. Please reassign or delete those blogs first."
    )]
    InUse(i64),

    #[error("{0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Fields accepted when creating a category
#[derive(Debug, Clone, Default)]
pub struct NewCategory {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
}

/// Category service for managing blog categories
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
    cache: Arc<Cache>,
    audit: Arc<AuditService>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>, cache: Arc<Cache>, audit: Arc<AuditService>) -> Self {
        Self { repo, cache, audit }
    }

    /// Page of categories sorted by name
    pub async fn list(
        &self,
        params: &ListParams,
        search: Option<&str>,
    ) -> Result<PagedResult<CategoryWithCount>, CategoryServiceError> {
        let (items, total) = self
            .repo
            .list(params, search)
            .await
            .context("Failed to list categories")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Every category, for the public sidebar
    pub async fn list_all(&self) -> Result<Vec<CategoryWithCount>, CategoryServiceError> {
        Ok(self.repo.list_all().await.context("Failed to list categories")?)
    }

    /// Get category by ID
    pub async fn get(&self, id: i64) -> Result<Category, CategoryServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_CATEGORY_BY_ID, id);
        if let Some(category) = self.cache.get::<Category>(&cache_key).await.ok().flatten() {
            return Ok(category);
        }

        let category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category by ID")?
            .ok_or(CategoryServiceError::NotFound(id))?;

        if let Err(e) = self.cache.set_default(&cache_key, &category).await {
            tracing::warn!("Failed to cache category {}: {:#}", id, e);
        }
        Ok(category)
    }

    /// Create a category
    ///
    /// # Errors
    /// - `ValidationError` if the name is missing or no slug can be derived
    /// - `DuplicateSlug` / `DuplicateName` on a clash
    pub async fn create(&self, actor_id: i64, input: NewCategory) -> Result<Category, CategoryServiceError> {
        let name = input
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CategoryServiceError::ValidationError("Category name is required".to_string()))?;

        let slug = input
            .slug
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| generate_slug(&name));
        if slug.is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Category slug cannot be empty".to_string(),
            ));
        }

        if self
            .repo
            .get_by_slug(&slug)
            .await
            .context("Failed to check slug uniqueness")?
            .is_some()
        {
            return Err(CategoryServiceError::DuplicateSlug(slug));
        }
        if self
            .repo
            .get_by_name(&name)
            .await
            .context("Failed to check name uniqueness")?
            .is_some()
        {
            return Err(CategoryServiceError::DuplicateName(name));
        }

        let create = CreateCategoryInput {
            name,
            slug,
            description: input.description,
            icon: input.icon,
        };
        let category = match self.repo.create(&create).await {
            Ok(category) => category,
            Err(e) if is_unique_violation(&e) => return Err(CategoryServiceError::DuplicateSlug(create.slug)),
            Err(e) => return Err(e.into()),
        };

        self.audit
            .record(
                NewAuditLog::new(actions::CREATE_CATEGORY, targets::CATEGORY, category.id, actor_id)
                    .with_details(format!("Created category \"{}\"", category.name)),
            )
            .await;
        tracing::info!("Category created: {} (id {})", category.name, category.id);

        Ok(category)
    }

    /// Update a category; uniqueness is only re-checked for changed values
    pub async fn update(
        &self,
        actor_id: i64,
        id: i64,
        input: UpdateCategoryInput,
    ) -> Result<Category, CategoryServiceError> {
        let existing = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or(CategoryServiceError::NotFound(id))?;

        let name = input.name.map(|n| n.trim().to_string());
        let slug = input.slug.map(|s| s.trim().to_string());
        if name.as_deref() == Some("") {
            return Err(CategoryServiceError::ValidationError(
                "Category name cannot be empty".to_string(),
            ));
        }
        if slug.as_deref() == Some("") {
            return Err(CategoryServiceError::ValidationError(
                "Category slug cannot be empty".to_string(),
            ));
        }

        if let Some(ref new_slug) = slug {
            if *new_slug != existing.slug
                && self
                    .repo
                    .get_by_slug(new_slug)
                    .await
                    .context("Failed to check slug uniqueness")?
                    .is_some()
            {
                return Err(CategoryServiceError::DuplicateSlug(new_slug.clone()));
            }
        }
        if let Some(ref new_name) = name {
            if *new_name != existing.name
                && self
                    .repo
                    .get_by_name(new_name)
                    .await
                    .context("Failed to check name uniqueness")?
                    .is_some()
            {
                return Err(CategoryServiceError::DuplicateName(new_name.clone()));
            }
        }

        let update = UpdateCategoryInput {
            name,
            slug,
            description: input.description,
            icon: input.icon,
        };
        let updated = match self.repo.update(id, &update).await {
            Ok(Some(category)) => category,
            Ok(None) => return Err(CategoryServiceError::NotFound(id)),
            Err(e) if is_unique_violation(&e) => {
                return Err(CategoryServiceError::DuplicateSlug(update.slug.unwrap_or(existing.slug)))
            }
            Err(e) => return Err(e.into()),
        };

        self.invalidate(id).await;
        self.audit
            .record(
                NewAuditLog::new(actions::UPDATE_CATEGORY, targets::CATEGORY, id, actor_id)
                    .with_details(format!("Updated category \"{}\"", updated.name)),
            )
            .await;

        Ok(updated)
    }

    /// Delete a category that no blog references
    pub async fn delete(&self, actor_id: i64, id: i64) -> Result<(), CategoryServiceError> {
        let category = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .ok_or(CategoryServiceError::NotFound(id))?;

        let blog_count = self
            .repo
            .blog_count(id)
            .await
            .context("Failed to count category blogs")?;
        if blog_count > 0 {
            return Err(CategoryServiceError::InUse(blog_count));
        }

        self.repo.delete(id).await.context("Failed to delete category")?;
        self.invalidate(id).await;
        self.audit
            .record(
                NewAuditLog::new(actions::DELETE_CATEGORY, targets::CATEGORY, id, actor_id)
                    .with_details(format!("Deleted category \"{}\"", category.name)),
            )
            .await;
        tracing::info!("Category deleted: {} (id {})", category.name, id);

        Ok(())
    }

    async fn invalidate(&self, id: i64) {
        let key = format!("{}{}", CACHE_KEY_CATEGORY_BY_ID, id);
        if let Err(e) = self.cache.delete(&key).await {
            tracing::warn!("Failed to invalidate category cache: {:#}", e);
        }
    }
}
