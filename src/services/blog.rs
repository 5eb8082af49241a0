//! Blog service
//!
//! Authoring and publishing of blog posts:
//! - Slugs from titles, made unique with a millisecond suffix
//! - Read time estimated from the word count
//! - Tags connected by name, created on first use
//! - Author/admin ownership for edits and deletes
//!
//! Every write is recorded in the audit log.

use crate::db::is_unique_violation;
use crate::db::repositories::{
    BlogRepository, CategoryRepository, ImageRepository, TagRepository, UserRepository,
};
use crate::models::{
    Blog, BlogDetail, BlogFilter, BlogStatus, CreateBlogInput, ListParams, NewAuditLog,
    PagedResult, Tag, UpdateBlogInput, User,
};
use crate::services::audit::{actions, targets, AuditService};
use crate::services::slug::{check_title_length, slugify_or};
use anyhow::Context;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

/// Words per minute used for the read time estimate
const WORDS_PER_MINUTE: usize = 200;

/// Error types for blog service operations
#[derive(Debug, thiserror::Error)]
pub enum BlogServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    ValidationError(String),

    /// Not the author and not an admin
    #[error("Forbidden")]
    Forbidden,

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Fields accepted when creating a blog
#[derive(Debug, Clone, Default)]
pub struct NewBlog {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub status: Option<String>,
    pub tags: Vec<String>,
    pub category_id: Option<i64>,
    pub featured_image_id: Option<i64>,
}

/// Partial update; the outer `Option` of nullable fields means "present"
#[derive(Debug, Clone, Default)]
pub struct BlogPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub excerpt: Option<String>,
    pub status: Option<String>,
    pub category_id: Option<Option<i64>>,
    pub featured_image_id: Option<Option<i64>>,
    pub tags: Option<Vec<String>>,
}

pub struct BlogService {
    blogs: Arc<dyn BlogRepository>,
    tags: Arc<dyn TagRepository>,
    categories: Arc<dyn CategoryRepository>,
    images: Arc<dyn ImageRepository>,
    users: Arc<dyn UserRepository>,
    audit: Arc<AuditService>,
}

impl BlogService {
    pub fn new(
        blogs: Arc<dyn BlogRepository>,
        tags: Arc<dyn TagRepository>,
        categories: Arc<dyn CategoryRepository>,
        images: Arc<dyn ImageRepository>,
        users: Arc<dyn UserRepository>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            blogs,
            tags,
            categories,
            images,
            users,
            audit,
        }
    }

    /// Create a blog authored by `author`
    pub async fn create(&self, author: &User, input: NewBlog) -> Result<BlogDetail, BlogServiceError> {
        let title = input.title.map(|t| t.trim().to_string()).unwrap_or_default();
        let content = input.content.unwrap_or_default();
        if title.is_empty() || content.trim().is_empty() {
            return Err(BlogServiceError::ValidationError(
                "Title and content are required".to_string(),
            ));
        }
        if let Some(message) = check_title_length(&title) {
            return Err(BlogServiceError::ValidationError(message));
        }

        let status = parse_status(input.status.as_deref())?;
        if let Some(category_id) = input.category_id {
            self.ensure_category(category_id).await?;
        }
        if let Some(image_id) = input.featured_image_id {
            self.ensure_image(image_id).await?;
        }

        let slug = self.unique_slug(&title).await?;
        let create = CreateBlogInput {
            read_time: estimate_read_time(&content),
            title,
            slug,
            excerpt: input.excerpt.unwrap_or_default(),
            content,
            status,
            published_at: (status == BlogStatus::Published).then(Utc::now),
            author_id: Some(author.id),
            category_id: input.category_id,
            featured_image_id: input.featured_image_id,
        };

        let blog = match self.blogs.create(&create).await {
            Ok(blog) => blog,
            Err(e) if is_unique_violation(&e) => {
                return Err(BlogServiceError::Conflict(
                    "A blog with this slug already exists".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        let tag_ids = self.resolve_tags(&input.tags).await?;
        self.tags
            .set_blog_tags(blog.id, &tag_ids)
            .await
            .context("Failed to attach tags")?;
        if let Some(image_id) = blog.featured_image_id {
            self.images
                .attach_to_blog(image_id, blog.id)
                .await
                .context("Failed to attach featured image")?;
        }

        self.audit
            .record(
                NewAuditLog::new(actions::CREATE_BLOG, targets::BLOG, blog.id, author.id)
                    .with_details(format!("Created blog \"{}\"", blog.title)),
            )
            .await;
        tracing::info!("Blog created: {} (id {}) by {}", blog.slug, blog.id, author.username);

        self.detail(blog).await
    }

    /// Admin listing; `status` of `None` or `"all"` means any status
    pub async fn list(
        &self,
        params: &ListParams,
        status: Option<&str>,
        search: Option<String>,
    ) -> Result<PagedResult<BlogDetail>, BlogServiceError> {
        let status = match status.map(str::trim) {
            None | Some("") => None,
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => Some(parse_status(Some(s))?),
        };
        self.list_filtered(params, BlogFilter { status, search }).await
    }

    /// Public listing of published blogs
    pub async fn list_published(
        &self,
        params: &ListParams,
        search: Option<String>,
    ) -> Result<PagedResult<BlogDetail>, BlogServiceError> {
        let filter = BlogFilter {
            status: Some(BlogStatus::Published),
            search,
        };
        self.list_filtered(params, filter).await
    }

    pub async fn get(&self, id: i64) -> Result<BlogDetail, BlogServiceError> {
        let blog = self.find(id).await?;
        self.detail(blog).await
    }

    /// A published blog by slug; counts as a view
    pub async fn view_published(&self, slug: &str) -> Result<BlogDetail, BlogServiceError> {
        let mut blog = self
            .blogs
            .get_by_slug(slug)
            .await
            .context("Failed to get blog by slug")?
            .filter(|b| b.status == BlogStatus::Published)
            .ok_or_else(|| BlogServiceError::NotFound("Blog not found".to_string()))?;

        self.blogs
            .increment_views(blog.id)
            .await
            .context("Failed to increment blog views")?;
        blog.views += 1;

        self.detail(blog).await
    }

    /// Update a blog; only its author or an admin may do so
    pub async fn update(&self, actor: &User, id: i64, patch: BlogPatch) -> Result<BlogDetail, BlogServiceError> {
        let blog = self.find(id).await?;
        if !actor.can_modify_blog(blog.author_id) {
            return Err(BlogServiceError::Forbidden);
        }

        let title = patch.title.map(|t| t.trim().to_string());
        if title.as_deref() == Some("") {
            return Err(BlogServiceError::ValidationError("Title cannot be empty".to_string()));
        }
        if let Some(message) = title.as_deref().and_then(check_title_length) {
            return Err(BlogServiceError::ValidationError(message));
        }
        if patch.content.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(BlogServiceError::ValidationError("Content cannot be empty".to_string()));
        }

        let status = match patch.status.as_deref() {
            Some(s) => Some(parse_status(Some(s))?),
            None => None,
        };
        if let Some(Some(category_id)) = patch.category_id {
            self.ensure_category(category_id).await?;
        }
        if let Some(Some(image_id)) = patch.featured_image_id {
            self.ensure_image(image_id).await?;
        }

        let published_at = match status {
            Some(BlogStatus::Published) if blog.published_at.is_none() => Some(Some(Utc::now())),
            _ => None,
        };
        let update = UpdateBlogInput {
            title,
            excerpt: patch.excerpt,
            read_time: patch.content.as_deref().map(estimate_read_time),
            content: patch.content,
            status,
            published_at,
            category_id: patch.category_id,
            featured_image_id: patch.featured_image_id,
        };

        let updated = self
            .blogs
            .update(id, &update)
            .await
            .context("Failed to update blog")?
            .ok_or_else(|| BlogServiceError::NotFound("Blog not found".to_string()))?;

        if let Some(names) = patch.tags {
            let tag_ids = self.resolve_tags(&names).await?;
            self.tags
                .set_blog_tags(id, &tag_ids)
                .await
                .context("Failed to replace tags")?;
        }
        if let Some(Some(image_id)) = update.featured_image_id {
            self.images
                .attach_to_blog(image_id, id)
                .await
                .context("Failed to attach featured image")?;
        }

        self.audit
            .record(
                NewAuditLog::new(actions::UPDATE_BLOG, targets::BLOG, id, actor.id)
                    .with_details(format!("Updated blog \"{}\"", updated.title)),
            )
            .await;

        self.detail(updated).await
    }

    /// Delete a blog; only its author or an admin may do so
    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), BlogServiceError> {
        let blog = self.find(id).await?;
        if !actor.can_modify_blog(blog.author_id) {
            return Err(BlogServiceError::Forbidden);
        }

        self.blogs.delete(id).await.context("Failed to delete blog")?;
        self.audit
            .record(
                NewAuditLog::new(actions::DELETE_BLOG, targets::BLOG, id, actor.id)
                    .with_details(format!("Deleted blog \"{}\"", blog.title)),
            )
            .await;
        tracing::info!("Blog deleted: {} (id {}) by {}", blog.slug, id, actor.username);

        Ok(())
    }

    async fn list_filtered(
        &self,
        params: &ListParams,
        filter: BlogFilter,
    ) -> Result<PagedResult<BlogDetail>, BlogServiceError> {
        let (blogs, total) = self
            .blogs
            .list(params, &filter)
            .await
            .context("Failed to list blogs")?;

        let mut items = Vec::with_capacity(blogs.len());
        for blog in blogs {
            items.push(self.detail(blog).await?);
        }
        Ok(PagedResult::new(items, total, params))
    }

    async fn find(&self, id: i64) -> Result<Blog, BlogServiceError> {
        self.blogs
            .get_by_id(id)
            .await
            .context("Failed to get blog")?
            .ok_or_else(|| BlogServiceError::NotFound("Blog not found".to_string()))
    }

    /// Attach author, category, featured image and tags
    async fn detail(&self, blog: Blog) -> Result<BlogDetail, BlogServiceError> {
        let author = match blog.author_id {
            Some(id) => self
                .users
                .get_by_id(id)
                .await
                .context("Failed to load blog author")?
                .map(|u| u.summary()),
            None => None,
        };
        let category = match blog.category_id {
            Some(id) => self
                .categories
                .get_by_id(id)
                .await
                .context("Failed to load blog category")?,
            None => None,
        };
        let featured_image = match blog.featured_image_id {
            Some(id) => self
                .images
                .get_by_id(id)
                .await
                .context("Failed to load featured image")?,
            None => None,
        };
        let tags = self
            .tags
            .list_for_blog(blog.id)
            .await
            .context("Failed to load blog tags")?;

        Ok(BlogDetail {
            blog,
            author,
            category,
            featured_image,
            tags,
        })
    }

    async fn ensure_category(&self, id: i64) -> Result<(), BlogServiceError> {
        self.categories
            .get_by_id(id)
            .await
            .context("Failed to get category")?
            .map(|_| ())
            .ok_or_else(|| BlogServiceError::NotFound("Category not found".to_string()))
    }

    async fn ensure_image(&self, id: i64) -> Result<(), BlogServiceError> {
        self.images
            .get_by_id(id)
            .await
            .context("Failed to get image")?
            .map(|_| ())
            .ok_or_else(|| BlogServiceError::NotFound("Featured image not found".to_string()))
    }

    async fn unique_slug(&self, title: &str) -> Result<String, BlogServiceError> {
        let slug = slugify_or(title, "blog");
        if self
            .blogs
            .slug_exists(&slug)
            .await
            .context("Failed to check blog slug")?
        {
            return Ok(format!("{}-{}", slug, Utc::now().timestamp_millis()));
        }
        Ok(slug)
    }

    /// Tag ids for the given names, creating missing tags
    async fn resolve_tags(&self, names: &[String]) -> Result<Vec<i64>, BlogServiceError> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            if !seen.insert(name.to_string()) {
                continue;
            }
            let tag = match self.tags.get_by_name(name).await.context("Failed to get tag")? {
                Some(tag) => tag,
                None => self.create_tag(name).await?,
            };
            ids.push(tag.id);
        }
        Ok(ids)
    }

    async fn create_tag(&self, name: &str) -> Result<Tag, BlogServiceError> {
        let slug = slugify_or(name, "tag");
        match self.tags.create(name, &slug).await {
            Ok(tag) => Ok(tag),
            // different name, same slug ("C#" and "C")
            Err(e) if is_unique_violation(&e) => {
                let slug = format!("{}-{}", slug, Utc::now().timestamp_millis());
                Ok(self.tags.create(name, &slug).await.context("Failed to create tag")?)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Missing status means DRAFT; anything else must name a known status
fn parse_status(status: Option<&str>) -> Result<BlogStatus, BlogServiceError> {
    match status.map(str::trim) {
        None | Some("") => Ok(BlogStatus::Draft),
        Some(s) => s
            .parse()
            .map_err(|_| BlogServiceError::ValidationError(format!("Invalid status: {}", s))),
    }
}

/// Minutes to read at 200 words per minute, rounded up, at least 1
pub fn estimate_read_time(content: &str) -> i64 {
    let words = content.split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE).max(1) as i64
}
