//! Blog repository
//!
//! Database operations for blog posts. Tags, category and featured image are
//! separate lookups; this repository only stores their ids.

use crate::config::DatabaseDriver;
use crate::db::{like_pattern, on_backend, DynDatabasePool, LastInsertId};
use crate::models::{Blog, BlogFilter, CreateBlogInput, ListParams, UpdateBlogInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const BLOG_COLUMNS: &str = "b.id, b.title, b.slug, b.excerpt, b.content, b.status, b.published_at, \
     b.read_time, b.views, b.author_id, b.category_id, b.featured_image_id, b.created_at, b.updated_at";

/// Blog repository trait
#[async_trait]
pub trait BlogRepository: Send + Sync {
    /// Create a new blog
    async fn create(&self, input: &CreateBlogInput) -> Result<Blog>;

    /// Get blog by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Blog>>;

    /// Get blog by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Blog>>;

    /// Check if slug exists
    async fn slug_exists(&self, slug: &str) -> Result<bool>;

    /// Page of blogs, newest first, filtered by status and search text
    async fn list(&self, params: &ListParams, filter: &BlogFilter) -> Result<(Vec<Blog>, i64)>;

    /// Partial update
    async fn update(&self, id: i64, input: &UpdateBlogInput) -> Result<Option<Blog>>;

    /// Delete a blog
    async fn delete(&self, id: i64) -> Result<()>;

    /// Count total blogs
    async fn count(&self) -> Result<i64>;

    /// Total views across every blog
    async fn sum_views(&self) -> Result<i64>;

    /// Increment view count
    async fn increment_views(&self, id: i64) -> Result<()>;
}

/// SQLx-based blog repository implementation
pub struct SqlxBlogRepository {
    pool: DynDatabasePool,
}

impl SqlxBlogRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn BlogRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct BlogRow {
    id: i64,
    title: String,
    slug: String,
    excerpt: String,
    content: String,
    status: String,
    published_at: Option<DateTime<Utc>>,
    read_time: i64,
    views: i64,
    author_id: Option<i64>,
    category_id: Option<i64>,
    featured_image_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BlogRow> for Blog {
    type Error = anyhow::Error;

    fn try_from(row: BlogRow) -> Result<Self> {
        Ok(Blog {
            id: row.id,
            title: row.title,
            slug: row.slug,
            excerpt: row.excerpt,
            content: row.content,
            status: row.status.parse()?,
            published_at: row.published_at,
            read_time: row.read_time,
            views: row.views,
            author_id: row.author_id,
            category_id: row.category_id,
            featured_image_id: row.featured_image_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl BlogRepository for SqlxBlogRepository {
    async fn create(&self, input: &CreateBlogInput) -> Result<Blog> {
        let now = Utc::now();
        let id = on_backend!(self.pool, |conn| {
            sqlx::query(
                r#"
                INSERT INTO blogs (title, slug, excerpt, content, status, published_at, read_time, views,
                                   author_id, category_id, featured_image_id, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&input.title)
            .bind(&input.slug)
            .bind(&input.excerpt)
            .bind(&input.content)
            .bind(input.status.to_string())
            .bind(input.published_at)
            .bind(input.read_time)
            .bind(input.author_id)
            .bind(input.category_id)
            .bind(input.featured_image_id)
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create blog")?
            .last_id()
        });

        Ok(Blog {
            id,
            title: input.title.clone(),
            slug: input.slug.clone(),
            excerpt: input.excerpt.clone(),
            content: input.content.clone(),
            status: input.status,
            published_at: input.published_at,
            read_time: input.read_time,
            views: 0,
            author_id: input.author_id,
            category_id: input.category_id,
            featured_image_id: input.featured_image_id,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Blog>> {
        let sql = format!("SELECT {} FROM blogs b WHERE b.id = ?", BLOG_COLUMNS);
        let row: Option<BlogRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get blog")?
        });
        row.map(Blog::try_from).transpose()
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Blog>> {
        let sql = format!("SELECT {} FROM blogs b WHERE b.slug = ?", BLOG_COLUMNS);
        let row: Option<BlogRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(&sql)
                .bind(slug)
                .fetch_optional(conn)
                .await
                .context("Failed to get blog by slug")?
        });
        row.map(Blog::try_from).transpose()
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let (count,): (i64,) = on_backend!(self.pool, |conn| {
            sqlx::query_as("SELECT COUNT(*) FROM blogs WHERE slug = ?")
                .bind(slug)
                .fetch_one(conn)
                .await
                .context("Failed to check blog slug")?
        });
        Ok(count > 0)
    }

    async fn list(&self, params: &ListParams, filter: &BlogFilter) -> Result<(Vec<Blog>, i64)> {
        let status = filter.status.map(|s| s.to_string());
        let pattern = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);
        let conditions = r#"
            (? IS NULL OR b.status = ?)
            AND (? IS NULL
                 OR b.title LIKE ? ESCAPE '!'
                 OR b.excerpt LIKE ? ESCAPE '!'
                 OR u.name LIKE ? ESCAPE '!'
                 OR u.username LIKE ? ESCAPE '!')
        "#;

        let count_sql = format!(
            "SELECT COUNT(*) FROM blogs b LEFT JOIN users u ON u.id = b.author_id WHERE {}",
            conditions
        );
        let (total,): (i64,) = on_backend!(self.pool, |conn| {
            sqlx::query_as(&count_sql)
                .bind(&status)
                .bind(&status)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .fetch_one(conn)
                .await
                .context("Failed to count blogs")?
        });

        let list_sql = format!(
            r#"
            SELECT {}
            FROM blogs b
            LEFT JOIN users u ON u.id = b.author_id
            WHERE {}
            ORDER BY b.created_at DESC, b.id DESC
            LIMIT ? OFFSET ?
            "#,
            BLOG_COLUMNS, conditions
        );
        let rows: Vec<BlogRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(&list_sql)
                .bind(&status)
                .bind(&status)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .bind(params.limit as i64)
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list blogs")?
        });

        let blogs = rows
            .into_iter()
            .map(Blog::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((blogs, total))
    }

    async fn update(&self, id: i64, input: &UpdateBlogInput) -> Result<Option<Blog>> {
        let status = input.status.map(|s| s.to_string());
        // Nullable columns take a (present, value) pair so they can be cleared.
        on_backend!(self.pool, |conn| {
            sqlx::query(
                r#"
                UPDATE blogs
                SET title = COALESCE(?, title),
                    excerpt = COALESCE(?, excerpt),
                    content = COALESCE(?, content),
                    read_time = COALESCE(?, read_time),
                    status = COALESCE(?, status),
                    published_at = CASE WHEN ? THEN ? ELSE published_at END,
                    category_id = CASE WHEN ? THEN ? ELSE category_id END,
                    featured_image_id = CASE WHEN ? THEN ? ELSE featured_image_id END,
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&input.title)
            .bind(&input.excerpt)
            .bind(&input.content)
            .bind(input.read_time)
            .bind(&status)
            .bind(input.published_at.is_some())
            .bind(input.published_at.flatten())
            .bind(input.category_id.is_some())
            .bind(input.category_id.flatten())
            .bind(input.featured_image_id.is_some())
            .bind(input.featured_image_id.flatten())
            .bind(Utc::now())
            .bind(id)
            .execute(conn)
            .await
            .context("Failed to update blog")?;
        });
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        on_backend!(self.pool, |conn| {
            sqlx::query("DELETE FROM blogs WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete blog")?;
        });
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = on_backend!(self.pool, |conn| {
            sqlx::query_as("SELECT COUNT(*) FROM blogs")
                .fetch_one(conn)
                .await
                .context("Failed to count blogs")?
        });
        Ok(count)
    }

    async fn sum_views(&self) -> Result<i64> {
        // MySQL's SUM yields DECIMAL
        let sql = match self.pool.driver() {
            DatabaseDriver::Sqlite => "SELECT COALESCE(SUM(views), 0) FROM blogs",
            DatabaseDriver::Mysql => "SELECT CAST(COALESCE(SUM(views), 0) AS SIGNED) FROM blogs",
        };
        let (total,): (i64,) = on_backend!(self.pool, |conn| {
            sqlx::query_as(sql)
                .fetch_one(conn)
                .await
                .context("Failed to sum blog views")?
        });
        Ok(total)
    }

    async fn increment_views(&self, id: i64) -> Result<()> {
        on_backend!(self.pool, |conn| {
            sqlx::query("UPDATE blogs SET views = views + 1 WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to increment blog views")?;
        });
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, is_unique_violation, migrations};
    use crate::models::{BlogStatus, User, UserRole};

    pub(crate) async fn setup() -> (DynDatabasePool, SqlxBlogRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let mut author = User::new("grace".into(), "grace@example.com".into(), "h".into(), UserRole::Moderator);
        author.name = Some("Grace Hopper".into());
        let author = SqlxUserRepository::new(pool.clone()).create(&author).await.unwrap();
        let repo = SqlxBlogRepository::new(pool.clone());
        (pool, repo, author.id)
    }

    pub(crate) fn input(title: &str, slug: &str, author_id: i64) -> CreateBlogInput {
        CreateBlogInput {
            title: title.to_string(),
            slug: slug.to_string(),
            excerpt: String::new(),
            content: "Body text".to_string(),
            status: BlogStatus::Draft,
            published_at: None,
            read_time: 1,
            author_id: Some(author_id),
            category_id: None,
            featured_image_id: None,
        }
    }

    #[tokio::test]
    async fn test_create_get_and_slug() {
        let (_pool, repo, author_id) = setup().await;
        let blog = repo.create(&input("Hello", "hello", author_id)).await.unwrap();

        let found = repo.get_by_id(blog.id).await.unwrap().unwrap();
        assert_eq!(found.title, "Hello");
        assert_eq!(found.status, BlogStatus::Draft);
        assert_eq!(repo.get_by_slug("hello").await.unwrap().unwrap().id, blog.id);
        assert!(repo.slug_exists("hello").await.unwrap());
        assert!(!repo.slug_exists("other").await.unwrap());

        let err = repo.create(&input("Again", "hello", author_id)).await.unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_list_filters_by_status_and_author_search() {
        let (_pool, repo, author_id) = setup().await;
        let mut published = input("Rust tips", "rust-tips", author_id);
        published.status = BlogStatus::Published;
        published.published_at = Some(Utc::now());
        repo.create(&published).await.unwrap();
        let mut anonymous = input("100% draft", "draft", author_id);
        anonymous.author_id = None;
        repo.create(&anonymous).await.unwrap();

        let (_, total) = repo.list(&ListParams::default(), &BlogFilter::default()).await.unwrap();
        assert_eq!(total, 2);

        let only_published = BlogFilter {
            status: Some(BlogStatus::Published),
            search: None,
        };
        let (blogs, total) = repo.list(&ListParams::default(), &only_published).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(blogs[0].slug, "rust-tips");

        let by_author = BlogFilter {
            status: None,
            search: Some("hopper".into()),
        };
        let (blogs, _) = repo.list(&ListParams::default(), &by_author).await.unwrap();
        assert_eq!(blogs.len(), 1);

        let literal_percent = BlogFilter {
            status: None,
            search: Some("100%".into()),
        };
        let (blogs, _) = repo.list(&ListParams::default(), &literal_percent).await.unwrap();
        assert_eq!(blogs.len(), 1);
        assert_eq!(blogs[0].slug, "draft");
    }

    #[tokio::test]
    async fn test_update_can_clear_nullable_columns() {
        let (pool, repo, author_id) = setup().await;
        pool.execute(
            "INSERT INTO categories (name, slug, created_at, updated_at) VALUES ('News', 'news', '2024-01-01 00:00:00', '2024-01-01 00:00:00')",
        )
        .await
        .unwrap();
        let mut with_category = input("Post", "post", author_id);
        with_category.category_id = Some(1);
        let blog = repo.create(&with_category).await.unwrap();

        let updated = repo
            .update(
                blog.id,
                &UpdateBlogInput {
                    title: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.category_id, Some(1));

        let updated = repo
            .update(
                blog.id,
                &UpdateBlogInput {
                    category_id: Some(None),
                    status: Some(BlogStatus::Published),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.category_id, None);
        assert_eq!(updated.status, BlogStatus::Published);
        assert_eq!(updated.slug, "post");
    }

    #[tokio::test]
    async fn test_counts_views_and_delete() {
        let (_pool, repo, author_id) = setup().await;
        assert_eq!(repo.sum_views().await.unwrap(), 0);

        let a = repo.create(&input("A", "a", author_id)).await.unwrap();
        let b = repo.create(&input("B", "b", author_id)).await.unwrap();
        repo.increment_views(a.id).await.unwrap();
        repo.increment_views(a.id).await.unwrap();
        repo.increment_views(b.id).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 2);
        assert_eq!(repo.sum_views().await.unwrap(), 3);

        repo.delete(a.id).await.unwrap();
        assert!(repo.get_by_id(a.id).await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
