//! Category repository
//!
//! Database operations for blog categories.

use crate::db::{like_pattern, on_backend, DynDatabasePool, LastInsertId};
use crate::models::{Category, CategoryWithCount, CreateCategoryInput, ListParams, UpdateCategoryInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const CATEGORY_COLUMNS: &str = "c.id, c.name, c.slug, c.description, c.icon, c.created_at, c.updated_at";

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Create a new category
    async fn create(&self, input: &CreateCategoryInput) -> Result<Category>;

    /// Get category by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    /// Get category by slug
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// Get category by name
    async fn get_by_name(&self, name: &str) -> Result<Option<Category>>;

    /// Page of categories sorted by name, optionally searched by name/description
    async fn list(&self, params: &ListParams, search: Option<&str>) -> Result<(Vec<CategoryWithCount>, i64)>;

    /// Every category sorted by name
    async fn list_all(&self) -> Result<Vec<CategoryWithCount>>;

    /// Partial update; `None` fields are left unchanged
    async fn update(&self, id: i64, input: &UpdateCategoryInput) -> Result<Option<Category>>;

    /// Delete a category
    async fn delete(&self, id: i64) -> Result<()>;

    /// Number of blogs filed under the category
    async fn blog_count(&self, id: i64) -> Result<i64>;
}

/// SQLx-based category repository implementation
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_one_by(&self, column: &str, value: CategoryKey<'_>) -> Result<Option<Category>> {
        let sql = format!("SELECT {} FROM categories c WHERE c.{} = ?", CATEGORY_COLUMNS, column);
        let row: Option<CategoryRow> = match value {
            CategoryKey::Id(id) => on_backend!(self.pool, |conn| {
                sqlx::query_as(&sql)
                    .bind(id)
                    .fetch_optional(conn)
                    .await
                    .context("Failed to get category")?
            }),
            CategoryKey::Text(text) => on_backend!(self.pool, |conn| {
                sqlx::query_as(&sql)
                    .bind(text)
                    .fetch_optional(conn)
                    .await
                    .with_context(|| format!("Failed to get category by {}", column))?
            }),
        };
        Ok(row.map(Category::from))
    }
}

enum CategoryKey<'a> {
    Id(i64),
    Text(&'a str),
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    name: String,
    slug: String,
    description: Option<String>,
    icon: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            icon: row.icon,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CategoryCountRow {
    #[sqlx(flatten)]
    category: CategoryRow,
    blog_count: i64,
}

impl From<CategoryCountRow> for CategoryWithCount {
    fn from(row: CategoryCountRow) -> Self {
        CategoryWithCount {
            category: row.category.into(),
            blog_count: row.blog_count,
        }
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, input: &CreateCategoryInput) -> Result<Category> {
        let now = Utc::now();
        let id = on_backend!(self.pool, |conn| {
            sqlx::query(
                r#"
                INSERT INTO categories (name, slug, description, icon, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&input.name)
            .bind(&input.slug)
            .bind(&input.description)
            .bind(&input.icon)
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create category")?
            .last_id()
        });

        Ok(Category {
            id,
            name: input.name.clone(),
            slug: input.slug.clone(),
            description: input.description.clone(),
            icon: input.icon.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        self.fetch_one_by("id", CategoryKey::Id(id)).await
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        self.fetch_one_by("slug", CategoryKey::Text(slug)).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Category>> {
        self.fetch_one_by("name", CategoryKey::Text(name)).await
    }

    async fn list(&self, params: &ListParams, search: Option<&str>) -> Result<(Vec<CategoryWithCount>, i64)> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);
        let filter = "(? IS NULL OR c.name LIKE ? ESCAPE '!' OR c.description LIKE ? ESCAPE '!')";

        let count_sql = format!("SELECT COUNT(*) FROM categories c WHERE {}", filter);
        let (total,): (i64,) = on_backend!(self.pool, |conn| {
            sqlx::query_as(&count_sql)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .fetch_one(conn)
                .await
                .context("Failed to count categories")?
        });

        let list_sql = format!(
            r#"
            SELECT {}, (SELECT COUNT(*) FROM blogs b WHERE b.category_id = c.id) AS blog_count
            FROM categories c
            WHERE {}
            ORDER BY c.name ASC
            LIMIT ? OFFSET ?
            "#,
            CATEGORY_COLUMNS, filter
        );
        let rows: Vec<CategoryCountRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(&list_sql)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .bind(params.limit as i64)
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list categories")?
        });

        Ok((rows.into_iter().map(CategoryWithCount::from).collect(), total))
    }

    async fn list_all(&self) -> Result<Vec<CategoryWithCount>> {
        let sql = format!(
            r#"
            SELECT {}, (SELECT COUNT(*) FROM blogs b WHERE b.category_id = c.id) AS blog_count
            FROM categories c
            ORDER BY c.name ASC
            "#,
            CATEGORY_COLUMNS
        );
        let rows: Vec<CategoryCountRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(&sql)
                .fetch_all(conn)
                .await
                .context("Failed to list categories")?
        });
        Ok(rows.into_iter().map(CategoryWithCount::from).collect())
    }

    async fn update(&self, id: i64, input: &UpdateCategoryInput) -> Result<Option<Category>> {
        on_backend!(self.pool, |conn| {
            sqlx::query(
                r#"
                UPDATE categories
                SET name = COALESCE(?, name),
                    slug = COALESCE(?, slug),
                    description = COALESCE(?, description),
                    icon = COALESCE(?, icon),
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&input.name)
            .bind(&input.slug)
            .bind(&input.description)
            .bind(&input.icon)
            .bind(Utc::now())
            .bind(id)
            .execute(conn)
            .await
            .context("Failed to update category")?;
        });
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        on_backend!(self.pool, |conn| {
            sqlx::query("DELETE FROM categories WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete category")?;
        });
        Ok(())
    }

    async fn blog_count(&self, id: i64) -> Result<i64> {
        let (count,): (i64,) = on_backend!(self.pool, |conn| {
            sqlx::query_as("SELECT COUNT(*) FROM blogs WHERE category_id = ?")
                .bind(id)
                .fetch_one(conn)
                .await
                .context("Failed to count category blogs")?
        });
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, is_unique_violation, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxCategoryRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxCategoryRepository::new(pool.clone());
        (pool, repo)
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo
            .create(&CreateCategoryInput::new("Rust", "rust").with_description("Systems").with_icon("gear"))
            .await
            .unwrap();
        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.icon.as_deref(), Some("gear"));
        assert_eq!(repo.get_by_slug("rust").await.unwrap().unwrap().id, created.id);
        assert_eq!(repo.get_by_name("Rust").await.unwrap().unwrap().id, created.id);
        assert!(repo.get_by_slug("go").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_name_and_slug() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&CreateCategoryInput::new("Rust", "rust")).await.unwrap();

        let err = repo.create(&CreateCategoryInput::new("Rust", "rust-2")).await.unwrap_err();
        assert!(is_unique_violation(&err));
        let err = repo.create(&CreateCategoryInput::new("Rust 2", "rust")).await.unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_list_sorted_paged_and_searched() {
        let (_pool, repo) = setup_test_repo().await;
        for (name, desc) in [("Zig", "low level"), ("Go", "gophers"), ("Rust", "crabs and low level")] {
            repo.create(&CreateCategoryInput::new(name, name.to_lowercase()).with_description(desc))
                .await
                .unwrap();
        }

        let (items, total) = repo.list(&ListParams::new(1, 2), None).await.unwrap();
        assert_eq!(total, 3);
        let names: Vec<_> = items.iter().map(|c| c.category.name.as_str()).collect();
        assert_eq!(names, vec!["Go", "Rust"]);
        assert_eq!(items[0].blog_count, 0);

        let (items, total) = repo.list(&ListParams::default(), Some("low level")).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(items[0].category.name, "Rust");

        assert_eq!(repo.list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_delete_and_blog_count() {
        let (pool, repo) = setup_test_repo().await;
        let cat = repo.create(&CreateCategoryInput::new("Rust", "rust")).await.unwrap();

        let updated = repo
            .update(
                cat.id,
                &UpdateCategoryInput {
                    name: Some("Rust Lang".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Rust Lang");
        assert_eq!(updated.slug, "rust");

        pool.execute(&format!(
            "INSERT INTO blogs (title, slug, excerpt, content, category_id, created_at, updated_at) VALUES ('b', 'b', '', 'c', {}, '2024-01-01 00:00:00', '2024-01-01 00:00:00')",
            cat.id
        ))
        .await
        .unwrap();
        assert_eq!(repo.blog_count(cat.id).await.unwrap(), 1);

        repo.delete(cat.id).await.unwrap();
        assert!(repo.get_by_id(cat.id).await.unwrap().is_none());
    }
}
