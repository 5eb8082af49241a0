//! Tag repository
//!
//! Tags are created on demand when a blog names them and linked through
//! `blog_tags`.

use crate::db::{on_backend, DynDatabasePool, LastInsertId};
use crate::models::Tag;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Get tag by exact name
    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// Create a new tag
    async fn create(&self, name: &str, slug: &str) -> Result<Tag>;

    /// Tags attached to a blog, sorted by name
    async fn list_for_blog(&self, blog_id: i64) -> Result<Vec<Tag>>;

    /// Replace the tag set of a blog
    async fn set_blog_tags(&self, blog_id: i64, tag_ids: &[i64]) -> Result<()>;
}

/// SQLx-based tag repository implementation
pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct TagRow {
    id: i64,
    name: String,
    slug: String,
    created_at: DateTime<Utc>,
}

impl From<TagRow> for Tag {
    fn from(row: TagRow) -> Self {
        Tag {
            id: row.id,
            name: row.name,
            slug: row.slug,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        let row: Option<TagRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as("SELECT id, name, slug, created_at FROM tags WHERE name = ?")
                .bind(name)
                .fetch_optional(conn)
                .await
                .context("Failed to get tag by name")?
        });
        Ok(row.map(Tag::from))
    }

    async fn create(&self, name: &str, slug: &str) -> Result<Tag> {
        let now = Utc::now();
        let id = on_backend!(self.pool, |conn| {
            sqlx::query("INSERT INTO tags (name, slug, created_at) VALUES (?, ?, ?)")
                .bind(name)
                .bind(slug)
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to create tag")?
                .last_id()
        });

        Ok(Tag {
            id,
            name: name.to_string(),
            slug: slug.to_string(),
            created_at: now,
        })
    }

    async fn list_for_blog(&self, blog_id: i64) -> Result<Vec<Tag>> {
        let rows: Vec<TagRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(
                r#"
                SELECT t.id, t.name, t.slug, t.created_at
                FROM tags t
                INNER JOIN blog_tags bt ON bt.tag_id = t.id
                WHERE bt.blog_id = ?
                ORDER BY t.name ASC
                "#,
            )
            .bind(blog_id)
            .fetch_all(conn)
            .await
            .context("Failed to list blog tags")?
        });
        Ok(rows.into_iter().map(Tag::from).collect())
    }

    async fn set_blog_tags(&self, blog_id: i64, tag_ids: &[i64]) -> Result<()> {
        on_backend!(self.pool, |conn| {
            let mut tx = conn.begin().await.context("Failed to begin transaction")?;
            sqlx::query("DELETE FROM blog_tags WHERE blog_id = ?")
                .bind(blog_id)
                .execute(&mut *tx)
                .await
                .context("Failed to clear blog tags")?;
            for tag_id in tag_ids {
                sqlx::query("INSERT INTO blog_tags (blog_id, tag_id) VALUES (?, ?)")
                    .bind(blog_id)
                    .bind(tag_id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to attach tag to blog")?;
            }
            tx.commit().await.context("Failed to commit blog tags")?;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (SqlxTagRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool.execute(
            "INSERT INTO blogs (title, slug, excerpt, content, created_at, updated_at) VALUES ('t', 't', '', 'c', '2024-01-01 00:00:00', '2024-01-01 00:00:00')",
        )
        .await
        .unwrap();
        (SqlxTagRepository::new(pool), 1)
    }

    #[tokio::test]
    async fn test_create_and_get_by_name() {
        let (repo, _) = setup_test_repo().await;
        let tag = repo.create("Async Rust", "async-rust").await.unwrap();
        let found = repo.get_by_name("Async Rust").await.unwrap().unwrap();
        assert_eq!(found.id, tag.id);
        assert_eq!(found.slug, "async-rust");
        assert!(repo.get_by_name("async rust!").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_blog_tags_replaces_previous_set() {
        let (repo, blog_id) = setup_test_repo().await;
        let a = repo.create("beta", "beta").await.unwrap();
        let b = repo.create("alpha", "alpha").await.unwrap();
        let c = repo.create("gamma", "gamma").await.unwrap();

        repo.set_blog_tags(blog_id, &[a.id, b.id]).await.unwrap();
        let names: Vec<_> = repo
            .list_for_blog(blog_id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);

        repo.set_blog_tags(blog_id, &[c.id]).await.unwrap();
        let tags = repo.list_for_blog(blog_id).await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "gamma");

        repo.set_blog_tags(blog_id, &[]).await.unwrap();
        assert!(repo.list_for_blog(blog_id).await.unwrap().is_empty());
    }
}
