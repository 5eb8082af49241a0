//! Forum repository
//!
//! Forums are seeded by migration and only read at runtime.

use crate::db::{on_backend, DynDatabasePool};
use crate::models::{Forum, ForumWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Forum repository trait
#[async_trait]
pub trait ForumRepository: Send + Sync {
    /// All forums in seed order with their thread counts
    async fn list_with_counts(&self) -> Result<Vec<ForumWithCount>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Forum>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Forum>>;
}

pub struct SqlxForumRepository {
    pool: DynDatabasePool,
}

impl SqlxForumRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ForumRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct ForumRow {
    id: i64,
    name: String,
    slug: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ForumRow> for Forum {
    fn from(row: ForumRow) -> Self {
        Forum {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ForumCountRow {
    #[sqlx(flatten)]
    forum: ForumRow,
    thread_count: i64,
}

#[async_trait]
impl ForumRepository for SqlxForumRepository {
    async fn list_with_counts(&self) -> Result<Vec<ForumWithCount>> {
        let rows: Vec<ForumCountRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(
                r#"
                SELECT f.id, f.name, f.slug, f.description, f.created_at,
                       (SELECT COUNT(*) FROM threads t WHERE t.forum_id = f.id) AS thread_count
                FROM forums f
                ORDER BY f.id
                "#,
            )
            .fetch_all(conn)
            .await
            .context("Failed to list forums")?
        });
        Ok(rows
            .into_iter()
            .map(|row| ForumWithCount {
                forum: row.forum.into(),
                thread_count: row.thread_count,
            })
            .collect())
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Forum>> {
        let row: Option<ForumRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as("SELECT id, name, slug, description, created_at FROM forums WHERE slug = ?")
                .bind(slug)
                .fetch_optional(conn)
                .await
                .context("Failed to get forum by slug")?
        });
        Ok(row.map(Forum::from))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Forum>> {
        let row: Option<ForumRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as("SELECT id, name, slug, description, created_at FROM forums WHERE id = ?")
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get forum by ID")?
        });
        Ok(row.map(Forum::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxForumRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        SqlxForumRepository::new(pool)
    }

    #[tokio::test]
    async fn test_seeded_forums_listed_with_counts() {
        let repo = setup_test_repo().await;
        let forums = repo.list_with_counts().await.unwrap();
        assert_eq!(forums.len(), 5);
        assert_eq!(forums[0].forum.slug, "general-discussion");
        assert!(forums.iter().all(|f| f.thread_count == 0));
    }

    #[tokio::test]
    async fn test_get_by_slug_and_id() {
        let repo = setup_test_repo().await;
        let forum = repo.get_by_slug("projects-ideas").await.unwrap().unwrap();
        assert_eq!(forum.name, "Projects & Ideas");

        let same = repo.get_by_id(forum.id).await.unwrap().unwrap();
        assert_eq!(same, forum);

        assert!(repo.get_by_slug("nope").await.unwrap().is_none());
    }
}
