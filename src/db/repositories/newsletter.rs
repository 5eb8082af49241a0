//! Newsletter subscriber repository

use crate::db::{on_backend, DynDatabasePool, LastInsertId};
use crate::models::NewsletterSubscriber;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

#[async_trait]
pub trait NewsletterRepository: Send + Sync {
    /// Store an address; callers normalize it first
    async fn subscribe(&self, email: &str) -> Result<NewsletterSubscriber>;

    async fn exists(&self, email: &str) -> Result<bool>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxNewsletterRepository {
    pool: DynDatabasePool,
}

impl SqlxNewsletterRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn NewsletterRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl NewsletterRepository for SqlxNewsletterRepository {
    async fn subscribe(&self, email: &str) -> Result<NewsletterSubscriber> {
        let now = Utc::now();
        let id = on_backend!(self.pool, |conn| {
            sqlx::query("INSERT INTO newsletter_subscribers (email, created_at) VALUES (?, ?)")
                .bind(email)
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to add newsletter subscriber")?
                .last_id()
        });
        Ok(NewsletterSubscriber {
            id,
            email: email.to_string(),
            created_at: now,
        })
    }

    async fn exists(&self, email: &str) -> Result<bool> {
        let (count,): (i64,) = on_backend!(self.pool, |conn| {
            sqlx::query_as("SELECT COUNT(*) FROM newsletter_subscribers WHERE email = ?")
                .bind(email)
                .fetch_one(conn)
                .await
                .context("Failed to check newsletter subscriber")?
        });
        Ok(count > 0)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = on_backend!(self.pool, |conn| {
            sqlx::query_as("SELECT COUNT(*) FROM newsletter_subscribers")
                .fetch_one(conn)
                .await
                .context("Failed to count newsletter subscribers")?
        });
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, is_unique_violation, migrations};

    #[tokio::test]
    async fn test_subscribe_exists_and_count() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxNewsletterRepository::new(pool);

        assert_eq!(repo.count().await.unwrap(), 0);
        repo.subscribe("reader@example.com").await.unwrap();
        assert!(repo.exists("reader@example.com").await.unwrap());
        assert!(!repo.exists("other@example.com").await.unwrap());

        let err = repo.subscribe("reader@example.com").await.unwrap_err();
        assert!(is_unique_violation(&err));
        assert_eq!(repo.count().await.unwrap(), 1);
    }
}
