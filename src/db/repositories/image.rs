//! Image repository

use crate::db::{on_backend, DynDatabasePool, LastInsertId};
use crate::models::Image;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Image repository trait
#[async_trait]
pub trait ImageRepository: Send + Sync {
    /// Record an uploaded image
    async fn create(&self, url: &str, uploaded_by: Option<i64>) -> Result<Image>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Image>>;

    /// Link an image to the blog that features it
    async fn attach_to_blog(&self, id: i64, blog_id: i64) -> Result<()>;
}

pub struct SqlxImageRepository {
    pool: DynDatabasePool,
}

impl SqlxImageRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ImageRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct ImageRow {
    id: i64,
    url: String,
    blog_id: Option<i64>,
    uploaded_by: Option<i64>,
    created_at: DateTime<Utc>,
}

impl From<ImageRow> for Image {
    fn from(row: ImageRow) -> Self {
        Image {
            id: row.id,
            url: row.url,
            blog_id: row.blog_id,
            uploaded_by: row.uploaded_by,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl ImageRepository for SqlxImageRepository {
    async fn create(&self, url: &str, uploaded_by: Option<i64>) -> Result<Image> {
        let now = Utc::now();
        let id = on_backend!(self.pool, |conn| {
            sqlx::query("INSERT INTO images (url, blog_id, uploaded_by, created_at) VALUES (?, NULL, ?, ?)")
                .bind(url)
                .bind(uploaded_by)
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to create image")?
                .last_id()
        });

        Ok(Image {
            id,
            url: url.to_string(),
            blog_id: None,
            uploaded_by,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Image>> {
        let row: Option<ImageRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as("SELECT id, url, blog_id, uploaded_by, created_at FROM images WHERE id = ?")
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get image")?
        });
        Ok(row.map(Image::from))
    }

    async fn attach_to_blog(&self, id: i64, blog_id: i64) -> Result<()> {
        on_backend!(self.pool, |conn| {
            sqlx::query("UPDATE images SET blog_id = ? WHERE id = ?")
                .bind(blog_id)
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to attach image to blog")?;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::blog::tests::{input, setup};
    use crate::db::repositories::BlogRepository;

    #[tokio::test]
    async fn test_create_and_attach() {
        let (pool, blogs, author_id) = setup().await;
        let repo = SqlxImageRepository::new(pool);

        let image = repo
            .create("/uploads/images/blogs/1-cat.png", Some(author_id))
            .await
            .unwrap();
        let found = repo.get_by_id(image.id).await.unwrap().unwrap();
        assert_eq!(found.url, "/uploads/images/blogs/1-cat.png");
        assert_eq!(found.blog_id, None);
        assert_eq!(found.uploaded_by, Some(author_id));

        let blog = blogs.create(&input("Cats", "cats", author_id)).await.unwrap();
        repo.attach_to_blog(image.id, blog.id).await.unwrap();
        assert_eq!(repo.get_by_id(image.id).await.unwrap().unwrap().blog_id, Some(blog.id));

        blogs.delete(blog.id).await.unwrap();
        assert_eq!(repo.get_by_id(image.id).await.unwrap().unwrap().blog_id, None);
        assert!(repo.get_by_id(image.id + 1).await.unwrap().is_none());
    }
}
