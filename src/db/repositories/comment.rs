//! Comment repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{on_backend, DynDatabasePool, LastInsertId};
use crate::models::{Comment, CommentWithAuthor, CreateCommentInput, UserSummary};

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Create a new comment
    async fn create(&self, input: &CreateCommentInput) -> Result<Comment>;

    /// Get a comment by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// All comments of a thread with their authors, oldest first
    async fn list_by_thread(&self, thread_id: i64) -> Result<Vec<CommentWithAuthor>>;

    /// Replace the content of a comment
    async fn update(&self, id: i64, content: &str) -> Result<Option<Comment>>;

    /// Delete a comment and, through the foreign key, its replies
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    content: String,
    thread_id: i64,
    author_id: i64,
    parent_id: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: row.id,
            content: row.content,
            thread_id: row.thread_id,
            author_id: row.author_id,
            parent_id: row.parent_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CommentAuthorRow {
    #[sqlx(flatten)]
    comment: CommentRow,
    author_username: String,
    author_name: Option<String>,
    author_avatar: Option<String>,
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, input: &CreateCommentInput) -> Result<Comment> {
        let now = Utc::now();
        let id = on_backend!(self.pool, |conn| {
            sqlx::query(
                r#"
                INSERT INTO comments (content, thread_id, author_id, parent_id, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&input.content)
            .bind(input.thread_id)
            .bind(input.author_id)
            .bind(input.parent_id)
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create comment")?
            .last_id()
        });

        Ok(Comment {
            id,
            content: input.content.clone(),
            thread_id: input.thread_id,
            author_id: input.author_id,
            parent_id: input.parent_id,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let row: Option<CommentRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(
                r#"
                SELECT id, content, thread_id, author_id, parent_id, created_at, updated_at
                FROM comments
                WHERE id = ?
                "#,
            )
            .bind(id)
            .fetch_optional(conn)
            .await
            .context("Failed to get comment")?
        });
        Ok(row.map(Comment::from))
    }

    async fn list_by_thread(&self, thread_id: i64) -> Result<Vec<CommentWithAuthor>> {
        let rows: Vec<CommentAuthorRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(
                r#"
                SELECT c.id, c.content, c.thread_id, c.author_id, c.parent_id, c.created_at, c.updated_at,
                       u.username AS author_username, u.name AS author_name, u.avatar AS author_avatar
                FROM comments c
                JOIN users u ON u.id = c.author_id
                WHERE c.thread_id = ?
                ORDER BY c.created_at ASC, c.id ASC
                "#,
            )
            .bind(thread_id)
            .fetch_all(conn)
            .await
            .context("Failed to list thread comments")?
        });

        Ok(rows
            .into_iter()
            .map(|row| CommentWithAuthor {
                author: UserSummary {
                    id: row.comment.author_id,
                    username: row.author_username,
                    name: row.author_name,
                    avatar: row.author_avatar,
                },
                comment: row.comment.into(),
            })
            .collect())
    }

    async fn update(&self, id: i64, content: &str) -> Result<Option<Comment>> {
        on_backend!(self.pool, |conn| {
            sqlx::query("UPDATE comments SET content = ?, updated_at = ? WHERE id = ?")
                .bind(content)
                .bind(Utc::now())
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to update comment")?;
        });
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = on_backend!(self.pool, |conn| {
            sqlx::query("DELETE FROM comments WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete comment")?
                .rows_affected()
        });
        Ok(affected > 0)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = on_backend!(self.pool, |conn| {
            sqlx::query_as("SELECT COUNT(*) FROM comments")
                .fetch_one(conn)
                .await
                .context("Failed to count comments")?
        });
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::thread::tests::{input, setup};
    use crate::db::repositories::ThreadRepository;

    fn comment(thread_id: i64, author_id: i64, parent_id: Option<i64>, content: &str) -> CreateCommentInput {
        CreateCommentInput {
            content: content.to_string(),
            thread_id,
            author_id,
            parent_id,
        }
    }

    #[tokio::test]
    async fn test_create_list_update_delete() {
        let (pool, threads, author) = setup().await;
        let thread = threads.create(&input("t", author)).await.unwrap();
        let repo = SqlxCommentRepository::new(pool);

        let top = repo.create(&comment(thread.id, author, None, "first")).await.unwrap();
        let reply = repo
            .create(&comment(thread.id, author, Some(top.id), "reply"))
            .await
            .unwrap();
        assert_eq!(reply.parent_id, Some(top.id));

        let listed = repo.list_by_thread(thread.id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].comment.id, top.id);
        assert_eq!(listed[0].author.username, "erin");

        let updated = repo.update(top.id, "edited").await.unwrap().unwrap();
        assert_eq!(updated.content, "edited");

        assert_eq!(repo.count().await.unwrap(), 2);
        assert!(repo.delete(top.id).await.unwrap());
        // Replies go with their parent
        assert!(repo.get_by_id(reply.id).await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 0);
        assert!(!repo.delete(top.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_comments_removed_with_thread() {
        let (pool, threads, author) = setup().await;
        let thread = threads.create(&input("gone", author)).await.unwrap();
        let repo = SqlxCommentRepository::new(pool);
        let c = repo.create(&comment(thread.id, author, None, "x")).await.unwrap();

        threads.delete(thread.id).await.unwrap();
        assert!(repo.get_by_id(c.id).await.unwrap().is_none());
    }
}
