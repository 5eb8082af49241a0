//! Like repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::db::{on_backend, DynDatabasePool, LastInsertId};
use crate::models::{Like, LikeTarget, LikeWithUser, UserSummary};

/// Like repository trait
#[async_trait]
pub trait LikeRepository: Send + Sync {
    /// The user's like on a target, if any
    async fn find(&self, user_id: i64, target: LikeTarget) -> Result<Option<Like>>;

    async fn create(&self, user_id: i64, target: LikeTarget) -> Result<Like>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Likes on a thread with their users, newest first
    async fn list_for_thread(&self, thread_id: i64) -> Result<Vec<LikeWithUser>>;

    /// Likes on a comment with their users, newest first
    async fn list_for_comment(&self, comment_id: i64) -> Result<Vec<LikeWithUser>>;
}

pub struct SqlxLikeRepository {
    pool: DynDatabasePool,
}

impl SqlxLikeRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LikeRepository> {
        Arc::new(Self::new(pool))
    }

    async fn list_where(&self, column: &str, id: i64) -> Result<Vec<LikeWithUser>> {
        let sql = format!(
            r#"
            SELECT l.id, l.user_id, l.thread_id, l.comment_id, l.created_at,
                   u.username, u.name, u.avatar
            FROM likes l
            JOIN users u ON u.id = l.user_id
            WHERE l.{} = ?
            ORDER BY l.created_at DESC, l.id DESC
            "#,
            column
        );
        let rows: Vec<LikeUserRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(&sql)
                .bind(id)
                .fetch_all(conn)
                .await
                .context("Failed to list likes")?
        });

        Ok(rows
            .into_iter()
            .map(|row| LikeWithUser {
                user: UserSummary {
                    id: row.like.user_id,
                    username: row.username,
                    name: row.name,
                    avatar: row.avatar,
                },
                like: row.like.into(),
            })
            .collect())
    }
}

#[derive(sqlx::FromRow)]
struct LikeRow {
    id: i64,
    user_id: i64,
    thread_id: Option<i64>,
    comment_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl From<LikeRow> for Like {
    fn from(row: LikeRow) -> Self {
        Like {
            id: row.id,
            user_id: row.user_id,
            thread_id: row.thread_id,
            comment_id: row.comment_id,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct LikeUserRow {
    #[sqlx(flatten)]
    like: LikeRow,
    username: String,
    name: Option<String>,
    avatar: Option<String>,
}

#[async_trait]
impl LikeRepository for SqlxLikeRepository {
    async fn find(&self, user_id: i64, target: LikeTarget) -> Result<Option<Like>> {
        let (column, target_id) = match target {
            LikeTarget::Thread(id) => ("thread_id", id),
            LikeTarget::Comment(id) => ("comment_id", id),
        };
        let sql = format!(
            "SELECT id, user_id, thread_id, comment_id, created_at FROM likes WHERE user_id = ? AND {} = ?",
            column
        );
        let row: Option<LikeRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(&sql)
                .bind(user_id)
                .bind(target_id)
                .fetch_optional(conn)
                .await
                .context("Failed to find like")?
        });
        Ok(row.map(Like::from))
    }

    async fn create(&self, user_id: i64, target: LikeTarget) -> Result<Like> {
        let now = Utc::now();
        let id = on_backend!(self.pool, |conn| {
            sqlx::query("INSERT INTO likes (user_id, thread_id, comment_id, created_at) VALUES (?, ?, ?, ?)")
                .bind(user_id)
                .bind(target.thread_id())
                .bind(target.comment_id())
                .bind(now)
                .execute(conn)
                .await
                .context("Failed to create like")?
                .last_id()
        });

        Ok(Like {
            id,
            user_id,
            thread_id: target.thread_id(),
            comment_id: target.comment_id(),
            created_at: now,
        })
    }

    async fn delete(&self, id: i64) -> Result<()> {
        on_backend!(self.pool, |conn| {
            sqlx::query("DELETE FROM likes WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete like")?;
        });
        Ok(())
    }

    async fn list_for_thread(&self, thread_id: i64) -> Result<Vec<LikeWithUser>> {
        self.list_where("thread_id", thread_id).await
    }

    async fn list_for_comment(&self, comment_id: i64) -> Result<Vec<LikeWithUser>> {
        self.list_where("comment_id", comment_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::thread::tests::{input, setup};
    use crate::db::repositories::ThreadRepository;
    use crate::db::is_unique_violation;

    #[tokio::test]
    async fn test_like_lifecycle() {
        let (pool, threads, user) = setup().await;
        let thread = threads.create(&input("liked", user)).await.unwrap();
        let repo = SqlxLikeRepository::new(pool);
        let target = LikeTarget::Thread(thread.id);

        assert!(repo.find(user, target).await.unwrap().is_none());

        let like = repo.create(user, target).await.unwrap();
        assert_eq!(like.thread_id, Some(thread.id));
        assert!(like.comment_id.is_none());

        let found = repo.find(user, target).await.unwrap().unwrap();
        assert_eq!(found.id, like.id);

        let err = repo.create(user, target).await.unwrap_err();
        assert!(is_unique_violation(&err));

        let listed = repo.list_for_thread(thread.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].user.username, "erin");
        assert!(repo.list_for_comment(thread.id).await.unwrap().is_empty());

        repo.delete(like.id).await.unwrap();
        assert!(repo.find(user, target).await.unwrap().is_none());
    }
}
