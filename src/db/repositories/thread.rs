//! Thread repository
//!
//! Database operations for forum threads.

use crate::db::{on_backend, DynDatabasePool, LastInsertId};
use crate::models::{
    CreateThreadInput, ListParams, Thread, ThreadStatus, ThreadSummary, UpdateThreadInput,
    UserSummary,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const THREAD_COLUMNS: &str = "t.id, t.title, t.slug, t.content, t.forum_id, t.author_id, t.views, \
     t.is_locked, t.status, t.created_at, t.updated_at";

/// Thread repository trait
#[async_trait]
pub trait ThreadRepository: Send + Sync {
    async fn create(&self, input: &CreateThreadInput) -> Result<Thread>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Thread>>;

    async fn slug_exists(&self, slug: &str) -> Result<bool>;

    /// Threads of a forum, newest first, with author and comment count
    async fn list_by_forum(&self, forum_id: i64, params: &ListParams) -> Result<(Vec<ThreadSummary>, i64)>;

    /// Partial update; `None` fields are left unchanged
    async fn update(&self, id: i64, input: &UpdateThreadInput) -> Result<Option<Thread>>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn increment_views(&self, id: i64) -> Result<()>;

    async fn count(&self) -> Result<i64>;

    /// Threads that are locked or closed
    async fn count_pending_moderation(&self) -> Result<i64>;
}

pub struct SqlxThreadRepository {
    pool: DynDatabasePool,
}

impl SqlxThreadRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ThreadRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct ThreadRow {
    id: i64,
    title: String,
    slug: String,
    content: String,
    forum_id: i64,
    author_id: i64,
    views: i64,
    is_locked: bool,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ThreadRow> for Thread {
    type Error = anyhow::Error;

    fn try_from(row: ThreadRow) -> Result<Self> {
        Ok(Thread {
            id: row.id,
            title: row.title,
            slug: row.slug,
            content: row.content,
            forum_id: row.forum_id,
            author_id: row.author_id,
            views: row.views,
            is_locked: row.is_locked,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ThreadSummaryRow {
    #[sqlx(flatten)]
    thread: ThreadRow,
    author_username: String,
    author_name: Option<String>,
    author_avatar: Option<String>,
    comment_count: i64,
}

#[async_trait]
impl ThreadRepository for SqlxThreadRepository {
    async fn create(&self, input: &CreateThreadInput) -> Result<Thread> {
        let now = Utc::now();
        let status = ThreadStatus::Open;

        let id = on_backend!(self.pool, |conn| {
            sqlx::query(
                r#"
                INSERT INTO threads (title, slug, content, forum_id, author_id, views, is_locked, status,
                                     created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
                "#,
            )
            .bind(&input.title)
            .bind(&input.slug)
            .bind(&input.content)
            .bind(input.forum_id)
            .bind(input.author_id)
            .bind(false)
            .bind(status.to_string())
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create thread")?
            .last_id()
        });

        Ok(Thread {
            id,
            title: input.title.clone(),
            slug: input.slug.clone(),
            content: input.content.clone(),
            forum_id: input.forum_id,
            author_id: input.author_id,
            views: 0,
            is_locked: false,
            status,
            created_at: now,
            updated_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Thread>> {
        let sql = format!("SELECT {} FROM threads t WHERE t.id = ?", THREAD_COLUMNS);
        let row: Option<ThreadRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get thread")?
        });
        row.map(Thread::try_from).transpose()
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool> {
        let (count,): (i64,) = on_backend!(self.pool, |conn| {
            sqlx::query_as("SELECT COUNT(*) FROM threads WHERE slug = ?")
                .bind(slug)
                .fetch_one(conn)
                .await
                .context("Failed to check thread slug")?
        });
        Ok(count > 0)
    }

    async fn list_by_forum(&self, forum_id: i64, params: &ListParams) -> Result<(Vec<ThreadSummary>, i64)> {
        let (total,): (i64,) = on_backend!(self.pool, |conn| {
            sqlx::query_as("SELECT COUNT(*) FROM threads WHERE forum_id = ?")
                .bind(forum_id)
                .fetch_one(conn)
                .await
                .context("Failed to count forum threads")?
        });

        let sql = format!(
            r#"
            SELECT {}, u.username AS author_username, u.name AS author_name, u.avatar AS author_avatar,
                   (SELECT COUNT(*) FROM comments c WHERE c.thread_id = t.id) AS comment_count
            FROM threads t
            JOIN users u ON u.id = t.author_id
            WHERE t.forum_id = ?
            ORDER BY t.created_at DESC, t.id DESC
            LIMIT ? OFFSET ?
            "#,
            THREAD_COLUMNS
        );
        let rows: Vec<ThreadSummaryRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(&sql)
                .bind(forum_id)
                .bind(params.limit as i64)
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list forum threads")?
        });

        let threads = rows
            .into_iter()
            .map(|row| {
                let thread = Thread::try_from(row.thread)?;
                Ok(ThreadSummary {
                    author: UserSummary {
                        id: thread.author_id,
                        username: row.author_username,
                        name: row.author_name,
                        avatar: row.author_avatar,
                    },
                    thread,
                    comment_count: row.comment_count,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((threads, total))
    }

    async fn update(&self, id: i64, input: &UpdateThreadInput) -> Result<Option<Thread>> {
        let status = input.status.map(|s| s.to_string());
        on_backend!(self.pool, |conn| {
            sqlx::query(
                r#"
                UPDATE threads
                SET title = COALESCE(?, title),
                    content = COALESCE(?, content),
                    is_locked = COALESCE(?, is_locked),
                    status = COALESCE(?, status),
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&input.title)
            .bind(&input.content)
            .bind(input.is_locked)
            .bind(&status)
            .bind(Utc::now())
            .bind(id)
            .execute(conn)
            .await
            .context("Failed to update thread")?;
        });
        self.get_by_id(id).await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        on_backend!(self.pool, |conn| {
            sqlx::query("DELETE FROM threads WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete thread")?;
        });
        Ok(())
    }

    async fn increment_views(&self, id: i64) -> Result<()> {
        on_backend!(self.pool, |conn| {
            sqlx::query("UPDATE threads SET views = views + 1 WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to increment thread views")?;
        });
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = on_backend!(self.pool, |conn| {
            sqlx::query_as("SELECT COUNT(*) FROM threads")
                .fetch_one(conn)
                .await
                .context("Failed to count threads")?
        });
        Ok(count)
    }

    async fn count_pending_moderation(&self) -> Result<i64> {
        let (count,): (i64,) = on_backend!(self.pool, |conn| {
            sqlx::query_as("SELECT COUNT(*) FROM threads WHERE is_locked = ? OR status = ?")
                .bind(true)
                .bind(ThreadStatus::Closed.to_string())
                .fetch_one(conn)
                .await
                .context("Failed to count threads pending moderation")?
        });
        Ok(count)
    }
}
