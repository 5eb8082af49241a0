//! Forum service
//!
//! Forums are seeded by migration and read-only at runtime. Threads live
//! inside them; a thread page carries its comments as a tree three levels
//! deep.

use crate::cache::{Cache, CacheLayer};
use crate::db::is_unique_violation;
use crate::db::repositories::{CommentRepository, ForumRepository, ThreadRepository, UserRepository};
use crate::models::{
    CommentNode, CommentWithAuthor, CreateThreadInput, Forum, ForumWithCount, ListParams,
    NewAuditLog, PagedResult, Thread, ThreadDetail, ThreadStatus, ThreadSummary, ThreadWithRefs,
    UpdateThreadInput, User, UserSummary,
};
use crate::services::audit::{actions, targets, AuditService};
use crate::services::authorization::{require_thread_ownership, AuthError};
use crate::services::slug::{check_title_length, slugify_or};
use anyhow::Context;
use std::collections::HashMap;
use std::sync::Arc;

const CACHE_KEY_FORUM_BY_SLUG: &str = "forum:slug:";

/// Depth of the comment tree on a thread page, top level included
const COMMENT_TREE_DEPTH: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum ForumServiceError {
    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    ValidationError(String),

    #[error("A thread with this slug already exists")]
    Conflict,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Moderator changes to a thread; `None` leaves a field alone
#[derive(Debug, Clone, Default)]
pub struct ThreadModeration {
    pub is_locked: Option<bool>,
    pub status: Option<String>,
}

pub struct ForumService {
    forums: Arc<dyn ForumRepository>,
    threads: Arc<dyn ThreadRepository>,
    comments: Arc<dyn CommentRepository>,
    users: Arc<dyn UserRepository>,
    cache: Arc<Cache>,
    audit: Arc<AuditService>,
}

impl ForumService {
    pub fn new(
        forums: Arc<dyn ForumRepository>,
        threads: Arc<dyn ThreadRepository>,
        comments: Arc<dyn CommentRepository>,
        users: Arc<dyn UserRepository>,
        cache: Arc<Cache>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            forums,
            threads,
            comments,
            users,
            cache,
            audit,
        }
    }

    pub async fn list_forums(&self) -> Result<Vec<ForumWithCount>, ForumServiceError> {
        Ok(self
            .forums
            .list_with_counts()
            .await
            .context("Failed to list forums")?)
    }

    /// Forum by slug, served from cache when possible
    pub async fn get_forum_by_slug(&self, slug: &str) -> Result<Forum, ForumServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_FORUM_BY_SLUG, slug);
        if let Some(forum) = self.cache.get::<Forum>(&cache_key).await.ok().flatten() {
            return Ok(forum);
        }

        let forum = self
            .forums
            .get_by_slug(slug)
            .await
            .context("Failed to get forum by slug")?
            .ok_or(ForumServiceError::NotFound("Forum not found"))?;

        if let Err(e) = self.cache.set_default(&cache_key, &forum).await {
            tracing::warn!("Failed to cache forum {}: {:#}", slug, e);
        }
        Ok(forum)
    }

    /// Newest threads first
    pub async fn list_threads(
        &self,
        forum_slug: &str,
        params: &ListParams,
    ) -> Result<PagedResult<ThreadSummary>, ForumServiceError> {
        let forum = self.get_forum_by_slug(forum_slug).await?;
        let (items, total) = self
            .threads
            .list_by_forum(forum.id, params)
            .await
            .context("Failed to list threads")?;
        Ok(PagedResult::new(items, total, params))
    }

    pub async fn create_thread(
        &self,
        author: &User,
        forum_slug: &str,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<ThreadWithRefs, ForumServiceError> {
        let forum = self.get_forum_by_slug(forum_slug).await?;

        let title = title.map(|t| t.trim().to_string()).unwrap_or_default();
        let content = content.unwrap_or_default();
        if title.is_empty() || content.trim().is_empty() {
            return Err(ForumServiceError::ValidationError(
                "Title and content are required".to_string(),
            ));
        }
        if let Some(message) = check_title_length(&title) {
            return Err(ForumServiceError::ValidationError(message));
        }

        let slug = self.unique_slug(&title).await?;
        let input = CreateThreadInput {
            title,
            slug,
            content,
            forum_id: forum.id,
            author_id: author.id,
        };
        let thread = match self.threads.create(&input).await {
            Ok(thread) => thread,
            Err(e) if is_unique_violation(&e) => return Err(ForumServiceError::Conflict),
            Err(e) => return Err(e.into()),
        };
        tracing::info!("Thread created: {} in {} by {}", thread.slug, forum.slug, author.username);

        Ok(ThreadWithRefs {
            thread,
            author: author.summary(),
            forum,
        })
    }

    /// Thread page; the view is counted after the page is loaded
    pub async fn get_thread_detail(&self, id: i64) -> Result<ThreadDetail, ForumServiceError> {
        let mut thread = self.find(id).await?;
        let author = self.author_of(&thread).await?;
        let forum = self
            .forums
            .get_by_id(thread.forum_id)
            .await
            .context("Failed to get thread forum")?
            .ok_or(ForumServiceError::NotFound("Forum not found"))?;
        let comments = self
            .comments
            .list_by_thread(id)
            .await
            .context("Failed to list thread comments")?;

        self.threads
            .increment_views(id)
            .await
            .context("Failed to increment thread views")?;
        thread.views += 1;

        Ok(ThreadDetail {
            thread,
            author,
            forum,
            comments: build_comment_tree(comments),
        })
    }

    /// Edit title and content; the author or a moderator may do so
    pub async fn update_thread(
        &self,
        actor: &User,
        id: i64,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<Thread, ForumServiceError> {
        let thread = self.find(id).await?;
        require_thread_ownership(actor, &thread)?;

        let title = title.map(|t| t.trim().to_string());
        if title.as_deref() == Some("") || content.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(ForumServiceError::ValidationError(
                "Title and content cannot be empty".to_string(),
            ));
        }
        if let Some(message) = title.as_deref().and_then(check_title_length) {
            return Err(ForumServiceError::ValidationError(message));
        }

        let input = UpdateThreadInput {
            title,
            content,
            ..Default::default()
        };
        self.threads
            .update(id, &input)
            .await
            .context("Failed to update thread")?
            .ok_or(ForumServiceError::NotFound("Thread not found"))
    }

    pub async fn delete_thread(&self, actor: &User, id: i64) -> Result<(), ForumServiceError> {
        let thread = self.find(id).await?;
        require_thread_ownership(actor, &thread)?;

        self.threads.delete(id).await.context("Failed to delete thread")?;
        tracing::info!("Thread deleted: {} (id {}) by {}", thread.slug, id, actor.username);
        Ok(())
    }

    /// Lock/unlock and open/close; each changed aspect gets its own audit entry
    pub async fn moderate_thread(
        &self,
        actor: &User,
        id: i64,
        moderation: ThreadModeration,
    ) -> Result<Thread, ForumServiceError> {
        self.find(id).await?;

        let status = match moderation.status.as_deref() {
            Some(s) => Some(s.parse::<ThreadStatus>().map_err(|_| {
                ForumServiceError::ValidationError(format!("Invalid status: {}", s))
            })?),
            None => None,
        };
        if moderation.is_locked.is_none() && status.is_none() {
            return Err(ForumServiceError::ValidationError(
                "Nothing to update: provide isLocked or status".to_string(),
            ));
        }

        let input = UpdateThreadInput {
            is_locked: moderation.is_locked,
            status,
            ..Default::default()
        };
        let thread = self
            .threads
            .update(id, &input)
            .await
            .context("Failed to moderate thread")?
            .ok_or(ForumServiceError::NotFound("Thread not found"))?;

        if let Some(locked) = moderation.is_locked {
            let action = if locked { actions::LOCK_THREAD } else { actions::UNLOCK_THREAD };
            self.audit
                .record(
                    NewAuditLog::new(action, targets::THREAD, id, actor.id)
                        .with_details(format!("Thread \"{}\"", thread.title)),
                )
                .await;
        }
        if let Some(status) = status {
            self.audit
                .record(
                    NewAuditLog::new(actions::UPDATE_THREAD_STATUS, targets::THREAD, id, actor.id)
                        .with_details(format!("Status set to {}", status)),
                )
                .await;
        }
        tracing::info!("Thread {} moderated by {}", id, actor.username);

        Ok(thread)
    }

    async fn find(&self, id: i64) -> Result<Thread, ForumServiceError> {
        self.threads
            .get_by_id(id)
            .await
            .context("Failed to get thread")?
            .ok_or(ForumServiceError::NotFound("Thread not found"))
    }

    async fn author_of(&self, thread: &Thread) -> Result<UserSummary, ForumServiceError> {
        let author = self
            .users
            .get_by_id(thread.author_id)
            .await
            .context("Failed to get thread author")?
            .with_context(|| format!("Author {} of thread {} is missing", thread.author_id, thread.id))?;
        Ok(author.summary())
    }

    /// `slug`, then `slug-1`, `slug-2`, ... until one is free
    async fn unique_slug(&self, title: &str) -> Result<String, ForumServiceError> {
        let base = slugify_or(title, "thread");
        let mut candidate = base.clone();
        let mut counter = 1;
        while self
            .threads
            .slug_exists(&candidate)
            .await
            .context("Failed to check thread slug")?
        {
            candidate = format!("{}-{}", base, counter);
            counter += 1;
        }
        Ok(candidate)
    }
}

/// Nest a thread's comments (oldest first) under their parents.
///
/// Top-level comments keep their order; replies deeper than the third level
/// are not shown.
pub fn build_comment_tree(comments: Vec<CommentWithAuthor>) -> Vec<CommentNode> {
    let mut children: HashMap<Option<i64>, Vec<CommentWithAuthor>> = HashMap::new();
    for comment in comments {
        children.entry(comment.comment.parent_id).or_default().push(comment);
    }
    attach_replies(None, &mut children, COMMENT_TREE_DEPTH)
}

fn attach_replies(
    parent: Option<i64>,
    children: &mut HashMap<Option<i64>, Vec<CommentWithAuthor>>,
    depth: usize,
) -> Vec<CommentNode> {
    if depth == 0 {
        return Vec::new();
    }
    let level = children.remove(&parent).unwrap_or_default();
    level
        .into_iter()
        .map(|c| {
            let replies = attach_replies(Some(c.comment.id), children, depth - 1);
            CommentNode {
                comment: c.comment,
                author: c.author,
                replies,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::db::repositories::{
        CommentRepository, SqlxAuditLogRepository, SqlxCommentRepository, SqlxForumRepository,
        SqlxThreadRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::models::{Comment, CreateCommentInput, UserRole};
    use crate::services::slug::MAX_TITLE_CHARS;
    use chrono::Utc;

    struct Fixture {
        pool: DynDatabasePool,
        service: ForumService,
        author: User,
        stranger: User,
        moderator: User,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::boxed(pool.clone());
        let mut created = Vec::new();
        for (name, role) in [
            ("author", UserRole::User),
            ("stranger", UserRole::User),
            ("moddy", UserRole::Moderator),
        ] {
            let user = User::new(name.into(), format!("{}@example.com", name), "h".into(), role);
            created.push(users.create(&user).await.unwrap());
        }
        let service = ForumService::new(
            SqlxForumRepository::boxed(pool.clone()),
            SqlxThreadRepository::boxed(pool.clone()),
            SqlxCommentRepository::boxed(pool.clone()),
            users,
            Arc::new(MemoryCache::new()),
            Arc::new(AuditService::new(SqlxAuditLogRepository::boxed(pool.clone()))),
        );
        let moderator = created.pop().unwrap();
        let stranger = created.pop().unwrap();
        let author = created.pop().unwrap();
        Fixture {
            pool,
            service,
            author,
            stranger,
            moderator,
        }
    }

    async fn create(f: &Fixture, title: &str) -> ThreadWithRefs {
        f.service
            .create_thread(&f.author, "technology", Some(title.into()), Some("Body".into()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_seeded_forums() {
        let f = setup().await;
        let forums = f.service.list_forums().await.unwrap();
        assert_eq!(forums.len(), 5);
        let forum = f.service.get_forum_by_slug("projects-ideas").await.unwrap();
        assert_eq!(forum.name, "Projects & Ideas");
        assert!(matches!(
            f.service.get_forum_by_slug("nope").await,
            Err(ForumServiceError::NotFound("Forum not found"))
        ));
    }

    #[tokio::test]
    async fn test_create_thread_slug_counter() {
        let f = setup().await;
        let first = create(&f, "Hello World").await;
        let second = create(&f, "Hello World").await;
        let third = create(&f, "Hello, World!").await;

        assert_eq!(first.thread.slug, "hello-world");
        assert_eq!(second.thread.slug, "hello-world-1");
        assert_eq!(third.thread.slug, "hello-world-2");
        assert_eq!(first.author.username, "author");
        assert_eq!(first.forum.slug, "technology");
    }

    #[tokio::test]
    async fn test_create_thread_validation() {
        let f = setup().await;
        let missing = f
            .service
            .create_thread(&f.author, "technology", Some("Title".into()), None)
            .await;
        assert!(matches!(missing, Err(ForumServiceError::ValidationError(_))));

        let unknown = f
            .service
            .create_thread(&f.author, "nowhere", Some("T".into()), Some("C".into()))
            .await;
        assert!(matches!(unknown, Err(ForumServiceError::NotFound("Forum not found"))));
    }

    #[tokio::test]
    async fn test_list_threads_newest_first() {
        let f = setup().await;
        create(&f, "Older").await;
        create(&f, "Newer").await;
        let page = f
            .service
            .list_threads("technology", &ListParams::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].thread.title, "Newer");
        assert_eq!(page.items[0].author.username, "author");
    }

    async fn add_comment(
        repo: &SqlxCommentRepository,
        thread_id: i64,
        author_id: i64,
        parent_id: Option<i64>,
        content: &str,
    ) -> Comment {
        let input = CreateCommentInput {
            content: content.into(),
            thread_id,
            author_id,
            parent_id,
        };
        repo.create(&input).await.unwrap()
    }

    #[tokio::test]
    async fn test_detail_counts_view_and_nests_comments() {
        let f = setup().await;
        let thread = create(&f, "Tree").await.thread;
        let repo = SqlxCommentRepository::new(f.pool.clone());
        let top = add_comment(&repo, thread.id, f.author.id, None, "top").await;
        let reply = add_comment(&repo, thread.id, f.author.id, Some(top.id), "reply").await;
        let nested = add_comment(&repo, thread.id, f.author.id, Some(reply.id), "nested").await;
        add_comment(&repo, thread.id, f.author.id, Some(nested.id), "too deep").await;
        add_comment(&repo, thread.id, f.author.id, None, "second top").await;

        let detail = f.service.get_thread_detail(thread.id).await.unwrap();
        assert_eq!(detail.thread.views, 1);
        assert_eq!(detail.comments.len(), 2);
        assert_eq!(detail.comments[0].comment.content, "top");
        assert_eq!(detail.comments[0].replies[0].comment.content, "reply");
        let third = &detail.comments[0].replies[0].replies[0];
        assert_eq!(third.comment.content, "nested");
        assert!(third.replies.is_empty());

        let again = f.service.get_thread_detail(thread.id).await.unwrap();
        assert_eq!(again.thread.views, 2);
    }

    #[tokio::test]
    async fn test_update_and_delete_ownership() {
        let f = setup().await;
        let thread = create(&f, "Owned").await.thread;

        let denied = f
            .service
            .update_thread(&f.stranger, thread.id, Some("Hijack".into()), None)
            .await;
        assert!(matches!(
            denied,
            Err(ForumServiceError::Auth(AuthError::NotOwner("thread")))
        ));

        let updated = f
            .service
            .update_thread(&f.moderator, thread.id, Some("Renamed".into()), None)
            .await
            .unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.content, "Body");

        assert!(f.service.delete_thread(&f.stranger, thread.id).await.is_err());
        f.service.delete_thread(&f.author, thread.id).await.unwrap();
        assert!(matches!(
            f.service.get_thread_detail(thread.id).await,
            Err(ForumServiceError::NotFound("Thread not found"))
        ));
    }

    #[tokio::test]
    async fn test_overlong_title_rejected() {
        let f = setup().await;
        let long = "x".repeat(MAX_TITLE_CHARS + 1);
        let created = f
            .service
            .create_thread(&f.author, "technology", Some(long.clone()), Some("Body".into()))
            .await;
        assert!(matches!(created, Err(ForumServiceError::ValidationError(_))));

        let thread = create(&f, &"x".repeat(MAX_TITLE_CHARS)).await.thread;
        let renamed = f
            .service
            .update_thread(&f.author, thread.id, Some(long), None)
            .await;
        match renamed {
            Err(ForumServiceError::ValidationError(msg)) => {
                assert_eq!(msg, "Title must be at most 255 characters")
            }
            other => panic!("unexpected: {:?}", other.map(|t| t.id)),
        }
    }

    #[tokio::test]
    async fn test_moderate_thread_audits_each_change() {
        let f = setup().await;
        let thread = create(&f, "Heated").await.thread;

        let moderated = f
            .service
            .moderate_thread(
                &f.moderator,
                thread.id,
                ThreadModeration {
                    is_locked: Some(true),
                    status: Some("closed".into()),
                },
            )
            .await
            .unwrap();
        assert!(moderated.is_locked);
        assert_eq!(moderated.status, ThreadStatus::Closed);
        assert!(!moderated.accepts_comments());

        let audit = AuditService::new(SqlxAuditLogRepository::boxed(f.pool.clone()));
        let actions: Vec<_> = audit.recent(10).await.unwrap().into_iter().map(|l| l.log.action).collect();
        assert!(actions.contains(&"LOCK_THREAD".to_string()));
        assert!(actions.contains(&"UPDATE_THREAD_STATUS".to_string()));

        let invalid = f
            .service
            .moderate_thread(
                &f.moderator,
                thread.id,
                ThreadModeration {
                    status: Some("archived".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(invalid, Err(ForumServiceError::ValidationError(_))));
    }

    fn comment(id: i64, parent_id: Option<i64>) -> CommentWithAuthor {
        let now = Utc::now();
        CommentWithAuthor {
            comment: Comment {
                id,
                content: format!("c{}", id),
                thread_id: 1,
                author_id: 1,
                parent_id,
                created_at: now,
                updated_at: now,
            },
            author: UserSummary {
                id: 1,
                username: "a".into(),
                name: None,
                avatar: None,
            },
        }
    }

    #[test]
    fn test_build_comment_tree_keeps_order() {
        let tree = build_comment_tree(vec![
            comment(1, None),
            comment(2, Some(1)),
            comment(3, None),
            comment(4, Some(1)),
        ]);
        let ids: Vec<_> = tree.iter().map(|n| n.comment.id).collect();
        assert_eq!(ids, vec![1, 3]);
        let reply_ids: Vec<_> = tree[0].replies.iter().map(|n| n.comment.id).collect();
        assert_eq!(reply_ids, vec![2, 4]);
        assert!(tree[1].replies.is_empty());
    }
}
