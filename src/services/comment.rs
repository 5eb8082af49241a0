//! Comment service
//!
//! Comments on forum threads, either top level or as replies. Locked and
//! closed threads take no new comments.

use crate::db::repositories::{CommentRepository, ThreadRepository};
use crate::models::{Comment, CommentWithAuthor, CreateCommentInput, Thread, User};
use crate::services::authorization::{require_comment_ownership, AuthError};
use anyhow::Context;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    ValidationError(String),

    /// Thread is locked or closed
    #[error("Thread is locked")]
    ThreadLocked,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    threads: Arc<dyn ThreadRepository>,
}

impl CommentService {
    pub fn new(comments: Arc<dyn CommentRepository>, threads: Arc<dyn ThreadRepository>) -> Self {
        Self { comments, threads }
    }

    /// Comment on a thread, optionally replying to one of its comments
    pub async fn create(
        &self,
        author: &User,
        thread_id: i64,
        content: Option<String>,
        parent_id: Option<i64>,
    ) -> Result<CommentWithAuthor, CommentServiceError> {
        let content = required_content(content)?;
        let thread = self.open_thread(thread_id).await?;

        if let Some(parent_id) = parent_id {
            let parent = self.find(parent_id, "Parent comment not found").await?;
            if parent.thread_id != thread.id {
                return Err(CommentServiceError::NotFound("Parent comment not found"));
            }
        }

        self.insert(author, thread.id, content, parent_id).await
    }

    /// Reply to a comment; the thread is the parent's
    pub async fn reply(
        &self,
        author: &User,
        parent_id: i64,
        content: Option<String>,
    ) -> Result<CommentWithAuthor, CommentServiceError> {
        let content = required_content(content)?;
        let parent = self.find(parent_id, "Parent comment not found").await?;
        let thread = self.open_thread(parent.thread_id).await?;

        self.insert(author, thread.id, content, Some(parent.id)).await
    }

    pub async fn update(
        &self,
        actor: &User,
        id: i64,
        content: Option<String>,
    ) -> Result<Comment, CommentServiceError> {
        let content = required_content(content)?;
        let comment = self.find(id, "Comment not found").await?;
        require_comment_ownership(actor, &comment)?;

        self.comments
            .update(id, &content)
            .await
            .context("Failed to update comment")?
            .ok_or(CommentServiceError::NotFound("Comment not found"))
    }

    /// Delete a comment and, through the foreign key, its replies
    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), CommentServiceError> {
        let comment = self.find(id, "Comment not found").await?;
        require_comment_ownership(actor, &comment)?;

        self.comments.delete(id).await.context("Failed to delete comment")?;
        tracing::info!("Comment {} on thread {} deleted by {}", id, comment.thread_id, actor.username);
        Ok(())
    }

    async fn insert(
        &self,
        author: &User,
        thread_id: i64,
        content: String,
        parent_id: Option<i64>,
    ) -> Result<CommentWithAuthor, CommentServiceError> {
        let input = CreateCommentInput {
            content,
            thread_id,
            author_id: author.id,
            parent_id,
        };
        let comment = self
            .comments
            .create(&input)
            .await
            .context("Failed to create comment")?;

        Ok(CommentWithAuthor {
            comment,
            author: author.summary(),
        })
    }

    async fn find(&self, id: i64, missing: &'static str) -> Result<Comment, CommentServiceError> {
        self.comments
            .get_by_id(id)
            .await
            .context("Failed to get comment")?
            .ok_or(CommentServiceError::NotFound(missing))
    }

    async fn open_thread(&self, id: i64) -> Result<Thread, CommentServiceError> {
        let thread = self
            .threads
            .get_by_id(id)
            .await
            .context("Failed to get thread")?
            .ok_or(CommentServiceError::NotFound("Thread not found"))?;
        if !thread.accepts_comments() {
            return Err(CommentServiceError::ThreadLocked);
        }
        Ok(thread)
    }
}

fn required_content(content: Option<String>) -> Result<String, CommentServiceError> {
    match content {
        Some(c) if !c.trim().is_empty() => Ok(c),
        _ => Err(CommentServiceError::ValidationError(
            "Content is required".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::thread::tests::input;
    use crate::db::repositories::{SqlxCommentRepository, SqlxThreadRepository, SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{UpdateThreadInput, UserRole};

    struct Fixture {
        service: CommentService,
        threads: Arc<dyn ThreadRepository>,
        thread: Thread,
        author: User,
        stranger: User,
        moderator: User,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let users = SqlxUserRepository::new(pool.clone());
        let mut created = Vec::new();
        for (name, role) in [
            ("ann", UserRole::User),
            ("ben", UserRole::User),
            ("mia", UserRole::Moderator),
        ] {
            let user = User::new(name.into(), format!("{}@example.com", name), "h".into(), role);
            created.push(users.create(&user).await.unwrap());
        }
        let moderator = created.pop().unwrap();
        let stranger = created.pop().unwrap();
        let author = created.pop().unwrap();

        let threads = SqlxThreadRepository::boxed(pool.clone());
        let thread = threads.create(&input("talk", author.id)).await.unwrap();
        Fixture {
            service: CommentService::new(SqlxCommentRepository::boxed(pool), threads.clone()),
            threads,
            thread,
            author,
            stranger,
            moderator,
        }
    }

    #[tokio::test]
    async fn test_create_and_reply() {
        let f = setup().await;
        let top = f
            .service
            .create(&f.author, f.thread.id, Some("first".into()), None)
            .await
            .unwrap();
        assert_eq!(top.author.username, "ann");
        assert!(top.comment.parent_id.is_none());

        let reply = f.service.reply(&f.stranger, top.comment.id, Some("re".into())).await.unwrap();
        assert_eq!(reply.comment.thread_id, f.thread.id);
        assert_eq!(reply.comment.parent_id, Some(top.comment.id));

        let nested = f
            .service
            .create(&f.author, f.thread.id, Some("nested".into()), Some(reply.comment.id))
            .await
            .unwrap();
        assert_eq!(nested.comment.parent_id, Some(reply.comment.id));
    }

    #[tokio::test]
    async fn test_create_validation() {
        let f = setup().await;
        assert!(matches!(
            f.service.create(&f.author, f.thread.id, Some("  ".into()), None).await,
            Err(CommentServiceError::ValidationError(_))
        ));
        assert!(matches!(
            f.service.create(&f.author, 999, Some("hi".into()), None).await,
            Err(CommentServiceError::NotFound("Thread not found"))
        ));
        assert!(matches!(
            f.service.create(&f.author, f.thread.id, Some("hi".into()), Some(999)).await,
            Err(CommentServiceError::NotFound("Parent comment not found"))
        ));
        assert!(matches!(
            f.service.reply(&f.author, 999, Some("hi".into())).await,
            Err(CommentServiceError::NotFound("Parent comment not found"))
        ));
    }

    #[tokio::test]
    async fn test_parent_must_share_thread() {
        let f = setup().await;
        let other = f.threads.create(&input("elsewhere", f.author.id)).await.unwrap();
        let foreign = f.service.create(&f.author, other.id, Some("x".into()), None).await.unwrap();

        let result = f
            .service
            .create(&f.author, f.thread.id, Some("y".into()), Some(foreign.comment.id))
            .await;
        assert!(matches!(result, Err(CommentServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_locked_or_closed_thread_rejects_comments() {
        let f = setup().await;
        let top = f.service.create(&f.author, f.thread.id, Some("a".into()), None).await.unwrap();
        f.threads
            .update(
                f.thread.id,
                &UpdateThreadInput {
                    is_locked: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(matches!(
            f.service.create(&f.author, f.thread.id, Some("b".into()), None).await,
            Err(CommentServiceError::ThreadLocked)
        ));
        assert!(matches!(
            f.service.reply(&f.author, top.comment.id, Some("c".into())).await,
            Err(CommentServiceError::ThreadLocked)
        ));
    }

    #[tokio::test]
    async fn test_update_and_delete_ownership() {
        let f = setup().await;
        let comment = f.service.create(&f.author, f.thread.id, Some("mine".into()), None).await.unwrap();
        let id = comment.comment.id;

        assert!(matches!(
            f.service.update(&f.stranger, id, Some("theirs".into())).await,
            Err(CommentServiceError::Auth(AuthError::NotOwner("comment")))
        ));
        let edited = f.service.update(&f.author, id, Some("edited".into())).await.unwrap();
        assert_eq!(edited.content, "edited");

        assert!(f.service.delete(&f.stranger, id).await.is_err());
        f.service.delete(&f.moderator, id).await.unwrap();
        assert!(matches!(
            f.service.update(&f.author, id, Some("gone".into())).await,
            Err(CommentServiceError::NotFound("Comment not found"))
        ));
    }
}
