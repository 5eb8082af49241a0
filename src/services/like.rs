//! Like service
//!
//! Likes toggle: liking something twice removes the like. Listings come
//! with a short "liked by" line naming the first three likers.

use crate::db::is_unique_violation;
use crate::db::repositories::{CommentRepository, LikeRepository, ThreadRepository};
use crate::models::{LikeTarget, LikeWithUser, User, UserSummary};
use anyhow::Context;
use serde::Serialize;
use std::sync::Arc;

/// Likers named in the "liked by" line
const NAMED_LIKERS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum LikeServiceError {
    #[error("{0}")]
    ValidationError(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("Like already exists")]
    Conflict,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Result of a toggle
#[derive(Debug, Clone)]
pub enum LikeToggle {
    Liked(LikeWithUser),
    Unliked,
}

/// Likes on one target as shown under a thread or comment
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeSummary {
    /// Newest first
    pub likes: Vec<LikeWithUser>,
    pub like_count: usize,
    pub liked_by_text: String,
    pub has_liked: bool,
    pub users: Vec<UserSummary>,
}

/// Exactly one of the two ids must be given
pub fn like_target(thread_id: Option<i64>, comment_id: Option<i64>) -> Result<LikeTarget, LikeServiceError> {
    match (thread_id, comment_id) {
        (Some(id), None) => Ok(LikeTarget::Thread(id)),
        (None, Some(id)) => Ok(LikeTarget::Comment(id)),
        (None, None) => Err(LikeServiceError::ValidationError(
            "Either threadId or commentId is required",
        )),
        (Some(_), Some(_)) => Err(LikeServiceError::ValidationError(
            "Cannot like both thread and comment at once",
        )),
    }
}

/// "a", "a and b", "a, b, and c", "a, b, c, and N other(s)"
pub fn liked_by_text(names: &[&str], total: usize) -> String {
    match (names, total) {
        (_, 0) | ([], _) => String::new(),
        ([a], 1) => a.to_string(),
        ([a, b, ..], 2) => format!("{} and {}", a, b),
        ([a, b, c, ..], 3) => format!("{}, {}, and {}", a, b, c),
        ([a, b, c, ..], n) => {
            let remaining = n - NAMED_LIKERS;
            let plural = if remaining > 1 { "s" } else { "" };
            format!("{}, {}, {}, and {} other{}", a, b, c, remaining, plural)
        }
        _ => names.join(", "),
    }
}

pub struct LikeService {
    likes: Arc<dyn LikeRepository>,
    threads: Arc<dyn ThreadRepository>,
    comments: Arc<dyn CommentRepository>,
}

impl LikeService {
    pub fn new(
        likes: Arc<dyn LikeRepository>,
        threads: Arc<dyn ThreadRepository>,
        comments: Arc<dyn CommentRepository>,
    ) -> Self {
        Self {
            likes,
            threads,
            comments,
        }
    }

    /// Like the target, or remove the like if `user` already has one
    pub async fn toggle(&self, user: &User, target: LikeTarget) -> Result<LikeToggle, LikeServiceError> {
        self.ensure_target(target).await?;

        if let Some(existing) = self
            .likes
            .find(user.id, target)
            .await
            .context("Failed to find like")?
        {
            self.likes.delete(existing.id).await.context("Failed to remove like")?;
            return Ok(LikeToggle::Unliked);
        }

        let like = match self.likes.create(user.id, target).await {
            Ok(like) => like,
            Err(e) if is_unique_violation(&e) => return Err(LikeServiceError::Conflict),
            Err(e) => return Err(e.into()),
        };
        Ok(LikeToggle::Liked(LikeWithUser {
            like,
            user: user.summary(),
        }))
    }

    /// Likes on a target; `viewer_id` decides `has_liked`
    pub async fn likes_for(
        &self,
        target: LikeTarget,
        viewer_id: Option<i64>,
    ) -> Result<LikeSummary, LikeServiceError> {
        let likes = match target {
            LikeTarget::Thread(id) => self.likes.list_for_thread(id).await,
            LikeTarget::Comment(id) => self.likes.list_for_comment(id).await,
        }
        .context("Failed to list likes")?;

        let has_liked = viewer_id.is_some_and(|viewer| likes.iter().any(|l| l.like.user_id == viewer));
        let names: Vec<&str> = likes
            .iter()
            .take(NAMED_LIKERS)
            .map(|l| l.user.username.as_str())
            .collect();
        let liked_by_text = liked_by_text(&names, likes.len());
        let users = likes.iter().map(|l| l.user.clone()).collect();

        Ok(LikeSummary {
            like_count: likes.len(),
            liked_by_text,
            has_liked,
            users,
            likes,
        })
    }

    /// Thread likes; a missing thread is an error here, unlike `likes_for`
    pub async fn thread_likes(
        &self,
        thread_id: i64,
        viewer_id: Option<i64>,
    ) -> Result<LikeSummary, LikeServiceError> {
        let target = LikeTarget::Thread(thread_id);
        self.ensure_target(target).await?;
        self.likes_for(target, viewer_id).await
    }

    async fn ensure_target(&self, target: LikeTarget) -> Result<(), LikeServiceError> {
        let exists = match target {
            LikeTarget::Thread(id) => self
                .threads
                .get_by_id(id)
                .await
                .context("Failed to get thread")?
                .is_some(),
            LikeTarget::Comment(id) => self
                .comments
                .get_by_id(id)
                .await
                .context("Failed to get comment")?
                .is_some(),
        };
        if exists {
            return Ok(());
        }
        Err(LikeServiceError::NotFound(match target {
            LikeTarget::Thread(_) => "Thread not found",
            LikeTarget::Comment(_) => "Comment not found",
        }))
    }
}
