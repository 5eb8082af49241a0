//! Thread model
//!
//! A thread is a discussion topic inside a forum and the container for comments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{CommentNode, Forum, UserSummary};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub content: String,
    pub forum_id: i64,
    pub author_id: i64,
    pub views: i64,
    pub is_locked: bool,
    pub status: ThreadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Thread {
    /// Locked and closed threads take no new comments
    pub fn accepts_comments(&self) -> bool {
        !self.is_locked && self.status == ThreadStatus::Open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreadStatus {
    #[default]
    Open,
    Closed,
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadStatus::Open => write!(f, "OPEN"),
            ThreadStatus::Closed => write!(f, "CLOSED"),
        }
    }
}

impl FromStr for ThreadStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "OPEN" => Ok(ThreadStatus::Open),
            "CLOSED" => Ok(ThreadStatus::Closed),
            _ => Err(anyhow::anyhow!("Invalid thread status: {}", s)),
        }
    }
}

/// Thread in a forum listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    #[serde(flatten)]
    pub thread: Thread,
    pub author: UserSummary,
    pub comment_count: i64,
}

/// Thread with its author and forum
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadWithRefs {
    #[serde(flatten)]
    pub thread: Thread,
    pub author: UserSummary,
    pub forum: Forum,
}

/// Full thread page: author, forum and the nested comment tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadDetail {
    #[serde(flatten)]
    pub thread: Thread,
    pub author: UserSummary,
    pub forum: Forum,
    pub comments: Vec<CommentNode>,
}

#[derive(Debug, Clone)]
pub struct CreateThreadInput {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub forum_id: i64,
    pub author_id: i64,
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct UpdateThreadInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub is_locked: Option<bool>,
    pub status: Option<ThreadStatus>,
}
