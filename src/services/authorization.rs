//! Authorization
//!
//! Resolves the session user for a request and checks roles, permissions
//! and ownership. User lookups go through a [`RequestUserCache`] that lives
//! exactly as long as one request, so the API guards and the page guard
//! share a single database read per user.

use crate::db::repositories::UserRepository;
use crate::models::{Blog, Comment, Permission, Thread, User, UserRole};
use crate::services::user::UserService;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Per-request memo of verified users, keyed by id.
///
/// Cloning shares the same map; a fresh cache is created for every request
/// and dropped with it.
#[derive(Clone, Default)]
pub struct RequestUserCache {
    users: Arc<RwLock<HashMap<i64, User>>>,
}

impl RequestUserCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: i64) -> Option<User> {
        self.users.read().await.get(&id).cloned()
    }

    pub async fn insert(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn evict(&self, id: i64) {
        self.users.write().await.remove(&id);
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

/// Why a request was refused
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("User not found")]
    UserNotFound,

    #[error("Account banned")]
    Banned {
        reason: Option<String>,
        banned_until: Option<DateTime<Utc>>,
    },

    #[error("Insufficient permissions")]
    InsufficientRole { required: UserRole, current: UserRole },

    #[error("Insufficient permissions")]
    MissingPermission { required: Permission },

    /// Not the author and not privileged enough; carries the resource name
    #[error("You do not have permission to modify this {0}")]
    NotOwner(&'static str),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct AuthorizationService {
    users: Arc<dyn UserRepository>,
    user_service: Arc<UserService>,
}

impl AuthorizationService {
    pub fn new(users: Arc<dyn UserRepository>, user_service: Arc<UserService>) -> Self {
        Self { users, user_service }
    }

    /// Load a user through the request cache.
    ///
    /// A temporary ban whose end has passed is lifted on the spot: the ban
    /// fields are cleared, the cache entry evicted and the user re-read.
    pub async fn verify_user(&self, user_id: i64, cache: &RequestUserCache) -> Result<User, AuthError> {
        if let Some(user) = cache.get(user_id).await {
            return Ok(user);
        }

        let mut user = self.load_user(user_id).await?;
        if user.ban_expired(Utc::now()) {
            self.users.clear_ban(user_id).await?;
            tracing::info!("Temporary ban expired for user {}", user_id);
            cache.evict(user_id).await;
            user = self.load_user(user_id).await?;
        }

        cache.insert(user.clone()).await;
        Ok(user)
    }

    /// The user behind a session token, banned or not
    pub async fn session_user(
        &self,
        token: Option<&str>,
        cache: &RequestUserCache,
    ) -> Result<User, AuthError> {
        let token = token.filter(|t| !t.is_empty()).ok_or(AuthError::Unauthenticated)?;
        let session = self
            .user_service
            .validate_session(token)
            .await
            .map_err(|e| AuthError::InternalError(e.into()))?
            .ok_or(AuthError::Unauthenticated)?;

        self.verify_user(session.user_id, cache).await
    }

    /// The session user, refused if their ban still applies
    pub async fn require_verified_user(
        &self,
        token: Option<&str>,
        cache: &RequestUserCache,
    ) -> Result<User, AuthError> {
        let user = self.session_user(token, cache).await?;
        if user.is_banned_at(Utc::now()) {
            return Err(AuthError::Banned {
                reason: user.ban_reason.clone(),
                banned_until: user.banned_until,
            });
        }
        Ok(user)
    }

    async fn load_user(&self, user_id: i64) -> Result<User, AuthError> {
        self.users
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}

pub fn require_role(user: &User, required: UserRole) -> Result<(), AuthError> {
    if user.has_role(required) {
        Ok(())
    } else {
        Err(AuthError::InsufficientRole {
            required,
            current: user.role,
        })
    }
}

pub fn require_permission(user: &User, required: Permission) -> Result<(), AuthError> {
    if user.has_permission(required) {
        Ok(())
    } else {
        Err(AuthError::MissingPermission { required })
    }
}

pub fn require_thread_ownership(user: &User, thread: &Thread) -> Result<(), AuthError> {
    if user.can_modify_thread(thread.author_id) {
        Ok(())
    } else {
        Err(AuthError::NotOwner("thread"))
    }
}

pub fn require_comment_ownership(user: &User, comment: &Comment) -> Result<(), AuthError> {
    if user.can_modify_comment(comment.author_id) {
        Ok(())
    } else {
        Err(AuthError::NotOwner("comment"))
    }
}

pub fn require_blog_ownership(user: &User, blog: &Blog) -> Result<(), AuthError> {
    if user.can_modify_blog(blog.author_id) {
        Ok(())
    } else {
        Err(AuthError::NotOwner("blog"))
    }
}
