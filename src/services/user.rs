//! User service
//!
//! Accounts and login sessions:
//! - Registration (always as USER) and login by username or email
//! - Opaque session tokens with a sliding expiry
//! - Profile updates
//!
//! Role and ban management live in [`crate::services::moderation`].

use crate::config::AuthConfig;
use crate::db::is_unique_violation;
use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, UpdateUserInput, User, UserRole};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Unknown user or wrong password
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Credentials were right but the account is banned
    #[error("Account banned")]
    Banned {
        reason: Option<String>,
        banned_until: Option<DateTime<Utc>>,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Username or email already taken
    #[error("{0}")]
    UserExists(String),

    #[error("User not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Where a session was opened from
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// User service for managing accounts and sessions
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_lifetime: Duration,
    session_update_age: Duration,
    min_password_length: usize,
}

impl UserService {
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_lifetime: Duration::days(config.session_days),
            session_update_age: Duration::hours(config.session_update_age_hours),
            min_password_length: config.min_password_length,
        }
    }

    /// Register a new user and open a session for them
    ///
    /// # Errors
    /// - `ValidationError` for a missing username, a malformed email or a short password
    /// - `UserExists` if the username or email is taken
    pub async fn register(
        &self,
        input: RegisterInput,
        client: ClientInfo,
    ) -> Result<(User, Session), UserServiceError> {
        let input = self.validate_register_input(input)?;

        if self
            .user_repo
            .get_by_username(&input.username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(UserServiceError::UserExists("Username is already taken".to_string()));
        }

        if self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists("Email is already registered".to_string()));
        }

        let password_hash = hash_password(&input.password)?;
        let mut user = User::new(input.username, input.email, password_hash, UserRole::User);
        user.name = input.name;

        let created = match self.user_repo.create(&user).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => {
                return Err(UserServiceError::UserExists(
                    "Username or email is already registered".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        let session = self.create_session(created.id, client).await?;
        tracing::info!("User registered: {} (id {})", created.username, created.id);

        Ok((created, session))
    }

    /// Check credentials and open a session
    ///
    /// An expired temporary ban is lifted here; an active one is refused
    /// after the password check so a ban never reveals whether the password
    /// was right.
    pub async fn login(
        &self,
        input: LoginInput,
        client: ClientInfo,
    ) -> Result<(User, Session), UserServiceError> {
        let mut user = self
            .find_user_by_username_or_email(input.username_or_email.trim())
            .await?
            .ok_or(UserServiceError::InvalidCredentials)?;

        if !verify_password(&input.password, &user.password_hash)? {
            return Err(UserServiceError::InvalidCredentials);
        }

        let now = Utc::now();
        if user.is_banned_at(now) {
            return Err(UserServiceError::Banned {
                reason: user.ban_reason.clone(),
                banned_until: user.banned_until,
            });
        }
        if user.ban_expired(now) {
            if let Some(unbanned) = self.user_repo.clear_ban(user.id).await? {
                tracing::info!("Temporary ban expired for user {}", unbanned.id);
                user = unbanned;
            }
        }

        let session = self.create_session(user.id, client).await?;
        Ok((user, session))
    }

    /// Invalidate a session token
    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token.
    ///
    /// Expired sessions are deleted and yield `None`. A session that has
    /// gone `session_update_age` without a refresh gets its expiry pushed
    /// out by another full lifetime.
    pub async fn validate_session(&self, token: &str) -> Result<Option<Session>, UserServiceError> {
        let Some(mut session) = self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        else {
            return Ok(None);
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {:#}", e);
            }
            return Ok(None);
        }

        let now = Utc::now();
        if session.needs_refresh(self.session_update_age, now) {
            let expires_at = now + self.session_lifetime;
            self.session_repo
                .touch(token, expires_at)
                .await
                .context("Failed to refresh session")?;
            session.expires_at = expires_at;
            session.updated_at = now;
        }

        Ok(Some(session))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?)
    }

    /// Update the caller's own display name and avatar
    pub async fn update_profile(
        &self,
        id: i64,
        input: UpdateUserInput,
    ) -> Result<User, UserServiceError> {
        if input.name.as_ref().is_some_and(|n| n.chars().count() > 100) {
            return Err(UserServiceError::ValidationError(
                "Name must be at most 100 characters".to_string(),
            ));
        }
        if input.avatar.as_ref().is_some_and(|a| a.len() > 500) {
            return Err(UserServiceError::ValidationError(
                "Avatar URL must be at most 500 characters".to_string(),
            ));
        }

        self.user_repo
            .update(id, &input)
            .await
            .context("Failed to update user")?
            .ok_or(UserServiceError::NotFound)
    }

    /// Delete expired sessions; run periodically
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?)
    }

    /// Session lifetime, used for the cookie Max-Age
    pub fn session_lifetime(&self) -> Duration {
        self.session_lifetime
    }

    fn validate_register_input(&self, input: RegisterInput) -> Result<RegisterInput, UserServiceError> {
        let username = input.username.trim().to_string();
        let email = input.email.trim().to_lowercase();

        if username.is_empty() {
            return Err(UserServiceError::ValidationError("Username is required".to_string()));
        }
        if username.chars().count() > 50 {
            return Err(UserServiceError::ValidationError(
                "Username must be at most 50 characters".to_string(),
            ));
        }
        if !is_plausible_email(&email) {
            return Err(UserServiceError::ValidationError("Invalid email format".to_string()));
        }
        if input.password.chars().count() < self.min_password_length {
            return Err(UserServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                self.min_password_length
            )));
        }

        Ok(RegisterInput {
            username,
            email,
            password: input.password,
            name: input.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        })
    }

    async fn find_user_by_username_or_email(
        &self,
        username_or_email: &str,
    ) -> Result<Option<User>, UserServiceError> {
        if let Some(user) = self
            .user_repo
            .get_by_username(username_or_email)
            .await
            .context("Failed to get user by username")?
        {
            return Ok(Some(user));
        }

        Ok(self
            .user_repo
            .get_by_email(&username_or_email.to_lowercase())
            .await
            .context("Failed to get user by email")?)
    }

    async fn create_session(&self, user_id: i64, client: ClientInfo) -> Result<Session, UserServiceError> {
        let mut session = Session::new(Uuid::new_v4().to_string(), user_id, self.session_lifetime);
        session.ip_address = client.ip_address;
        session.user_agent = client.user_agent;

        Ok(self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?)
    }
}

/// An `@` with a `.` somewhere after it
fn is_plausible_email(email: &str) -> bool {
    match email.find('@') {
        Some(at) if at > 0 => email[at + 1..].contains('.'),
        _ => false,
    }
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

impl RegisterInput {
    pub fn new(username: impl Into<String>, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            name: None,
        }
    }
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username_or_email: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username_or_email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username_or_email: username_or_email.into(),
            password: password.into(),
        }
    }
}
