//! Session repository
//!
//! Database operations for login sessions.

use crate::db::{on_backend, DynDatabasePool};
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get session by ID (token)
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Move the expiry to `expires_at` and mark the session as refreshed now
    async fn touch(&self, id: &str, expires_at: DateTime<Utc>) -> Result<()>;

    /// Delete a session
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete all sessions for a user
    async fn delete_by_user(&self, user_id: i64) -> Result<u64>;

    /// Delete expired sessions, returning how many were removed
    async fn delete_expired(&self) -> Result<u64>;
}

/// SQLx-based session repository implementation
pub struct SqlxSessionRepository {
    pool: DynDatabasePool,
}

impl SqlxSessionRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    user_id: i64,
    expires_at: DateTime<Utc>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: row.id,
            user_id: row.user_id,
            expires_at: row.expires_at,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        on_backend!(self.pool, |conn| {
            sqlx::query(
                r#"
                INSERT INTO sessions (id, user_id, expires_at, ip_address, user_agent, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&session.id)
            .bind(session.user_id)
            .bind(session.expires_at)
            .bind(&session.ip_address)
            .bind(&session.user_agent)
            .bind(session.created_at)
            .bind(session.updated_at)
            .execute(conn)
            .await
            .context("Failed to create session")?;
        });
        Ok(session.clone())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        let row: Option<SessionRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(
                r#"
                SELECT id, user_id, expires_at, ip_address, user_agent, created_at, updated_at
                FROM sessions
                WHERE id = ?
                "#,
            )
            .bind(id)
            .fetch_optional(conn)
            .await
            .context("Failed to get session")?
        });
        Ok(row.map(Session::from))
    }

    async fn touch(&self, id: &str, expires_at: DateTime<Utc>) -> Result<()> {
        on_backend!(self.pool, |conn| {
            sqlx::query("UPDATE sessions SET expires_at = ?, updated_at = ? WHERE id = ?")
                .bind(expires_at)
                .bind(Utc::now())
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to refresh session")?;
        });
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        on_backend!(self.pool, |conn| {
            sqlx::query("DELETE FROM sessions WHERE id = ?")
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to delete session")?;
        });
        Ok(())
    }

    async fn delete_by_user(&self, user_id: i64) -> Result<u64> {
        let affected = on_backend!(self.pool, |conn| {
            sqlx::query("DELETE FROM sessions WHERE user_id = ?")
                .bind(user_id)
                .execute(conn)
                .await
                .context("Failed to delete user sessions")?
                .rows_affected()
        });
        Ok(affected)
    }

    async fn delete_expired(&self) -> Result<u64> {
        let affected = on_backend!(self.pool, |conn| {
            sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
                .bind(Utc::now())
                .execute(conn)
                .await
                .context("Failed to delete expired sessions")?
                .rows_affected()
        });
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{User, UserRole};
    use chrono::Duration;

    async fn setup_test_repo() -> (SqlxSessionRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let users = SqlxUserRepository::new(pool.clone());
        let user = users
            .create(&User::new("dave".into(), "dave@example.com".into(), "h".into(), UserRole::User))
            .await
            .unwrap();
        (SqlxSessionRepository::new(pool), user.id)
    }

    fn test_session(id: &str, user_id: i64, lifetime: Duration) -> Session {
        Session::new(id.to_string(), user_id, lifetime)
    }

    #[tokio::test]
    async fn test_create_and_get_session() {
        let (repo, user_id) = setup_test_repo().await;
        let mut session = test_session("tok-1", user_id, Duration::days(7));
        session.ip_address = Some("127.0.0.1".into());
        repo.create(&session).await.unwrap();

        let found = repo.get_by_id("tok-1").await.unwrap().unwrap();
        assert_eq!(found.user_id, user_id);
        assert_eq!(found.ip_address.as_deref(), Some("127.0.0.1"));
        assert!(!found.is_expired());

        assert!(repo.get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_touch_extends_expiry() {
        let (repo, user_id) = setup_test_repo().await;
        let mut session = test_session("tok-2", user_id, Duration::hours(1));
        session.updated_at = Utc::now() - Duration::days(2);
        repo.create(&session).await.unwrap();

        let new_expiry = Utc::now() + Duration::days(7);
        repo.touch("tok-2", new_expiry).await.unwrap();

        let found = repo.get_by_id("tok-2").await.unwrap().unwrap();
        assert!(found.expires_at > Utc::now() + Duration::days(6));
        assert!(found.updated_at > Utc::now() - Duration::minutes(1));
    }

    #[tokio::test]
    async fn test_delete_and_delete_by_user() {
        let (repo, user_id) = setup_test_repo().await;
        repo.create(&test_session("a", user_id, Duration::days(1))).await.unwrap();
        repo.create(&test_session("b", user_id, Duration::days(1))).await.unwrap();
        repo.create(&test_session("c", user_id, Duration::days(1))).await.unwrap();

        repo.delete("a").await.unwrap();
        assert!(repo.get_by_id("a").await.unwrap().is_none());

        assert_eq!(repo.delete_by_user(user_id).await.unwrap(), 2);
        assert!(repo.get_by_id("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_expired_sessions() {
        let (repo, user_id) = setup_test_repo().await;
        let mut expired = test_session("old", user_id, Duration::days(1));
        expired.expires_at = Utc::now() - Duration::hours(1);
        repo.create(&expired).await.unwrap();
        repo.create(&test_session("fresh", user_id, Duration::days(1))).await.unwrap();

        assert_eq!(repo.delete_expired().await.unwrap(), 1);
        assert!(repo.get_by_id("old").await.unwrap().is_none());
        assert!(repo.get_by_id("fresh").await.unwrap().is_some());
    }
}
