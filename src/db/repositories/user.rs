//! User repository
//!
//! Database operations for users: accounts, roles and bans.

use crate::db::{like_pattern, on_backend, DynDatabasePool, LastInsertId};
use crate::models::{BanInput, ListParams, UpdateUserInput, User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

const USER_COLUMNS: &str = "id, username, email, email_verified, name, avatar, password_hash, role, \
     is_banned, banned_at, banned_by, ban_reason, banned_until, created_at, updated_at";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by username
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Update profile fields; `None` leaves a field unchanged
    async fn update(&self, id: i64, input: &UpdateUserInput) -> Result<Option<User>>;

    /// Change a user's role
    async fn update_role(&self, id: i64, role: UserRole) -> Result<Option<User>>;

    /// Ban a user
    async fn set_ban(&self, id: i64, ban: &BanInput) -> Result<Option<User>>;

    /// Lift a ban and clear every ban field
    async fn clear_ban(&self, id: i64) -> Result<Option<User>>;

    /// Count total users
    async fn count(&self) -> Result<i64>;

    /// Count users created at or after `since`
    async fn count_since(&self, since: DateTime<Utc>) -> Result<i64>;

    /// List users, newest first, optionally filtered by username/email/name
    async fn list(&self, params: &ListParams, search: Option<&str>) -> Result<(Vec<User>, i64)>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
        let row: Option<UserRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(&sql)
                .bind(value)
                .fetch_optional(conn)
                .await
                .with_context(|| format!("Failed to get user by {}", column))?
        });
        row.map(User::try_from).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    email_verified: bool,
    name: Option<String>,
    avatar: Option<String>,
    password_hash: String,
    role: String,
    is_banned: bool,
    banned_at: Option<DateTime<Utc>>,
    banned_by: Option<i64>,
    ban_reason: Option<String>,
    banned_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            email_verified: row.email_verified,
            name: row.name,
            avatar: row.avatar,
            password_hash: row.password_hash,
            role: row.role.parse()?,
            is_banned: row.is_banned,
            banned_at: row.banned_at,
            banned_by: row.banned_by,
            ban_reason: row.ban_reason,
            banned_until: row.banned_until,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        let now = Utc::now();
        let role = user.role.to_string();

        let id = on_backend!(self.pool, |conn| {
            sqlx::query(
                r#"
                INSERT INTO users (username, email, email_verified, name, avatar, password_hash, role,
                                   is_banned, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(user.email_verified)
            .bind(&user.name)
            .bind(&user.avatar)
            .bind(&user.password_hash)
            .bind(&role)
            .bind(false)
            .bind(now)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create user")?
            .last_id()
        });

        Ok(User {
            id,
            is_banned: false,
            banned_at: None,
            banned_by: None,
            ban_reason: None,
            banned_until: None,
            created_at: now,
            updated_at: now,
            ..user.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row: Option<UserRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(&sql)
                .bind(id)
                .fetch_optional(conn)
                .await
                .context("Failed to get user by ID")?
        });
        row.map(User::try_from).transpose()
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        self.fetch_one_by("username", username).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_one_by("email", email).await
    }

    async fn update(&self, id: i64, input: &UpdateUserInput) -> Result<Option<User>> {
        on_backend!(self.pool, |conn| {
            sqlx::query(
                r#"
                UPDATE users
                SET name = COALESCE(?, name), avatar = COALESCE(?, avatar), updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&input.name)
            .bind(&input.avatar)
            .bind(Utc::now())
            .bind(id)
            .execute(conn)
            .await
            .context("Failed to update user")?;
        });
        self.get_by_id(id).await
    }

    async fn update_role(&self, id: i64, role: UserRole) -> Result<Option<User>> {
        let role = role.to_string();
        on_backend!(self.pool, |conn| {
            sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
                .bind(&role)
                .bind(Utc::now())
                .bind(id)
                .execute(conn)
                .await
                .context("Failed to update user role")?;
        });
        self.get_by_id(id).await
    }

    async fn set_ban(&self, id: i64, ban: &BanInput) -> Result<Option<User>> {
        let now = Utc::now();
        on_backend!(self.pool, |conn| {
            sqlx::query(
                r#"
                UPDATE users
                SET is_banned = ?, banned_at = ?, banned_by = ?, ban_reason = ?, banned_until = ?,
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(true)
            .bind(now)
            .bind(ban.banned_by)
            .bind(&ban.reason)
            .bind(ban.banned_until)
            .bind(now)
            .bind(id)
            .execute(conn)
            .await
            .context("Failed to ban user")?;
        });
        self.get_by_id(id).await
    }

    async fn clear_ban(&self, id: i64) -> Result<Option<User>> {
        on_backend!(self.pool, |conn| {
            sqlx::query(
                r#"
                UPDATE users
                SET is_banned = ?, banned_at = NULL, banned_by = NULL, ban_reason = NULL,
                    banned_until = NULL, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(false)
            .bind(Utc::now())
            .bind(id)
            .execute(conn)
            .await
            .context("Failed to clear user ban")?;
        });
        self.get_by_id(id).await
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = on_backend!(self.pool, |conn| {
            sqlx::query_as("SELECT COUNT(*) FROM users")
                .fetch_one(conn)
                .await
                .context("Failed to count users")?
        });
        Ok(count)
    }

    async fn count_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let (count,): (i64,) = on_backend!(self.pool, |conn| {
            sqlx::query_as("SELECT COUNT(*) FROM users WHERE created_at >= ?")
                .bind(since)
                .fetch_one(conn)
                .await
                .context("Failed to count new users")?
        });
        Ok(count)
    }

    async fn list(&self, params: &ListParams, search: Option<&str>) -> Result<(Vec<User>, i64)> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);
        let filter = "(? IS NULL OR username LIKE ? ESCAPE '!' OR email LIKE ? ESCAPE '!' OR name LIKE ? ESCAPE '!')";
        let count_sql = format!("SELECT COUNT(*) FROM users WHERE {}", filter);
        let list_sql = format!(
            "SELECT {} FROM users WHERE {} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            USER_COLUMNS, filter
        );

        let (total,): (i64,) = on_backend!(self.pool, |conn| {
            sqlx::query_as(&count_sql)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .fetch_one(conn)
                .await
                .context("Failed to count users")?
        });

        let rows: Vec<UserRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(&list_sql)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .bind(&pattern)
                .bind(params.limit as i64)
                .bind(params.offset())
                .fetch_all(conn)
                .await
                .context("Failed to list users")?
        });

        let users = rows.into_iter().map(User::try_from).collect::<Result<Vec<_>>>()?;
        Ok((users, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, is_unique_violation, migrations};
    use chrono::Duration;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxUserRepository::new(pool.clone());
        (pool, repo)
    }

    fn create_test_user(username: &str, email: &str) -> User {
        User::new(
            username.to_string(),
            email.to_string(),
            "$argon2id$test".to_string(),
            UserRole::User,
        )
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo
            .create(&create_test_user("testuser", "test@example.com"))
            .await
            .expect("Failed to create user");

        assert!(created.id > 0);
        assert_eq!(created.role, UserRole::User);

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "testuser");
        assert_eq!(by_id.password_hash, "$argon2id$test");
        assert!(!by_id.is_banned);

        let by_name = repo.get_by_username("testuser").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);
        let by_email = repo.get_by_email("test@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);

        assert!(repo.get_by_id(999).await.unwrap().is_none());
        assert!(repo.get_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_constraints() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&create_test_user("alice", "alice@example.com")).await.unwrap();

        let err = repo
            .create(&create_test_user("alice", "other@example.com"))
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));

        let err = repo
            .create(&create_test_user("other", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_update_profile_and_role() {
        let (_pool, repo) = setup_test_repo().await;
        let user = repo.create(&create_test_user("bob", "bob@example.com")).await.unwrap();

        let updated = repo
            .update(
                user.id,
                &UpdateUserInput {
                    name: Some("Bob B.".into()),
                    avatar: None,
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name.as_deref(), Some("Bob B."));
        assert!(updated.avatar.is_none());

        let promoted = repo.update_role(user.id, UserRole::Moderator).await.unwrap().unwrap();
        assert_eq!(promoted.role, UserRole::Moderator);
    }

    #[tokio::test]
    async fn test_ban_and_clear() {
        let (_pool, repo) = setup_test_repo().await;
        let admin = repo.create(&create_test_user("admin", "admin@example.com")).await.unwrap();
        let user = repo.create(&create_test_user("carol", "carol@example.com")).await.unwrap();

        let until = Utc::now() + Duration::days(3);
        let banned = repo
            .set_ban(
                user.id,
                &BanInput {
                    banned_by: admin.id,
                    reason: Some("spam".into()),
                    banned_until: Some(until),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert!(banned.is_banned);
        assert_eq!(banned.banned_by, Some(admin.id));
        assert_eq!(banned.ban_reason.as_deref(), Some("spam"));
        assert!(banned.banned_at.is_some());
        assert!(banned.banned_until.is_some());

        let cleared = repo.clear_ban(user.id).await.unwrap().unwrap();
        assert!(!cleared.is_banned);
        assert!(cleared.banned_at.is_none());
        assert!(cleared.banned_by.is_none());
        assert!(cleared.ban_reason.is_none());
        assert!(cleared.banned_until.is_none());
    }

    #[tokio::test]
    async fn test_count_and_list() {
        let (_pool, repo) = setup_test_repo().await;
        assert_eq!(repo.count().await.unwrap(), 0);

        for i in 0..5 {
            repo.create(&create_test_user(&format!("user{}", i), &format!("user{}@example.com", i)))
                .await
                .unwrap();
        }
        repo.create(&create_test_user("zed", "zed@example.com")).await.unwrap();

        assert_eq!(repo.count().await.unwrap(), 6);
        assert_eq!(
            repo.count_since(Utc::now() - Duration::days(7)).await.unwrap(),
            6
        );
        assert_eq!(repo.count_since(Utc::now() + Duration::days(1)).await.unwrap(), 0);

        let (page, total) = repo.list(&ListParams::new(1, 4), None).await.unwrap();
        assert_eq!(total, 6);
        assert_eq!(page.len(), 4);

        let (page, total) = repo.list(&ListParams::new(2, 4), None).await.unwrap();
        assert_eq!(total, 6);
        assert_eq!(page.len(), 2);

        let (found, total) = repo.list(&ListParams::default(), Some("ZED")).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(found[0].username, "zed");

        let (found, _) = repo.list(&ListParams::default(), Some("user_")).await.unwrap();
        assert!(found.is_empty(), "underscore must be matched literally");
    }
}
