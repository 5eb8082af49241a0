//! Moderation service
//!
//! User management from the admin panel: listing, bans and role changes.
//! A ban signs the user out everywhere by deleting their sessions.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{BanInput, ListParams, NewAuditLog, PagedResult, User, UserRole};
use crate::services::audit::{actions, targets, AuditService};
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error("User not found")]
    NotFound,

    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ModerationService {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    audit: Arc<AuditService>,
}

impl ModerationService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self { users, sessions, audit }
    }

    /// Newest accounts first; `search` matches username, email and name
    pub async fn list_users(
        &self,
        params: &ListParams,
        search: Option<&str>,
    ) -> Result<PagedResult<User>, ModerationError> {
        let (users, total) = self
            .users
            .list(params, search)
            .await
            .context("Failed to list users")?;
        Ok(PagedResult::new(users, total, params))
    }

    /// Ban `target_id`, permanently when `until` is `None`.
    ///
    /// Only admins may ban someone of their own rank or above.
    pub async fn ban(
        &self,
        actor: &User,
        target_id: i64,
        reason: Option<String>,
        until: Option<DateTime<Utc>>,
    ) -> Result<User, ModerationError> {
        if actor.id == target_id {
            return Err(ModerationError::ValidationError(
                "You cannot ban yourself".to_string(),
            ));
        }
        let target = self.find(target_id).await?;
        if target.role.level() >= actor.role.level() && actor.role != UserRole::Admin {
            return Err(ModerationError::Forbidden(
                "You cannot ban a user with an equal or higher role",
            ));
        }
        if until.is_some_and(|t| t <= Utc::now()) {
            return Err(ModerationError::ValidationError(
                "Ban end must be in the future".to_string(),
            ));
        }

        let reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
        let ban = BanInput {
            banned_by: actor.id,
            reason: reason.clone(),
            banned_until: until,
        };
        let banned = self
            .users
            .set_ban(target_id, &ban)
            .await
            .context("Failed to ban user")?
            .ok_or(ModerationError::NotFound)?;
        let revoked = self
            .sessions
            .delete_by_user(target_id)
            .await
            .context("Failed to revoke sessions of banned user")?;

        let details = match (&reason, until) {
            (Some(r), Some(t)) => format!("Banned until {}: {}", t.to_rfc3339(), r),
            (Some(r), None) => format!("Banned permanently: {}", r),
            (None, Some(t)) => format!("Banned until {}", t.to_rfc3339()),
            (None, None) => "Banned permanently".to_string(),
        };
        self.audit
            .record(NewAuditLog::new(actions::BAN_USER, targets::USER, target_id, actor.id).with_details(details))
            .await;
        tracing::info!(
            "User {} banned by {} ({} session(s) revoked)",
            banned.username,
            actor.username,
            revoked
        );

        Ok(banned)
    }

    pub async fn unban(&self, actor: &User, target_id: i64) -> Result<User, ModerationError> {
        self.find(target_id).await?;
        let user = self
            .users
            .clear_ban(target_id)
            .await
            .context("Failed to unban user")?
            .ok_or(ModerationError::NotFound)?;

        self.audit
            .record(NewAuditLog::new(actions::UNBAN_USER, targets::USER, target_id, actor.id))
            .await;
        tracing::info!("User {} unbanned by {}", user.username, actor.username);
        Ok(user)
    }

    pub async fn change_role(&self, actor: &User, target_id: i64, role: &str) -> Result<User, ModerationError> {
        if actor.id == target_id {
            return Err(ModerationError::ValidationError(
                "You cannot change your own role".to_string(),
            ));
        }
        let role: UserRole = role
            .parse()
            .map_err(|_| ModerationError::ValidationError(format!("Invalid role: {}", role)))?;
        let target = self.find(target_id).await?;

        let user = self
            .users
            .update_role(target_id, role)
            .await
            .context("Failed to change role")?
            .ok_or(ModerationError::NotFound)?;

        self.audit
            .record(
                NewAuditLog::new(actions::CHANGE_ROLE, targets::USER, target_id, actor.id)
                    .with_details(format!("{} -> {}", target.role, role)),
            )
            .await;
        tracing::info!("User {} role changed {} -> {} by {}", user.username, target.role, role, actor.username);
        Ok(user)
    }

    async fn find(&self, id: i64) -> Result<User, ModerationError> {
        self.users
            .get_by_id(id)
            .await
            .context("Failed to get user")?
            .ok_or(ModerationError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxAuditLogRepository, SqlxSessionRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::Session;
    use chrono::Duration;

    struct Fixture {
        service: ModerationService,
        sessions: Arc<dyn SessionRepository>,
        audit: Arc<AuditService>,
        user: User,
        moderator: User,
        other_moderator: User,
        admin: User,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let users = SqlxUserRepository::boxed(pool.clone());
        let mut created = Vec::new();
        for (name, role) in [
            ("plain", UserRole::User),
            ("mod", UserRole::Moderator),
            ("mod2", UserRole::Moderator),
            ("root", UserRole::Admin),
        ] {
            let user = User::new(name.into(), format!("{}@example.com", name), "h".into(), role);
            created.push(users.create(&user).await.unwrap());
        }
        let sessions = SqlxSessionRepository::boxed(pool.clone());
        let audit = Arc::new(AuditService::new(SqlxAuditLogRepository::boxed(pool)));
        let mut created = created.into_iter();
        Fixture {
            service: ModerationService::new(users, sessions.clone(), audit.clone()),
            sessions,
            audit,
            user: created.next().unwrap(),
            moderator: created.next().unwrap(),
            other_moderator: created.next().unwrap(),
            admin: created.next().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_ban_revokes_sessions_and_audits() {
        let f = setup().await;
        let session = Session::new("tok".into(), f.user.id, Duration::days(7));
        f.sessions.create(&session).await.unwrap();

        let until = Utc::now() + Duration::days(3);
        let banned = f
            .service
            .ban(&f.moderator, f.user.id, Some(" spam ".into()), Some(until))
            .await
            .unwrap();
        assert!(banned.is_banned);
        assert_eq!(banned.ban_reason.as_deref(), Some("spam"));
        assert_eq!(banned.banned_by, Some(f.moderator.id));
        assert!(f.sessions.get_by_id("tok").await.unwrap().is_none());

        let recent = f.audit.recent(1).await.unwrap();
        assert_eq!(recent[0].log.action, "BAN_USER");
        assert_eq!(recent[0].log.target_id, f.user.id);

        let unbanned = f.service.unban(&f.moderator, f.user.id).await.unwrap();
        assert!(!unbanned.is_banned);
        assert!(unbanned.ban_reason.is_none());
    }

    #[tokio::test]
    async fn test_ban_rules() {
        let f = setup().await;
        assert!(matches!(
            f.service.ban(&f.moderator, f.moderator.id, None, None).await,
            Err(ModerationError::ValidationError(_))
        ));
        assert!(matches!(
            f.service.ban(&f.moderator, f.other_moderator.id, None, None).await,
            Err(ModerationError::Forbidden(_))
        ));
        assert!(matches!(
            f.service.ban(&f.moderator, f.admin.id, None, None).await,
            Err(ModerationError::Forbidden(_))
        ));
        assert!(matches!(
            f.service.ban(&f.moderator, 999, None, None).await,
            Err(ModerationError::NotFound)
        ));
        assert!(matches!(
            f.service
                .ban(&f.moderator, f.user.id, None, Some(Utc::now() - Duration::hours(1)))
                .await,
            Err(ModerationError::ValidationError(_))
        ));

        let banned = f.service.ban(&f.admin, f.other_moderator.id, None, None).await.unwrap();
        assert!(banned.is_banned);
        assert!(banned.banned_until.is_none());
    }

    #[tokio::test]
    async fn test_change_role() {
        let f = setup().await;
        let promoted = f.service.change_role(&f.admin, f.user.id, "moderator").await.unwrap();
        assert_eq!(promoted.role, UserRole::Moderator);
        assert_eq!(f.audit.recent(1).await.unwrap()[0].log.details.as_deref(), Some("USER -> MODERATOR"));

        assert!(matches!(
            f.service.change_role(&f.admin, f.admin.id, "USER").await,
            Err(ModerationError::ValidationError(_))
        ));
        assert!(matches!(
            f.service.change_role(&f.admin, f.user.id, "overlord").await,
            Err(ModerationError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_list_users_search() {
        let f = setup().await;
        let all = f.service.list_users(&ListParams::default(), None).await.unwrap();
        assert_eq!(all.total, 4);
        let found = f.service.list_users(&ListParams::default(), Some("mod")).await.unwrap();
        assert_eq!(found.total, 2);
    }
}
