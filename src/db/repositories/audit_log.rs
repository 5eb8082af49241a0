//! Audit log repository
//!
//! Append-only; rows are never updated or deleted.

use crate::db::{on_backend, DynDatabasePool, LastInsertId};
use crate::models::{AuditLog, AuditLogWithUser, NewAuditLog};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    /// Append an entry
    async fn create(&self, entry: &NewAuditLog) -> Result<AuditLog>;

    /// Most recent entries with the performer's username and name
    async fn recent(&self, limit: i64) -> Result<Vec<AuditLogWithUser>>;
}

pub struct SqlxAuditLogRepository {
    pool: DynDatabasePool,
}

impl SqlxAuditLogRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AuditLogRepository> {
        Arc::new(Self::new(pool))
    }
}

#[derive(sqlx::FromRow)]
struct AuditLogRow {
    id: i64,
    action: String,
    target_type: String,
    target_id: i64,
    performed_by: i64,
    details: Option<String>,
    ip_address: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AuditLogUserRow {
    #[sqlx(flatten)]
    log: AuditLogRow,
    performer_username: Option<String>,
    performer_name: Option<String>,
}

impl From<AuditLogRow> for AuditLog {
    fn from(row: AuditLogRow) -> Self {
        AuditLog {
            id: row.id,
            action: row.action,
            target_type: row.target_type,
            target_id: row.target_id,
            performed_by: row.performed_by,
            details: row.details,
            ip_address: row.ip_address,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl AuditLogRepository for SqlxAuditLogRepository {
    async fn create(&self, entry: &NewAuditLog) -> Result<AuditLog> {
        let now = Utc::now();
        let id = on_backend!(self.pool, |conn| {
            sqlx::query(
                r#"
                INSERT INTO audit_logs (action, target_type, target_id, performed_by, details, ip_address, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&entry.action)
            .bind(&entry.target_type)
            .bind(entry.target_id)
            .bind(entry.performed_by)
            .bind(&entry.details)
            .bind(&entry.ip_address)
            .bind(now)
            .execute(conn)
            .await
            .context("Failed to create audit log")?
            .last_id()
        });

        Ok(AuditLog {
            id,
            action: entry.action.clone(),
            target_type: entry.target_type.clone(),
            target_id: entry.target_id,
            performed_by: entry.performed_by,
            details: entry.details.clone(),
            ip_address: entry.ip_address.clone(),
            created_at: now,
        })
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AuditLogWithUser>> {
        let rows: Vec<AuditLogUserRow> = on_backend!(self.pool, |conn| {
            sqlx::query_as(
                r#"
                SELECT a.id, a.action, a.target_type, a.target_id, a.performed_by, a.details,
                       a.ip_address, a.created_at,
                       u.username AS performer_username, u.name AS performer_name
                FROM audit_logs a
                LEFT JOIN users u ON u.id = a.performed_by
                ORDER BY a.created_at DESC, a.id DESC
                LIMIT ?
                "#,
            )
            .bind(limit)
            .fetch_all(conn)
            .await
            .context("Failed to list audit logs")?
        });

        Ok(rows
            .into_iter()
            .map(|row| AuditLogWithUser {
                log: row.log.into(),
                performer_username: row.performer_username,
                performer_name: row.performer_name,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{User, UserRole};

    #[tokio::test]
    async fn test_recent_joins_performer() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let admin = SqlxUserRepository::new(pool.clone())
            .create(&User::new("root".into(), "root@example.com".into(), "h".into(), UserRole::Admin))
            .await
            .unwrap();
        let repo = SqlxAuditLogRepository::new(pool);

        for i in 1..=3 {
            repo.create(&NewAuditLog::new("CREATE_BLOG", "Blog", i, admin.id))
                .await
                .unwrap();
        }
        // performer that no longer exists
        repo.create(&NewAuditLog::new("DELETE_BLOG", "Blog", 9, 999).with_details("gone"))
            .await
            .unwrap();

        let recent = repo.recent(3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].log.action, "DELETE_BLOG");
        assert_eq!(recent[0].log.details.as_deref(), Some("gone"));
        assert!(recent[0].performer_username.is_none());
        assert_eq!(recent[1].performer_username.as_deref(), Some("root"));
        assert_eq!(recent[1].log.target_id, 3);
    }
}
