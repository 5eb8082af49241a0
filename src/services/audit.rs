//! Audit trail for moderator and admin actions
//!
//! Recording never fails the action being audited; a storage error is only
//! logged.

use crate::db::repositories::AuditLogRepository;
use crate::models::{AuditLogWithUser, NewAuditLog};
use anyhow::Result;
use std::sync::Arc;

/// Action names written to `audit_logs.action`
pub mod actions {
    pub const CREATE_BLOG: &str = "CREATE_BLOG";
    pub const UPDATE_BLOG: &str = "UPDATE_BLOG";
    pub const DELETE_BLOG: &str = "DELETE_BLOG";
    pub const CREATE_CATEGORY: &str = "CREATE_CATEGORY";
    pub const UPDATE_CATEGORY: &str = "UPDATE_CATEGORY";
    pub const DELETE_CATEGORY: &str = "DELETE_CATEGORY";
    pub const LOCK_THREAD: &str = "LOCK_THREAD";
    pub const UNLOCK_THREAD: &str = "UNLOCK_THREAD";
    pub const UPDATE_THREAD_STATUS: &str = "UPDATE_THREAD_STATUS";
    pub const BAN_USER: &str = "BAN_USER";
    pub const UNBAN_USER: &str = "UNBAN_USER";
    pub const CHANGE_ROLE: &str = "CHANGE_ROLE";
    pub const UPLOAD_IMAGE: &str = "UPLOAD_IMAGE";
}

/// Target type names written to `audit_logs.target_type`
pub mod targets {
    pub const BLOG: &str = "Blog";
    pub const CATEGORY: &str = "Category";
    pub const USER: &str = "User";
    pub const THREAD: &str = "Thread";
    pub const IMAGE: &str = "Image";
}

pub struct AuditService {
    repo: Arc<dyn AuditLogRepository>,
}

impl AuditService {
    pub fn new(repo: Arc<dyn AuditLogRepository>) -> Self {
        Self { repo }
    }

    /// Append an entry; failures are logged at warn and swallowed
    pub async fn record(&self, entry: NewAuditLog) {
        if let Err(e) = self.repo.create(&entry).await {
            tracing::warn!(
                "Failed to record audit log {} on {} #{}: {:#}",
                entry.action,
                entry.target_type,
                entry.target_id,
                e
            );
        }
    }

    /// Latest entries for the dashboard
    pub async fn recent(&self, limit: i64) -> Result<Vec<AuditLogWithUser>> {
        self.repo.recent(limit).await
    }
}
