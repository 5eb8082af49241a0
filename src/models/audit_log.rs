//! Audit log model
//!
//! An append-only record of administrative actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: i64,
    /// Uppercase snake case, e.g. `CREATE_BLOG`
    pub action: String,
    /// Entity name, e.g. `Blog`
    pub target_type: String,
    pub target_id: i64,
    pub performed_by: i64,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Audit row joined with the performer's names
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogWithUser {
    #[serde(flatten)]
    pub log: AuditLog,
    pub performer_username: Option<String>,
    pub performer_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub action: String,
    pub target_type: String,
    pub target_id: i64,
    pub performed_by: i64,
    pub details: Option<String>,
    pub ip_address: Option<String>,
}

impl NewAuditLog {
    pub fn new(
        action: impl Into<String>,
        target_type: impl Into<String>,
        target_id: i64,
        performed_by: i64,
    ) -> Self {
        Self {
            action: action.into(),
            target_type: target_type.into(),
            target_id,
            performed_by,
            details: None,
            ip_address: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}
