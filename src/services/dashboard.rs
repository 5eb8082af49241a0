//! Admin dashboard statistics

use crate::db::repositories::{
    BlogRepository, CommentRepository, ThreadRepository, UserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::AuditLogWithUser;
use crate::services::audit::AuditService;
use anyhow::Result;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use sysinfo::{Pid, System};

/// Window for counting new users
const NEW_USER_DAYS: i64 = 7;

/// Audit entries shown as recent activity
const RECENT_ACTIVITY_LIMIT: i64 = 10;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: i64,
    pub new_users: i64,
    pub total_blogs: i64,
    pub blog_views: i64,
    pub total_threads: i64,
    pub total_comments: i64,
    /// Threads that are locked or closed
    pub pending_moderation: i64,
    pub recent_activity: Vec<ActivityItem>,
    pub system_health: SystemHealth,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    pub description: String,
    /// RFC 3339
    pub timestamp: String,
    pub action: String,
    pub target_type: String,
    pub target_id: i64,
}

impl From<AuditLogWithUser> for ActivityItem {
    fn from(entry: AuditLogWithUser) -> Self {
        let performer = entry
            .performer_username
            .filter(|u| !u.is_empty())
            .or(entry.performer_name)
            .unwrap_or_else(|| "Unknown User".to_string());
        let log = entry.log;
        Self {
            description: format!(
                "{} {} {} #{}",
                performer,
                log.action.to_lowercase(),
                log.target_type,
                log.target_id
            ),
            timestamp: log.created_at.to_rfc3339(),
            action: log.action,
            target_type: log.target_type,
            target_id: log.target_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub database: &'static str,
    pub uptime: String,
    pub last_backup: &'static str,
}

/// Host and process resources
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub version: &'static str,
    pub os_name: String,
    pub cpu_count: usize,
    pub memory_bytes: u64,
    pub memory_formatted: String,
    pub system_total_memory: u64,
    pub system_used_memory: u64,
    pub uptime_seconds: u64,
    pub uptime_formatted: String,
}

pub struct DashboardService {
    pool: DynDatabasePool,
    users: Arc<dyn UserRepository>,
    blogs: Arc<dyn BlogRepository>,
    threads: Arc<dyn ThreadRepository>,
    comments: Arc<dyn CommentRepository>,
    audit: Arc<AuditService>,
    started: Instant,
}

impl DashboardService {
    pub fn new(
        pool: DynDatabasePool,
        users: Arc<dyn UserRepository>,
        blogs: Arc<dyn BlogRepository>,
        threads: Arc<dyn ThreadRepository>,
        comments: Arc<dyn CommentRepository>,
        audit: Arc<AuditService>,
    ) -> Self {
        Self {
            pool,
            users,
            blogs,
            threads,
            comments,
            audit,
            started: Instant::now(),
        }
    }

    pub async fn stats(&self) -> Result<DashboardStats> {
        let since = Utc::now() - Duration::days(NEW_USER_DAYS);
        let (
            total_users,
            new_users,
            total_blogs,
            blog_views,
            total_threads,
            total_comments,
            pending_moderation,
            recent,
        ) = futures::try_join!(
            self.users.count(),
            self.users.count_since(since),
            self.blogs.count(),
            self.blogs.sum_views(),
            self.threads.count(),
            self.comments.count(),
            self.threads.count_pending_moderation(),
            self.audit.recent(RECENT_ACTIVITY_LIMIT),
        )?;

        Ok(DashboardStats {
            total_users,
            new_users,
            total_blogs,
            blog_views,
            total_threads,
            total_comments,
            pending_moderation,
            recent_activity: recent.into_iter().map(ActivityItem::from).collect(),
            system_health: self.health().await,
        })
    }

    pub async fn health(&self) -> SystemHealth {
        let database = match self.pool.ping().await {
            Ok(()) => "healthy",
            Err(e) => {
                tracing::warn!("Database health check failed: {:#}", e);
                "unhealthy"
            }
        };
        SystemHealth {
            database,
            uptime: format_uptime(self.uptime_seconds()),
            // no backup job exists
            last_backup: "never",
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    pub fn system_info(&self) -> SystemInfo {
        let mut sys = System::new_all();
        sys.refresh_all();

        let pid = Pid::from_u32(std::process::id());
        let memory_bytes = sys.process(pid).map(|p| p.memory()).unwrap_or(0);
        let uptime_seconds = self.uptime_seconds();

        SystemInfo {
            version: env!("CARGO_PKG_VERSION"),
            os_name: System::name().unwrap_or_else(|| "Unknown".to_string()),
            cpu_count: sys.cpus().len(),
            memory_formatted: format_bytes(memory_bytes),
            memory_bytes,
            system_total_memory: sys.total_memory(),
            system_used_memory: sys.used_memory(),
            uptime_formatted: format_uptime(uptime_seconds),
            uptime_seconds,
        }
    }
}

/// "3d 2h 5m", "2h 15m", "7m" or "42s"
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m", minutes)
    } else {
        format!("{}s", seconds)
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
