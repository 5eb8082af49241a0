//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for a specific entity.

pub mod audit_log;
pub mod blog;
pub mod category;
pub mod comment;
pub mod forum;
pub mod image;
pub mod like;
pub mod newsletter;
pub mod session;
pub mod tag;
pub mod thread;
pub mod user;

pub use audit_log::{AuditLogRepository, SqlxAuditLogRepository};
pub use blog::{BlogRepository, SqlxBlogRepository};
pub use category::{CategoryRepository, SqlxCategoryRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use forum::{ForumRepository, SqlxForumRepository};
pub use image::{ImageRepository, SqlxImageRepository};
pub use like::{LikeRepository, SqlxLikeRepository};
pub use newsletter::{NewsletterRepository, SqlxNewsletterRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use tag::{SqlxTagRepository, TagRepository};
pub use thread::{SqlxThreadRepository, ThreadRepository};
pub use user::{SqlxUserRepository, UserRepository};
