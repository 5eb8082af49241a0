//! Data models
//!
//! Database entities, the projections embedded in API responses, and the
//! input types handed to repositories.

mod audit_log;
mod blog;
mod category;
mod comment;
mod forum;
mod image;
mod like;
mod list;
mod newsletter;
mod session;
mod tag;
mod thread;
mod user;

pub use audit_log::{AuditLog, AuditLogWithUser, NewAuditLog};
pub use blog::{Blog, BlogDetail, BlogFilter, BlogStatus, CreateBlogInput, UpdateBlogInput};
pub use category::{Category, CategoryWithCount, CreateCategoryInput, UpdateCategoryInput};
pub use comment::{Comment, CommentNode, CommentWithAuthor, CreateCommentInput};
pub use forum::{Forum, ForumWithCount};
pub use image::Image;
pub use like::{Like, LikeTarget, LikeWithUser};
pub use list::{ListParams, PagedResult};
pub use newsletter::NewsletterSubscriber;
pub use session::Session;
pub use tag::Tag;
pub use thread::{
    CreateThreadInput, Thread, ThreadDetail, ThreadStatus, ThreadSummary, ThreadWithRefs,
    UpdateThreadInput,
};
pub use user::{BanInput, Permission, UpdateUserInput, User, UserRole, UserSummary};
