//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They are
//! responsible for:
//! - Enforcing business rules and ownership
//! - Coordinating repositories, cache and audit log
//! - Turning storage failures into typed errors

pub mod audit;
pub mod authorization;
pub mod blog;
pub mod category;
pub mod comment;
pub mod dashboard;
pub mod forum;
pub mod image;
pub mod like;
pub mod moderation;
pub mod newsletter;
pub mod password;
pub mod rate_limiter;
pub mod slug;
pub mod user;

pub use audit::AuditService;
pub use authorization::{AuthError, AuthorizationService, RequestUserCache};
pub use blog::{BlogPatch, BlogService, BlogServiceError, NewBlog};
pub use category::{CategoryService, CategoryServiceError, NewCategory};
pub use comment::{CommentService, CommentServiceError};
pub use dashboard::{DashboardService, DashboardStats, SystemInfo};
pub use forum::{ForumService, ForumServiceError, ThreadModeration};
pub use image::{ImageService, ImageServiceError};
pub use like::{LikeService, LikeServiceError, LikeSummary, LikeToggle};
pub use moderation::{ModerationError, ModerationService};
pub use newsletter::{NewsletterError, NewsletterService};
pub use password::{hash_password, verify_password};
pub use rate_limiter::LoginRateLimiter;
pub use user::{ClientInfo, LoginInput, RegisterInput, UserService, UserServiceError};
