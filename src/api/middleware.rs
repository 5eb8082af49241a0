//! API middleware
//!
//! Contains:
//! - Shared application state
//! - The JSON error envelope and the mapping from service errors
//! - Request-scoped user cache, session authentication and role gates
//! - Request statistics

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        ConnectInfo, FromRequestParts, Request, State,
    },
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::cache::Cache;
use crate::config::{AuthConfig, Config};
use crate::db::repositories::{
    SqlxAuditLogRepository, SqlxBlogRepository, SqlxCategoryRepository, SqlxCommentRepository,
    SqlxForumRepository, SqlxImageRepository, SqlxLikeRepository, SqlxNewsletterRepository,
    SqlxSessionRepository, SqlxTagRepository, SqlxThreadRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::{User, UserRole};
use crate::services::authorization::require_role;
use crate::services::{
    AuditService, AuthError, AuthorizationService, BlogService, BlogServiceError, CategoryService,
    CategoryServiceError, CommentService, CommentServiceError, DashboardService, ForumService,
    ForumServiceError, ImageService, ImageServiceError, LikeService, LikeServiceError,
    LoginRateLimiter, ModerationError, ModerationService, NewsletterError, NewsletterService,
    RequestUserCache, UserService, UserServiceError,
};

// ============================================================================
// Request Statistics
// ============================================================================

/// Lightweight request statistics using atomic operations (no locks)
pub struct RequestStats {
    total_requests: AtomicU64,
    /// Microseconds, summed for the average
    total_response_time_us: AtomicU64,
}

impl RequestStats {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_response_time_us: AtomicU64::new(0),
        }
    }

    pub fn record(&self, duration_us: u64) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_response_time_us.fetch_add(duration_us, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Average response time in microseconds
    pub fn avg_response_time_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.total_response_time_us.load(Ordering::Relaxed) as f64 / total as f64
    }
}

impl Default for RequestStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub auth_config: Arc<AuthConfig>,
    pub user_service: Arc<UserService>,
    pub authorization: Arc<AuthorizationService>,
    pub rate_limiter: Arc<LoginRateLimiter>,
    pub blog_service: Arc<BlogService>,
    pub category_service: Arc<CategoryService>,
    pub forum_service: Arc<ForumService>,
    pub comment_service: Arc<CommentService>,
    pub like_service: Arc<LikeService>,
    pub moderation_service: Arc<ModerationService>,
    pub dashboard_service: Arc<DashboardService>,
    pub image_service: Arc<ImageService>,
    pub newsletter_service: Arc<NewsletterService>,
    pub request_stats: Arc<RequestStats>,
    /// Read the client address from proxy headers instead of the socket
    pub trust_proxy_headers: bool,
}

impl AppState {
    /// Wire repositories and services over one pool
    pub fn new(pool: DynDatabasePool, config: &Config, cache: Arc<Cache>) -> Self {
        let users = SqlxUserRepository::boxed(pool.clone());
        let sessions = SqlxSessionRepository::boxed(pool.clone());
        let threads = SqlxThreadRepository::boxed(pool.clone());
        let comments = SqlxCommentRepository::boxed(pool.clone());
        let categories = SqlxCategoryRepository::boxed(pool.clone());
        let images = SqlxImageRepository::boxed(pool.clone());
        let blogs = SqlxBlogRepository::boxed(pool.clone());
        let audit = Arc::new(AuditService::new(SqlxAuditLogRepository::boxed(pool.clone())));

        let user_service = Arc::new(UserService::new(users.clone(), sessions.clone(), &config.auth));
        let authorization = Arc::new(AuthorizationService::new(users.clone(), user_service.clone()));

        Self {
            auth_config: Arc::new(config.auth.clone()),
            rate_limiter: Arc::new(LoginRateLimiter::new()),
            blog_service: Arc::new(BlogService::new(
                blogs.clone(),
                SqlxTagRepository::boxed(pool.clone()),
                categories.clone(),
                images.clone(),
                users.clone(),
                audit.clone(),
            )),
            category_service: Arc::new(CategoryService::new(categories, cache.clone(), audit.clone())),
            forum_service: Arc::new(ForumService::new(
                SqlxForumRepository::boxed(pool.clone()),
                threads.clone(),
                comments.clone(),
                users.clone(),
                cache,
                audit.clone(),
            )),
            comment_service: Arc::new(CommentService::new(comments.clone(), threads.clone())),
            like_service: Arc::new(LikeService::new(
                SqlxLikeRepository::boxed(pool.clone()),
                threads.clone(),
                comments.clone(),
            )),
            moderation_service: Arc::new(ModerationService::new(users.clone(), sessions, audit.clone())),
            dashboard_service: Arc::new(DashboardService::new(
                pool.clone(),
                users,
                blogs,
                threads,
                comments,
                audit.clone(),
            )),
            image_service: Arc::new(ImageService::new(images, Arc::new(config.upload.clone()), audit)),
            newsletter_service: Arc::new(NewsletterService::new(SqlxNewsletterRepository::boxed(
                pool.clone(),
            ))),
            request_stats: Arc::new(RequestStats::new()),
            trust_proxy_headers: config.server.trust_proxy_headers,
            user_service,
            authorization,
            pool,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn method_not_allowed() -> Self {
        Self::new("METHOD_NOT_ALLOWED", "Method not allowed")
    }

    /// Log the cause and hide it from the client
    pub fn internal(err: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:#}", err);
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    fn banned(reason: Option<String>, banned_until: Option<chrono::DateTime<chrono::Utc>>) -> Self {
        Self::with_details(
            "USER_BANNED",
            "Account banned",
            json!({ "reason": reason, "bannedUntil": banned_until }),
        )
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" | "USER_BANNED" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "METHOD_NOT_ALLOWED" => StatusCode::METHOD_NOT_ALLOWED,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation_error(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation_error(rejection.body_text())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::Unauthenticated | AuthError::UserNotFound => Self::unauthorized(message),
            AuthError::Banned { reason, banned_until } => Self::banned(reason, banned_until),
            AuthError::InsufficientRole { required, current } => Self::with_details(
                "FORBIDDEN",
                message,
                json!({ "required": required, "current": current }),
            ),
            AuthError::MissingPermission { required } => {
                Self::with_details("FORBIDDEN", message, json!({ "required": required }))
            }
            AuthError::NotOwner(_) => Self::forbidden(message),
            AuthError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::InvalidCredentials => Self::unauthorized(err.to_string()),
            UserServiceError::Banned { reason, banned_until } => Self::banned(reason, banned_until),
            UserServiceError::ValidationError(msg) => Self::validation_error(msg),
            UserServiceError::UserExists(msg) => Self::conflict(msg),
            UserServiceError::NotFound => Self::not_found(err.to_string()),
            UserServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<BlogServiceError> for ApiError {
    fn from(err: BlogServiceError) -> Self {
        match err {
            BlogServiceError::NotFound(msg) => Self::not_found(msg),
            BlogServiceError::ValidationError(msg) => Self::validation_error(msg),
            BlogServiceError::Forbidden => Self::forbidden(err.to_string()),
            BlogServiceError::Conflict(msg) => Self::conflict(msg),
            BlogServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<CategoryServiceError> for ApiError {
    fn from(err: CategoryServiceError) -> Self {
        let message = err.to_string();
        match err {
            CategoryServiceError::DuplicateName(_) | CategoryServiceError::DuplicateSlug(_) => {
                Self::conflict(message)
            }
            CategoryServiceError::NotFound(_) => Self::not_found(message),
            CategoryServiceError::InUse(_) => Self::validation_error(message),
            CategoryServiceError::ValidationError(msg) => Self::validation_error(msg),
            CategoryServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<ForumServiceError> for ApiError {
    fn from(err: ForumServiceError) -> Self {
        match err {
            ForumServiceError::NotFound(msg) => Self::not_found(msg),
            ForumServiceError::ValidationError(msg) => Self::validation_error(msg),
            ForumServiceError::Conflict => Self::conflict(err.to_string()),
            ForumServiceError::Auth(e) => e.into(),
            ForumServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<CommentServiceError> for ApiError {
    fn from(err: CommentServiceError) -> Self {
        match err {
            CommentServiceError::NotFound(msg) => Self::not_found(msg),
            CommentServiceError::ValidationError(msg) => Self::validation_error(msg),
            CommentServiceError::ThreadLocked => Self::forbidden(err.to_string()),
            CommentServiceError::Auth(e) => e.into(),
            CommentServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<LikeServiceError> for ApiError {
    fn from(err: LikeServiceError) -> Self {
        match err {
            LikeServiceError::ValidationError(msg) => Self::validation_error(msg),
            LikeServiceError::NotFound(msg) => Self::not_found(msg),
            LikeServiceError::Conflict => Self::conflict(err.to_string()),
            LikeServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<ModerationError> for ApiError {
    fn from(err: ModerationError) -> Self {
        match err {
            ModerationError::NotFound => Self::not_found(err.to_string()),
            ModerationError::ValidationError(msg) => Self::validation_error(msg),
            ModerationError::Forbidden(msg) => Self::forbidden(msg),
            ModerationError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<ImageServiceError> for ApiError {
    fn from(err: ImageServiceError) -> Self {
        match err {
            ImageServiceError::ValidationError(msg) => Self::validation_error(msg),
            ImageServiceError::InternalError(e) => Self::internal(e),
        }
    }
}

impl From<NewsletterError> for ApiError {
    fn from(err: NewsletterError) -> Self {
        match err {
            NewsletterError::ValidationError(msg) => Self::validation_error(msg),
            NewsletterError::AlreadySubscribed => Self::conflict(err.to_string()),
            NewsletterError::InternalError(e) => Self::internal(e),
        }
    }
}

// ============================================================================
// Authentication
// ============================================================================

/// Verified, unbanned user of the current request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// The verified user, if the request carried a valid session
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

/// Socket address of the connected client, when the server records it
#[derive(Debug, Clone, Copy)]
pub struct PeerAddr(pub Option<IpAddr>);

/// Session token from `Authorization: Bearer`, falling back to the session cookie
pub fn extract_session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
    {
        return Some(token.trim().to_string());
    }

    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').find_map(|cookie| {
        let (name, value) = cookie.trim().split_once('=')?;
        (name == cookie_name && !value.is_empty()).then(|| value.to_string())
    })
}

/// The request's user cache, created on first use
pub fn request_cache(request: &mut Request) -> RequestUserCache {
    if let Some(cache) = request.extensions().get::<RequestUserCache>() {
        return cache.clone();
    }
    let cache = RequestUserCache::new();
    request.extensions_mut().insert(cache.clone());
    cache
}

/// Give every request its own user cache, dropped with the request
pub async fn attach_request_cache(mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(RequestUserCache::new());
    next.run(request).await
}

async fn resolve_user(state: &AppState, request: &mut Request) -> Result<User, AuthError> {
    let token = extract_session_token(request.headers(), &state.auth_config.cookie_name);
    let cache = request_cache(request);
    state
        .authorization
        .require_verified_user(token.as_deref(), &cache)
        .await
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = resolve_user(&state, &mut request).await?;
    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Attach the user when a valid, unbanned session exists; never rejects
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match resolve_user(&state, &mut request).await {
        Ok(user) => {
            request.extensions_mut().insert(AuthenticatedUser(user));
        }
        Err(AuthError::InternalError(e)) => {
            tracing::warn!("Optional authentication failed: {:#}", e);
        }
        Err(_) => {}
    }
    next.run(request).await
}

fn require_request_role(request: &Request, role: UserRole) -> Result<(), ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    require_role(&user.0, role)?;
    Ok(())
}

/// MODERATOR or above; runs after [`require_auth`]
pub async fn require_moderator(request: Request, next: Next) -> Result<Response, ApiError> {
    require_request_role(&request, UserRole::Moderator)?;
    Ok(next.run(request).await)
}

/// Records request count and response time
pub async fn request_stats_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    state.request_stats.record(start.elapsed().as_micros() as u64);
    response
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts.extensions.get::<AuthenticatedUser>().map(|u| u.0.clone()),
        ))
    }
}

impl<S> FromRequestParts<S> for PeerAddr
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(PeerAddr(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Permission;
    use axum::http::HeaderValue;
    use proptest::prelude::*;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_extract_session_token_from_bearer() {
        let h = headers(&[(header::AUTHORIZATION, "Bearer test-token-123")]);
        assert_eq!(extract_session_token(&h, "agora_session"), Some("test-token-123".to_string()));
    }

    #[test]
    fn test_extract_session_token_from_cookie() {
        let h = headers(&[(header::COOKIE, "theme=dark; agora_session=tok-456; other=1")]);
        assert_eq!(extract_session_token(&h, "agora_session"), Some("tok-456".to_string()));
        assert_eq!(extract_session_token(&h, "session"), None);
    }

    #[test]
    fn test_extract_session_token_bearer_priority() {
        let h = headers(&[
            (header::AUTHORIZATION, "Bearer bearer-token"),
            (header::COOKIE, "agora_session=cookie-token"),
        ]);
        assert_eq!(extract_session_token(&h, "agora_session"), Some("bearer-token".to_string()));
    }

    #[test]
    fn test_extract_session_token_none() {
        assert!(extract_session_token(&HeaderMap::new(), "agora_session").is_none());
        let basic = headers(&[(header::AUTHORIZATION, "Basic abc")]);
        assert!(extract_session_token(&basic, "agora_session").is_none());
        let empty = headers(&[(header::COOKIE, "agora_session=")]);
        assert!(extract_session_token(&empty, "agora_session").is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::new("USER_BANNED", "x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::new("RATE_LIMIT", "x").status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::method_not_allowed().status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(ApiError::new("SOMETHING", "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_errors_hide_the_cause() {
        let err = ApiError::from(anyhow::anyhow!("db password is hunter2"));
        assert_eq!(err.error.message, "Internal server error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_auth_error_details() {
        let err = ApiError::from(AuthError::InsufficientRole {
            required: UserRole::Moderator,
            current: UserRole::User,
        });
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.error.message, "Insufficient permissions");
        assert_eq!(err.error.details, Some(json!({"required": "MODERATOR", "current": "USER"})));

        let err = ApiError::from(AuthError::MissingPermission {
            required: Permission::UserBan,
        });
        assert_eq!(err.error.details, Some(json!({"required": "USER_BAN"})));

        let err = ApiError::from(AuthError::Banned {
            reason: Some("spam".into()),
            banned_until: None,
        });
        assert_eq!(err.error.code, "USER_BANNED");
        assert_eq!(err.error.details, Some(json!({"reason": "spam", "bannedUntil": null})));

        let err = ApiError::from(AuthError::NotOwner("comment"));
        assert_eq!(err.error.message, "You do not have permission to modify this comment");
    }

    #[test]
    fn test_service_error_mapping() {
        assert_eq!(
            ApiError::from(CategoryServiceError::InUse(2)).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(CategoryServiceError::DuplicateSlug("x".into())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError::from(CommentServiceError::ThreadLocked).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::from(NewsletterError::AlreadySubscribed).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(ForumServiceError::Auth(AuthError::NotOwner("thread"))).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ApiError::from(BlogServiceError::Forbidden).error.message, "Forbidden");
    }

    #[test]
    fn test_request_stats() {
        let stats = RequestStats::new();
        assert_eq!(stats.avg_response_time_us(), 0.0);
        stats.record(100);
        stats.record(300);
        assert_eq!(stats.total_requests(), 2);
        assert_eq!(stats.avg_response_time_us(), 200.0);
    }

    proptest! {
        #[test]
        fn cookie_token_is_found_among_others(token in "[A-Za-z0-9-]{1,40}", other in "[a-z]{1,8}") {
            prop_assume!(other != "agora_session");
            let h = headers(&[(header::COOKIE, &format!("{}=x; agora_session={}", other, token))]);
            prop_assert_eq!(extract_session_token(&h, "agora_session"), Some(token));
        }
    }
}
