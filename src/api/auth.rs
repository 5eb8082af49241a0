//! Authentication API endpoints
//!
//! - POST /api/auth/register - Create an account and sign in
//! - POST /api/auth/login - Sign in by username or email
//! - POST /api/auth/logout - Sign out
//! - GET /api/auth/me - Current user
//! - PUT /api/auth/me - Update display name and avatar

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};

use crate::api::common::ApiJson;
use crate::api::middleware::{
    extract_session_token, ApiError, AppState, AuthenticatedUser, PeerAddr,
};
use crate::config::AuthConfig;
use crate::models::{UpdateUserInput, User};
use crate::services::user::{ClientInfo, LoginInput, RegisterInput, UserServiceError};

/// Request body for user registration
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub name: Option<String>,
}

/// Request body for user login
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default, alias = "username", alias = "email")]
    pub username_or_email: String,
    #[serde(default)]
    pub password: String,
}

/// Request body for profile updates
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub avatar: Option<String>,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

/// Routes open to anonymous callers
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

/// Routes behind the auth middleware
pub fn protected_router() -> Router<AppState> {
    Router::new().route("/me", get(get_current_user).put(update_profile))
}

/// POST /api/auth/register
async fn register(
    State(state): State<AppState>,
    PeerAddr(peer): PeerAddr,
    headers: HeaderMap,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut input = RegisterInput::new(body.username, body.email, body.password);
    input.name = body.name;

    let (user, session) = state
        .user_service
        .register(input, client_info(&state, peer, &headers))
        .await?;

    Ok((
        StatusCode::CREATED,
        session_cookie(&state.auth_config, &session.id)?,
        Json(AuthResponse {
            user,
            token: session.id,
        }),
    ))
}

/// POST /api/auth/login
///
/// Each IP may try 10 times a minute; an identifier is locked for 15
/// minutes after 5 failed attempts. Requests without a known address
/// share one budget.
async fn login(
    State(state): State<AppState>,
    PeerAddr(peer): PeerAddr,
    headers: HeaderMap,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let client = client_info(&state, peer, &headers);

    let ip = client
        .ip_address
        .as_deref()
        .and_then(|s| s.parse::<IpAddr>().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    if state.rate_limiter.check_ip(ip).await {
        tracing::warn!("Login rate limit exceeded for IP {}", ip);
        return Err(ApiError::with_details(
            "RATE_LIMIT",
            "Too many login attempts, please try again later",
            serde_json::json!({"retry_after": 60}),
        ));
    }

    let identifier = body.username_or_email.trim().to_string();
    if state.rate_limiter.is_identifier_limited(&identifier).await {
        return Err(ApiError::with_details(
            "RATE_LIMIT",
            "Too many failed login attempts, please try again in 15 minutes",
            serde_json::json!({"retry_after": 900}),
        ));
    }

    let result = state
        .user_service
        .login(LoginInput::new(identifier.clone(), body.password), client)
        .await;

    let (user, session) = match result {
        Ok(ok) => ok,
        Err(e) => {
            if matches!(e, UserServiceError::InvalidCredentials) {
                state.rate_limiter.record_failure(&identifier).await;
            }
            return Err(e.into());
        }
    };
    state.rate_limiter.clear_failures(&identifier).await;
    tracing::info!("User logged in: {}", user.username);

    Ok((
        session_cookie(&state.auth_config, &session.id)?,
        Json(AuthResponse {
            user,
            token: session.id,
        }),
    ))
}

/// POST /api/auth/logout
///
/// Always clears the cookie, with or without a live session.
async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = extract_session_token(&headers, &state.auth_config.cookie_name) {
        state.user_service.logout(&token).await?;
    }

    let clear_cookie = format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        state.auth_config.cookie_name
    );
    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::SET_COOKIE, header_value(&clear_cookie)?);

    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /api/auth/me
async fn get_current_user(user: AuthenticatedUser) -> Json<User> {
    Json(user.0)
}

/// PUT /api/auth/me
async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(body): ApiJson<UpdateProfileRequest>,
) -> Result<Json<User>, ApiError> {
    let blank_to_none = |value: Option<String>| {
        value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    };
    let input = UpdateUserInput {
        name: blank_to_none(body.name),
        avatar: blank_to_none(body.avatar),
    };

    let updated = state.user_service.update_profile(user.0.id, input).await?;
    Ok(Json(updated))
}

// ============================================================================
// Helper Functions
// ============================================================================

fn session_cookie(config: &AuthConfig, token: &str) -> Result<HeaderMap, ApiError> {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        config.cookie_name,
        token,
        config.session_max_age_secs()
    );
    let mut headers = HeaderMap::new();
    headers.insert(header::SET_COOKIE, header_value(&cookie)?);
    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(value)
        .map_err(|e| ApiError::internal(anyhow::anyhow!("Invalid header value: {}", e)))
}

/// Client address and user agent for a session.
///
/// The socket peer wins unless the server sits behind a proxy that is
/// trusted to set forwarding headers.
fn client_info(state: &AppState, peer: Option<IpAddr>, headers: &HeaderMap) -> ClientInfo {
    let forwarded = state
        .trust_proxy_headers
        .then(|| extract_ip_address(headers))
        .flatten();
    ClientInfo {
        ip_address: forwarded.or_else(|| peer.map(|ip| ip.to_string())),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|h| h.to_str().ok())
            .map(String::from),
    }
}

/// Client IP from X-Forwarded-For (first hop), then X-Real-IP
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next().map(str::trim).filter(|ip| !ip.is_empty()) {
            return Some(ip.to_string());
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(|ip| ip.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(extract_ip_address(&headers).as_deref(), Some("10.0.0.2"));

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(extract_ip_address(&headers).as_deref(), Some("203.0.113.7"));
        assert!(extract_ip_address(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_session_cookie_format() {
        let headers = session_cookie(&AuthConfig::default(), "abc").unwrap();
        assert_eq!(
            headers.get(header::SET_COOKIE).unwrap(),
            "agora_session=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=604800"
        );
    }

    #[test]
    fn test_login_request_aliases() {
        let by_name: LoginRequest =
            serde_json::from_str(r#"{"username": "ada", "password": "pw"}"#).unwrap();
        assert_eq!(by_name.username_or_email, "ada");
        let by_email: LoginRequest =
            serde_json::from_str(r#"{"usernameOrEmail": "ada@example.com", "password": "pw"}"#).unwrap();
        assert_eq!(by_email.username_or_email, "ada@example.com");
    }
}
