//! API layer - HTTP handlers and routing
//!
//! All JSON endpoints live under `/api`:
//! - Auth endpoints (`/api/auth`)
//! - Public blog, category, forum, thread and like reads
//! - Session-only writes: threads, comments, likes
//! - Admin endpoints (`/api/admin`, MODERATOR+)
//! - Newsletter endpoints
//!
//! Everything else is served from the public directory behind the page guard.

pub mod admin;
pub mod auth;
pub mod blogs;
pub mod categories;
pub mod comments;
pub mod common;
pub mod forums;
pub mod likes;
pub mod middleware;
pub mod newsletter;
pub mod pages;
pub mod responses;
pub mod threads;
pub mod upload;


use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::config::Config;

pub use middleware::{ApiError, AppState, RequestStats};

/// Build the router mounted at `/api`
pub fn build_api_router(state: AppState, config: &Config) -> Router<AppState> {
    // Admin routes (need MODERATOR or above)
    let admin_routes = Router::new()
        .merge(admin::router())
        .merge(blogs::admin_router())
        .merge(categories::admin_router())
        .merge(threads::admin_router())
        .merge(upload::admin_router(config.upload.max_file_size))
        .route_layer(axum_middleware::from_fn(middleware::require_moderator))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        // Added after the layers so other methods on the upload path stay public
        .merge(upload::public_router());

    // Protected routes (need a session)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .merge(forums::protected_router())
        .merge(threads::protected_router())
        .merge(comments::protected_router())
        .merge(likes::protected_router())
        .merge(newsletter::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes; the session user is attached when there is one
    let public_routes = Router::new()
        .nest("/auth", auth::public_router())
        .merge(blogs::public_router())
        .merge(categories::public_router())
        .merge(forums::public_router())
        .merge(threads::public_router())
        .merge(likes::public_router())
        .merge(newsletter::public_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ));

    public_routes
        .merge(protected_routes)
        .nest("/admin", admin_routes)
        .fallback(api_not_found)
}

async fn api_not_found() -> ApiError {
    ApiError::not_found("Not found")
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .server
        .all_trusted_origins()
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid trusted origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400))
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, config: &Config) -> Router {
    Router::new()
        .nest("/api", build_api_router(state.clone(), config))
        .nest_service("/uploads", ServeDir::new(&config.upload.path))
        .fallback_service(ServeDir::new(&config.server.public_dir))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            pages::page_guard,
        ))
        .layer(
            // Outermost first: one user cache per request, shared by page guard and API auth
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(middleware::attach_request_cache))
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors_layer(config))
                .layer(axum_middleware::from_fn_with_state(
                    state.clone(),
                    middleware::request_stats_middleware,
                )),
        )
        .with_state(state)
}
