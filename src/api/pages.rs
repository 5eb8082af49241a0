//! Page guard for the site's HTML routes
//!
//! Runs in front of the static file fallback. Protected pages redirect
//! anonymous, banned or under-privileged viewers before any file is served.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;

use crate::api::middleware::{extract_session_token, request_cache, AppState};
use crate::models::{User, UserRole};
use crate::services::AuthError;

const SESSION_PAGES: [&str; 2] = ["/profile", "/settings"];
const ADMIN_PAGE: &str = "/admin";
const AUTH_PAGES: [&str; 2] = ["/login", "/signup"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageDecision {
    Continue,
    Redirect(String),
}

/// `/admin` matches `/admin` and `/admin/...`, not `/administrator`
fn under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .map(|rest| rest.is_empty() || rest.starts_with('/'))
        .unwrap_or(false)
}

fn login_redirect(path: &str) -> PageDecision {
    PageDecision::Redirect(format!("/login?returnUrl={}", urlencoding::encode(path)))
}

/// The decoded `returnUrl` query parameter, if any
fn return_url(query: Option<&str>) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key != "returnUrl" || value.is_empty() {
            return None;
        }
        urlencoding::decode(&value.replace('+', " "))
            .ok()
            .map(|v| v.into_owned())
    })
}

/// Relative to this site: `/path`, never `//host` or an absolute URL
fn is_local_path(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.starts_with("/\\")
}

/// Where a request for `path` should go given the viewer
pub fn decide(path: &str, query: Option<&str>, viewer: Option<&User>) -> PageDecision {
    let admin = under(path, ADMIN_PAGE);
    let guarded = admin || SESSION_PAGES.iter().any(|p| under(path, p));

    if guarded {
        let Some(user) = viewer else {
            return login_redirect(path);
        };
        if user.is_banned_at(Utc::now()) {
            return PageDecision::Redirect("/?banned=true".to_string());
        }
        if admin && !user.has_role(UserRole::Moderator) {
            return PageDecision::Redirect("/?unauthorized=true".to_string());
        }
        return PageDecision::Continue;
    }

    if AUTH_PAGES.contains(&path) {
        if let Some(user) = viewer {
            if !user.has_role(UserRole::Moderator) {
                return PageDecision::Redirect("/".to_string());
            }
            let target = match return_url(query) {
                None => ADMIN_PAGE.to_string(),
                Some(url) if is_local_path(&url) => url,
                Some(_) => "/".to_string(),
            };
            return PageDecision::Redirect(target);
        }
    }

    PageDecision::Continue
}

fn needs_viewer(path: &str) -> bool {
    under(path, ADMIN_PAGE)
        || SESSION_PAGES.iter().any(|p| under(path, p))
        || AUTH_PAGES.contains(&path)
}

/// Page guard middleware
pub async fn page_guard(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if !needs_viewer(&path) {
        return next.run(request).await;
    }

    let token = extract_session_token(request.headers(), &state.auth_config.cookie_name);
    let cache = request_cache(&mut request);
    let viewer = match state.authorization.session_user(token.as_deref(), &cache).await {
        Ok(user) => Some(user),
        Err(AuthError::InternalError(e)) => {
            tracing::warn!("Page guard could not resolve session: {:#}", e);
            None
        }
        Err(_) => None,
    };

    match decide(&path, request.uri().query(), viewer.as_ref()) {
        PageDecision::Continue => next.run(request).await,
        PageDecision::Redirect(to) => {
            tracing::debug!("Redirecting {} to {}", path, to);
            Redirect::temporary(&to).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn viewer(role: UserRole) -> User {
        let mut user = User::new(
            "viewer".to_string(),
            "viewer@example.com".to_string(),
            "hash".to_string(),
            role,
        );
        user.id = 7;
        user
    }

    fn redirect(to: &str) -> PageDecision {
        PageDecision::Redirect(to.to_string())
    }

    #[test]
    fn test_anonymous_profile_goes_to_login() {
        assert_eq!(
            decide("/profile/edit", None, None),
            redirect("/login?returnUrl=%2Fprofile%2Fedit")
        );
        assert_eq!(decide("/settings", None, None), redirect("/login?returnUrl=%2Fsettings"));
    }

    #[test]
    fn test_admin_requires_moderator() {
        let user = viewer(UserRole::User);
        assert_eq!(decide("/admin", None, Some(&user)), redirect("/?unauthorized=true"));

        let moderator = viewer(UserRole::Moderator);
        assert_eq!(decide("/admin/blogs", None, Some(&moderator)), PageDecision::Continue);
        assert_eq!(decide("/admin", None, None), redirect("/login?returnUrl=%2Fadmin"));
    }

    #[test]
    fn test_banned_viewer() {
        let mut user = viewer(UserRole::Admin);
        user.is_banned = true;
        assert_eq!(decide("/settings", None, Some(&user)), redirect("/?banned=true"));
        assert_eq!(decide("/admin", None, Some(&user)), redirect("/?banned=true"));

        user.banned_until = Some(Utc::now() - Duration::hours(1));
        assert_eq!(decide("/settings", None, Some(&user)), PageDecision::Continue);
    }

    #[test]
    fn test_login_page_with_session() {
        let user = viewer(UserRole::User);
        assert_eq!(decide("/login", None, Some(&user)), redirect("/"));
        assert_eq!(decide("/login", None, None), PageDecision::Continue);

        let admin = viewer(UserRole::Admin);
        assert_eq!(decide("/signup", None, Some(&admin)), redirect("/admin"));
        assert_eq!(
            decide("/login", Some("returnUrl=%2Fadmin%2Fusers"), Some(&admin)),
            redirect("/admin/users")
        );
        assert_eq!(
            decide("/login", Some("returnUrl=%2F%2Fevil.example"), Some(&admin)),
            redirect("/")
        );
        assert_eq!(
            decide("/login", Some("returnUrl=https%3A%2F%2Fevil.example"), Some(&admin)),
            redirect("/")
        );
    }

    #[test]
    fn test_prefix_is_segment_based() {
        assert_eq!(decide("/administrator", None, None), PageDecision::Continue);
        assert_eq!(decide("/profiles", None, None), PageDecision::Continue);
        assert_eq!(decide("/login/help", None, Some(&viewer(UserRole::User))), PageDecision::Continue);
    }

    proptest! {
        #[test]
        fn public_pages_always_continue(path in "/(blog|forums|about)(/[a-z0-9-]{0,12}){0,3}") {
            prop_assert_eq!(decide(&path, None, None), PageDecision::Continue);
        }

        #[test]
        fn login_redirect_round_trips(rest in "(/[a-z0-9 ]{1,10}){0,3}") {
            let path = format!("/profile{}", rest);
            let PageDecision::Redirect(to) = decide(&path, None, None) else {
                return Err(TestCaseError::fail("expected a redirect"));
            };
            let query = to.strip_prefix("/login?").unwrap();
            prop_assert_eq!(return_url(Some(query)), Some(path));
        }

        #[test]
        fn moderators_never_leave_the_site(url in "\\PC{0,30}") {
            let query = format!("returnUrl={}", urlencoding::encode(&url));
            let moderator = viewer(UserRole::Moderator);
            let PageDecision::Redirect(to) = decide("/login", Some(&query), Some(&moderator)) else {
                return Err(TestCaseError::fail("expected a redirect"));
            };
            prop_assert!(to.starts_with('/'));
            prop_assert!(!to.starts_with("//"));
        }
    }
}
