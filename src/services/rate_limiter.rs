//! Login rate limiting
//!
//! Two sliding windows guard the login endpoint: failed attempts per
//! identifier (username or email, case-insensitive) and requests per client
//! IP. State lives in process memory.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::RwLock;

/// Failed logins allowed per identifier inside [`IDENTIFIER_WINDOW_MINUTES`]
pub const MAX_FAILED_ATTEMPTS: usize = 5;
pub const IDENTIFIER_WINDOW_MINUTES: i64 = 15;

/// Login requests allowed per IP inside one minute
pub const MAX_IP_REQUESTS: usize = 10;

#[derive(Default)]
pub struct LoginRateLimiter {
    failures: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
    requests: RwLock<HashMap<IpAddr, Vec<DateTime<Utc>>>>,
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    fn identifier_window() -> Duration {
        Duration::minutes(IDENTIFIER_WINDOW_MINUTES)
    }

    fn ip_window() -> Duration {
        Duration::minutes(1)
    }

    /// True once the identifier has used up its failed attempts
    pub async fn is_identifier_limited(&self, identifier: &str) -> bool {
        let cutoff = Utc::now() - Self::identifier_window();
        let mut failures = self.failures.write().await;
        match failures.get_mut(&identifier.to_lowercase()) {
            Some(times) => {
                times.retain(|t| *t > cutoff);
                times.len() >= MAX_FAILED_ATTEMPTS
            }
            None => false,
        }
    }

    pub async fn record_failure(&self, identifier: &str) {
        self.failures
            .write()
            .await
            .entry(identifier.to_lowercase())
            .or_default()
            .push(Utc::now());
    }

    /// Forget failures after a successful login
    pub async fn clear_failures(&self, identifier: &str) {
        self.failures.write().await.remove(&identifier.to_lowercase());
    }

    /// Count this request and report whether the IP is over its budget
    pub async fn check_ip(&self, ip: IpAddr) -> bool {
        let now = Utc::now();
        let cutoff = now - Self::ip_window();
        let mut requests = self.requests.write().await;
        let times = requests.entry(ip).or_default();
        times.retain(|t| *t > cutoff);
        if times.len() >= MAX_IP_REQUESTS {
            return true;
        }
        times.push(now);
        false
    }

    /// Drop windows that no longer hold any attempts
    pub async fn cleanup(&self) {
        let now = Utc::now();
        let identifier_cutoff = now - Self::identifier_window();
        let ip_cutoff = now - Self::ip_window();

        self.failures.write().await.retain(|_, times| {
            times.retain(|t| *t > identifier_cutoff);
            !times.is_empty()
        });
        self.requests.write().await.retain(|_, times| {
            times.retain(|t| *t > ip_cutoff);
            !times.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn test_identifier_limited_after_five_failures() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..MAX_FAILED_ATTEMPTS - 1 {
            limiter.record_failure("alice").await;
        }
        assert!(!limiter.is_identifier_limited("alice").await);

        limiter.record_failure("ALICE").await;
        assert!(limiter.is_identifier_limited("Alice").await);
        assert!(!limiter.is_identifier_limited("bob").await);

        limiter.clear_failures("alice").await;
        assert!(!limiter.is_identifier_limited("alice").await);
    }

    #[tokio::test]
    async fn test_ip_budget() {
        let limiter = LoginRateLimiter::new();
        let ip = IpAddr::V4(Ipv4Addr::LOCALHOST);
        for _ in 0..MAX_IP_REQUESTS {
            assert!(!limiter.check_ip(ip).await);
        }
        assert!(limiter.check_ip(ip).await);
        assert!(!limiter.check_ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))).await);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_entries() {
        let limiter = LoginRateLimiter::new();
        limiter.record_failure("carol").await;
        limiter.cleanup().await;
        assert_eq!(limiter.failures.read().await.len(), 1);
    }
}
