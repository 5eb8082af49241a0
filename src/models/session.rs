//! Session model

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A login session identified by an opaque token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session token (uuid v4), also the cookie value
    pub id: String,
    pub user_id: i64,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Last time the expiry was extended
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session that lives for `lifetime`
    pub fn new(id: String, user_id: i64, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            expires_at: now + lifetime,
            ip_address: None,
            user_agent: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// The expiry slides forward once the session has gone `update_age`
    /// without a refresh
    pub fn needs_refresh(&self, update_age: Duration, now: DateTime<Utc>) -> bool {
        now - self.updated_at >= update_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_expiry() {
        let session = Session::new("token".into(), 1, Duration::days(7));
        assert!(!session.is_expired());
        assert!(session.expires_at > Utc::now() + Duration::days(6));
    }

    #[test]
    fn test_needs_refresh() {
        let mut session = Session::new("token".into(), 1, Duration::days(7));
        let now = Utc::now();
        assert!(!session.needs_refresh(Duration::hours(24), now));

        session.updated_at = now - Duration::hours(25);
        assert!(session.needs_refresh(Duration::hours(24), now));
    }

    #[test]
    fn test_expired_session() {
        let mut session = Session::new("token".into(), 1, Duration::days(7));
        session.expires_at = Utc::now() - Duration::seconds(1);
        assert!(session.is_expired());
    }
}
