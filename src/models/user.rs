//! User model
//!
//! Users carry a role from the hierarchy USER < MODERATOR < ADMIN and an
//! optional, possibly time-limited ban.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
    pub avatar: Option<String>,
    /// Password hash (argon2)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: UserRole,
    pub is_banned: bool,
    pub banned_at: Option<DateTime<Utc>>,
    /// Id of the moderator who issued the ban
    pub banned_by: Option<i64>,
    pub ban_reason: Option<String>,
    /// End of a temporary ban; `None` means permanent
    pub banned_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new, unsaved user.
    ///
    /// The password must already be hashed with `services::password::hash_password()`.
    pub fn new(username: String, email: String, password_hash: String, role: UserRole) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            username,
            email,
            email_verified: false,
            name: None,
            avatar: None,
            password_hash,
            role,
            is_banned: false,
            banned_at: None,
            banned_by: None,
            ban_reason: None,
            banned_until: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the user's role is at least `required` in the hierarchy
    pub fn has_role(&self, required: UserRole) -> bool {
        self.role.level() >= required.level()
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    /// Moderators and admins may open the admin panel
    pub fn can_access_admin_panel(&self) -> bool {
        self.has_permission(Permission::AdminPanelAccess)
    }

    /// Thread edits are open to the author and to moderators
    pub fn can_modify_thread(&self, author_id: i64) -> bool {
        self.id == author_id || self.has_role(UserRole::Moderator)
    }

    pub fn can_modify_comment(&self, author_id: i64) -> bool {
        self.id == author_id || self.has_role(UserRole::Moderator)
    }

    /// Blog edits are open to the author and to admins only
    pub fn can_modify_blog(&self, author_id: Option<i64>) -> bool {
        self.role == UserRole::Admin || author_id == Some(self.id)
    }

    /// A temporary ban whose end has passed
    pub fn ban_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_banned && self.banned_until.map(|until| until <= now).unwrap_or(false)
    }

    /// Banned and the ban still applies at `now`
    pub fn is_banned_at(&self, now: DateTime<Utc>) -> bool {
        self.is_banned && !self.ban_expired(now)
    }

    /// Username, falling back to the display name
    pub fn display_name(&self) -> &str {
        if !self.username.is_empty() {
            &self.username
        } else {
            self.name.as_deref().unwrap_or("Unknown User")
        }
    }

    /// Public projection embedded in threads, comments, blogs and likes
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// The public face of a user, as embedded in other entities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

/// User role, ordered USER < MODERATOR < ADMIN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    #[default]
    User,
    Moderator,
    Admin,
}

impl UserRole {
    /// Position in the hierarchy
    pub fn level(&self) -> u8 {
        match self {
            UserRole::User => 0,
            UserRole::Moderator => 1,
            UserRole::Admin => 2,
        }
    }

    /// Permissions granted to this role
    pub fn permissions(&self) -> &'static [Permission] {
        match self {
            UserRole::Admin => Permission::ALL,
            UserRole::Moderator => &[
                Permission::BlogCreate,
                Permission::ThreadModerate,
                Permission::UserBan,
                Permission::AdminPanelAccess,
            ],
            UserRole::User => &[],
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRole::User => write!(f, "USER"),
            UserRole::Moderator => write!(f, "MODERATOR"),
            UserRole::Admin => write!(f, "ADMIN"),
        }
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "USER" => Ok(UserRole::User),
            "MODERATOR" => Ok(UserRole::Moderator),
            "ADMIN" => Ok(UserRole::Admin),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Fine-grained capabilities derived from a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    BlogCreate,
    BlogEditAny,
    BlogDelete,
    ThreadModerate,
    UserBan,
    UserManageRoles,
    AdminPanelAccess,
    SystemSettings,
}

impl Permission {
    pub const ALL: &'static [Permission] = &[
        Permission::BlogCreate,
        Permission::BlogEditAny,
        Permission::BlogDelete,
        Permission::ThreadModerate,
        Permission::UserBan,
        Permission::UserManageRoles,
        Permission::AdminPanelAccess,
        Permission::SystemSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::BlogCreate => "BLOG_CREATE",
            Permission::BlogEditAny => "BLOG_EDIT_ANY",
            Permission::BlogDelete => "BLOG_DELETE",
            Permission::ThreadModerate => "THREAD_MODERATE",
            Permission::UserBan => "USER_BAN",
            Permission::UserManageRoles => "USER_MANAGE_ROLES",
            Permission::AdminPanelAccess => "ADMIN_PANEL_ACCESS",
            Permission::SystemSettings => "SYSTEM_SETTINGS",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Profile fields a user may change
#[derive(Debug, Clone, Default)]
pub struct UpdateUserInput {
    pub name: Option<String>,
    pub avatar: Option<String>,
}

/// Ban details written by a moderator
#[derive(Debug, Clone)]
pub struct BanInput {
    pub banned_by: i64,
    pub reason: Option<String>,
    pub banned_until: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn user_with_role(role: UserRole) -> User {
        let mut user = User::new("alice".into(), "alice@example.com".into(), "hash".into(), role);
        user.id = 10;
        user
    }

    #[test]
    fn test_role_roundtrip_is_case_insensitive() {
        assert_eq!("admin".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert_eq!("Moderator".parse::<UserRole>().unwrap(), UserRole::Moderator);
        assert_eq!("USER".parse::<UserRole>().unwrap(), UserRole::User);
        assert!("editor".parse::<UserRole>().is_err());
        assert_eq!(UserRole::Moderator.to_string(), "MODERATOR");
        assert_eq!(UserRole::default(), UserRole::User);
    }

    #[test]
    fn test_role_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&UserRole::Admin).unwrap(), "\"ADMIN\"");
        assert_eq!(
            serde_json::to_string(&Permission::AdminPanelAccess).unwrap(),
            "\"ADMIN_PANEL_ACCESS\""
        );
    }

    #[test]
    fn test_permission_lists() {
        assert_eq!(UserRole::Admin.permissions().len(), 8);
        assert!(UserRole::User.permissions().is_empty());

        let moderator = UserRole::Moderator;
        assert!(moderator.has_permission(Permission::BlogCreate));
        assert!(moderator.has_permission(Permission::ThreadModerate));
        assert!(moderator.has_permission(Permission::UserBan));
        assert!(moderator.has_permission(Permission::AdminPanelAccess));
        assert!(!moderator.has_permission(Permission::BlogDelete));
        assert!(!moderator.has_permission(Permission::BlogEditAny));
        assert!(!moderator.has_permission(Permission::UserManageRoles));
        assert!(!moderator.has_permission(Permission::SystemSettings));
    }

    #[test]
    fn test_ownership_rules() {
        let user = user_with_role(UserRole::User);
        assert!(user.can_modify_thread(10));
        assert!(!user.can_modify_thread(11));
        assert!(!user.can_modify_comment(11));
        assert!(user.can_modify_blog(Some(10)));
        assert!(!user.can_modify_blog(None));

        let moderator = user_with_role(UserRole::Moderator);
        assert!(moderator.can_modify_thread(11));
        assert!(moderator.can_modify_comment(11));
        assert!(!moderator.can_modify_blog(Some(11)));
        assert!(moderator.can_access_admin_panel());

        let admin = user_with_role(UserRole::Admin);
        assert!(admin.can_modify_blog(Some(11)));
        assert!(admin.can_modify_blog(None));
        assert!(!user.can_access_admin_panel());
    }

    #[test]
    fn test_ban_expiry() {
        let now = Utc::now();
        let mut user = user_with_role(UserRole::User);
        assert!(!user.ban_expired(now));
        assert!(!user.is_banned_at(now));

        user.is_banned = true;
        assert!(!user.ban_expired(now), "permanent bans never expire");
        assert!(user.is_banned_at(now));

        user.banned_until = Some(now - Duration::minutes(1));
        assert!(user.ban_expired(now));
        assert!(!user.is_banned_at(now));

        user.banned_until = Some(now + Duration::days(1));
        assert!(!user.ban_expired(now));
        assert!(user.is_banned_at(now));
    }

    #[test]
    fn test_display_name_and_serialization() {
        let mut user = user_with_role(UserRole::User);
        assert_eq!(user.display_name(), "alice");
        user.username = String::new();
        user.name = Some("Alice A.".into());
        assert_eq!(user.display_name(), "Alice A.");
        user.name = None;
        assert_eq!(user.display_name(), "Unknown User");

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["isBanned"], false);
        assert_eq!(json["role"], "USER");
    }

    fn role_strategy() -> impl Strategy<Value = UserRole> {
        prop_oneof![
            Just(UserRole::User),
            Just(UserRole::Moderator),
            Just(UserRole::Admin)
        ]
    }

    proptest! {
        /// has_role follows the level ordering, and higher roles hold a superset of permissions.
        #[test]
        fn role_hierarchy_is_monotonic(a in role_strategy(), b in role_strategy()) {
            let user = user_with_role(a);
            prop_assert_eq!(user.has_role(b), a.level() >= b.level());
            if a.level() >= b.level() {
                for p in b.permissions() {
                    prop_assert!(a.has_permission(*p));
                }
            }
        }
    }
}
