use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Roles understood by the engine's role-based access control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Doctor,
    Nurse,
    #[default]
    Staff,
    Viewer,
}

impl UserRole {
    /// Get the display name for this role.
    pub fn display_name(&self) -> &'static str {
        match self {
            UserRole::Admin => "Administrator",
            UserRole::Doctor => "Doctor",
            UserRole::Nurse => "Nurse",
            UserRole::Staff => "Staff",
            UserRole::Viewer => "Viewer",
        }
    }
}

/// A user account as reported by the authentication API.
///
/// Only `email` is guaranteed on every response; everything else is
/// defaulted so partial payloads still deserialize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_login: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl User {
    /// Name to show in output: full name when present, email otherwise.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.email)
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_user() {
        // The API may return nothing but the email
        let user: User = serde_json::from_str(r#"{"email":"test@example.com"}"#)
            .expect("minimal user should parse");
        assert_eq!(user.email, "test@example.com");
        assert_eq!(user.id, 0);
        assert_eq!(user.role, UserRole::Staff);
        assert!(user.is_active);
        assert!(!user.is_verified);
        assert_eq!(user.display_name(), "test@example.com");
    }

    #[test]
    fn test_parse_full_user() {
        let json = r#"{
            "id": 7,
            "email": "dr.chen@hospital.org",
            "username": "dchen",
            "full_name": "Dana Chen",
            "role": "doctor",
            "department": "Radiology",
            "phone": "5551234567",
            "is_active": true,
            "is_verified": true,
            "created_at": "2025-01-15T09:30:00Z",
            "last_login": null
        }"#;

        let user: User = serde_json::from_str(json).expect("full user should parse");
        assert_eq!(user.id, 7);
        assert_eq!(user.role, UserRole::Doctor);
        assert_eq!(user.display_name(), "Dana Chen");
        assert!(!user.is_admin());
        assert!(user.created_at.is_some());
        assert!(user.last_login.is_none());
    }

    #[test]
    fn test_role_round_trip() {
        let json = serde_json::to_string(&UserRole::Admin).unwrap();
        assert_eq!(json, r#""admin""#);
        let role: UserRole = serde_json::from_str(r#""viewer""#).unwrap();
        assert_eq!(role, UserRole::Viewer);
    }
}
