//! Database models for tokengate
//!
//! This module defines the entity structs that map to the `users` and
//! `refresh_sessions` PostgreSQL tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// User Model
// ============================================================================

/// Capability tag carried by every principal and encoded into its tokens
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    sqlx::Type,
    Default,
    derive_more::Display,
)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    #[display("user")]
    User,
    #[display("admin")]
    Admin,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// User entity representing a registered principal
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// User data for creation (password must already be hashed)
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// User without sensitive data (for API responses)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role: user.role,
        }
    }
}

/// Admin listing row: a user and the creation time of their latest session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub last_login: Option<DateTime<Utc>>,
}

// ============================================================================
// Refresh Session Model
// ============================================================================

/// A single outstanding refresh credential, stored as a one-way hash
///
/// Also the payload mirrored into the session cache, hence the serde derives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RefreshSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

impl RefreshSession {
    /// Whether the session's own expiry has passed at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Session data for creation
#[derive(Debug, Clone)]
pub struct NewRefreshSession {
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_user() -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: "$2b$04$secret".to_string(),
            role: Role::Admin,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_user_response_from_user() {
        let user = sample_user();
        let id = user.id;

        let response: UserResponse = user.into();

        assert_eq!(response.id, id);
        assert_eq!(response.name, "Ada");
        assert_eq!(response.email, "ada@example.com");
        assert_eq!(response.role, Role::Admin);
    }

    #[test]
    fn test_user_serialization_skips_password_hash() {
        let json = serde_json::to_string(&sample_user()).unwrap();

        assert!(!json.contains("password_hash"));
        assert!(!json.contains("$2b$04$secret"));
        assert!(json.contains("\"role\":\"admin\""));
    }

    #[test]
    fn test_role_display_and_parse() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_default_is_user() {
        assert_eq!(Role::default(), Role::User);
    }

    #[test]
    fn test_refresh_session_expiry_boundary() {
        let now = Utc::now();
        let session = RefreshSession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "ab".repeat(32),
            created_at: now - Duration::days(7),
            expires_at: now,
            revoked: false,
        };

        assert!(session.is_expired_at(now));
        assert!(!session.is_expired_at(now - Duration::seconds(1)));
    }

    #[test]
    fn test_refresh_session_json_round_trip_keeps_revoked_flag() {
        let session = RefreshSession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token_hash: "cd".repeat(32),
            created_at: Utc::now(),
            expires_at: Utc::now() + Duration::days(7),
            revoked: true,
        };

        let json = serde_json::to_string(&session).unwrap();
        let parsed: RefreshSession = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, session);
    }
}
