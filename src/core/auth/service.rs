//! Authentication service
//!
//! The session manager. Issues token pairs at signup and signin, rotates the
//! refresh session on every refresh and tears it down on logout, composing the
//! user store, the session store, the session cache and the JWT service.
//!
//! Invariants kept here:
//! - a refresh token is accepted at most once; using it rotates the session
//! - the refresh token is persisted only as a SHA-256 digest
//! - the cache is consulted first but never trusted over the store

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::auth::cookie::is_placeholder_token;
use crate::core::auth::digest::{hash_token, verify_token_hash};
use crate::core::auth::jwt::{Claims, JwtError, JwtService, TokenPair, VerifyError};
use crate::core::auth::password::{CredentialVerifier, PasswordError};
use crate::core::cache::SessionCache;
use crate::core::db::models::{
    NewRefreshSession, NewUser, RefreshSession, Role, User, UserResponse, UserSummary,
};
use crate::core::db::repositories::{
    SessionRepositoryError, SessionStore, UserRepositoryError, UserStore,
};

const INVALID_CREDENTIALS: &str = "Invalid credentials";
const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";

/// Maximum length of a display name, matching the `users.name` column
const MAX_NAME_LENGTH: usize = 100;

/// Authentication service error types
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing or expired credentials; authenticating again can fix it
    #[error("{0}")]
    Unauthenticated(&'static str),

    /// Credentials were presented but are not acceptable
    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Email already exists")]
    Conflict,

    #[error("{0}")]
    InvalidInput(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<UserRepositoryError> for AuthError {
    fn from(err: UserRepositoryError) -> Self {
        match err {
            UserRepositoryError::EmailAlreadyExists => AuthError::Conflict,
            _ => AuthError::Internal(err.to_string()),
        }
    }
}

impl From<SessionRepositoryError> for AuthError {
    fn from(err: SessionRepositoryError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

/// Signup request data
#[derive(Clone, serde::Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Signin request data
#[derive(Clone, serde::Deserialize)]
pub struct SigninRequest {
    pub email: String,
    pub password: String,
}

/// Result of signup, signin and refresh
///
/// `tokens.refresh_token` must leave through the refresh cookie only.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub user: UserResponse,
    pub tokens: TokenPair,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    verifier: Arc<dyn CredentialVerifier>,
    jwt: JwtService,
    cache: SessionCache,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        verifier: Arc<dyn CredentialVerifier>,
        jwt: JwtService,
        cache: SessionCache,
    ) -> Self {
        Self {
            users,
            sessions,
            verifier,
            jwt,
            cache,
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// Validate email format
    fn validate_email(email: &str) -> Result<(), AuthError> {
        const INVALID_EMAIL: AuthError = AuthError::InvalidInput("Invalid email format");

        let Some((local, domain)) = email.split_once('@') else {
            return Err(INVALID_EMAIL);
        };

        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(INVALID_EMAIL);
        }

        if email.chars().any(char::is_whitespace) {
            return Err(INVALID_EMAIL);
        }

        // Domain needs at least one dot and no empty labels
        if !domain.contains('.') || domain.split('.').any(str::is_empty) {
            return Err(INVALID_EMAIL);
        }

        Ok(())
    }

    fn validate_name(name: &str) -> Result<(), AuthError> {
        if name.is_empty() {
            return Err(AuthError::InvalidInput("Name is required"));
        }
        if name.chars().count() > MAX_NAME_LENGTH {
            return Err(AuthError::InvalidInput("Name is too long"));
        }
        Ok(())
    }

    fn validate_password(password: &str) -> Result<(), AuthError> {
        if password.is_empty() {
            return Err(AuthError::InvalidInput("Password is required"));
        }
        Ok(())
    }

    /// Register a new user and open their first session
    pub async fn signup(&self, request: SignupRequest) -> Result<IssuedSession, AuthError> {
        let name = request.name.trim().to_string();
        let email = Self::normalize_email(&request.email);

        Self::validate_name(&name)?;
        Self::validate_email(&email)?;
        Self::validate_password(&request.password)?;

        let password_hash = self.verifier.hash(&request.password)?;

        let user = self
            .users
            .create(NewUser {
                name,
                email,
                password_hash,
                role: Role::User,
            })
            .await?;

        tracing::info!("User registered: {}", user.id);

        self.issue(user).await
    }

    /// Authenticate with email and password
    ///
    /// Unknown email and wrong password fail identically.
    pub async fn signin(&self, request: SigninRequest) -> Result<IssuedSession, AuthError> {
        let email = Self::normalize_email(&request.email);

        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::Unauthenticated(INVALID_CREDENTIALS))?;

        if !self.verifier.verify(&request.password, &user.password_hash)? {
            return Err(AuthError::Unauthenticated(INVALID_CREDENTIALS));
        }

        tracing::info!("User signed in: {}", user.id);

        self.issue(user).await
    }

    fn session_expiry(tokens: &TokenPair) -> Result<DateTime<Utc>, AuthError> {
        DateTime::from_timestamp(tokens.refresh_expires_at, 0)
            .ok_or_else(|| AuthError::Internal("refresh expiry out of range".to_string()))
    }

    /// Issue a token pair and persist its refresh session
    async fn issue(&self, user: User) -> Result<IssuedSession, AuthError> {
        let tokens = self.jwt.generate_token_pair(user.id, user.role)?;

        let session = self
            .sessions
            .create(NewRefreshSession {
                user_id: user.id,
                token_hash: hash_token(&tokens.refresh_token),
                expires_at: Self::session_expiry(&tokens)?,
            })
            .await?;

        if !self.cache.set(&session).await {
            tracing::debug!("Session for user {} not mirrored in cache", user.id);
        }

        Ok(IssuedSession {
            user: user.into(),
            tokens,
        })
    }

    /// Current session of a user: the cache entry if it matches the presented
    /// token, otherwise the latest stored row (repopulating the cache)
    async fn lookup_session(
        &self,
        user_id: Uuid,
        token: &str,
    ) -> Result<Option<RefreshSession>, AuthError> {
        if let Some(cached) = self.cache.get(user_id).await {
            if verify_token_hash(token, &cached.token_hash) {
                return Ok(Some(cached));
            }
            tracing::debug!("Cached session for user {} does not match, reading store", user_id);
        }

        let stored = self.sessions.get_by_user_id(user_id).await?;
        if let Some(session) = &stored {
            self.cache.set(session).await;
        }

        Ok(stored)
    }

    /// Drop a single session from store and cache
    async fn discard(&self, session: &RefreshSession) -> Result<(), AuthError> {
        self.sessions.delete_by_id(session.id).await?;
        self.cache.delete(session.user_id).await;
        Ok(())
    }

    /// Exchange a refresh token for a new token pair
    ///
    /// The presented session is consumed: on success it is replaced by a new
    /// one, and presenting it again fails.
    pub async fn refresh(&self, refresh_token: Option<&str>) -> Result<IssuedSession, AuthError> {
        let Some(token) = refresh_token
            .map(str::trim)
            .filter(|t| !is_placeholder_token(t))
        else {
            return Err(AuthError::Unauthenticated("No refresh token provided"));
        };

        let claims = match self.jwt.verify_refresh_token(token) {
            Ok(claims) => claims,
            Err(VerifyError::Expired) => {
                tracing::debug!("Expired refresh token presented");
                return Err(AuthError::Forbidden(INVALID_REFRESH_TOKEN));
            }
            Err(VerifyError::Invalid) => {
                tracing::debug!("Invalid refresh token presented");
                return Err(AuthError::Forbidden(INVALID_REFRESH_TOKEN));
            }
        };
        let user_id = claims
            .user_id()
            .map_err(|_| AuthError::Forbidden(INVALID_REFRESH_TOKEN))?;

        let session = match self.lookup_session(user_id, token).await? {
            Some(session) if !session.revoked => session,
            _ => return Err(AuthError::Forbidden("Session not found or revoked")),
        };

        if !verify_token_hash(token, &session.token_hash) {
            tracing::warn!(
                "Refresh token reuse detected for user {}, revoking all sessions",
                user_id
            );
            self.sessions.revoke_by_user_id(user_id).await?;
            self.cache.delete(user_id).await;
            return Err(AuthError::Forbidden(INVALID_REFRESH_TOKEN));
        }

        if session.is_expired_at(Utc::now()) {
            self.discard(&session).await?;
            return Err(AuthError::Forbidden("Refresh session expired"));
        }

        let Some(user) = self.users.find_by_id(user_id).await? else {
            tracing::warn!("Refresh for deleted user {}", user_id);
            self.discard(&session).await?;
            return Err(AuthError::Unauthenticated("User not found"));
        };

        let tokens = self.jwt.generate_token_pair(user.id, user.role)?;
        let replacement = NewRefreshSession {
            user_id: user.id,
            token_hash: hash_token(&tokens.refresh_token),
            expires_at: Self::session_expiry(&tokens)?,
        };

        let Some(rotated) = self.sessions.rotate(session.id, replacement).await? else {
            // Another request rotated this session first
            tracing::warn!("Concurrent refresh lost for user {}", user_id);
            self.cache.delete(user_id).await;
            return Err(AuthError::Forbidden(INVALID_REFRESH_TOKEN));
        };

        if !self.cache.set(&rotated).await {
            // A stale entry must not outlive the rotation
            self.cache.delete(user_id).await;
        }

        tracing::info!("Refresh session rotated for user {}", user_id);

        Ok(IssuedSession {
            user: user.into(),
            tokens,
        })
    }

    /// End every session of the user; succeeds when there is nothing to end
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AuthError> {
        let removed = self.sessions.delete_by_user_id(user_id).await?;
        self.cache.delete(user_id).await;

        tracing::info!("User {} logged out, {} session(s) removed", user_id, removed.len());
        Ok(())
    }

    /// Remove expired sessions, returning how many were removed
    pub async fn sweep_expired(&self) -> Result<usize, AuthError> {
        let removed = self.sessions.delete_expired().await?;

        let expired_ids: HashSet<Uuid> = removed.iter().map(|s| s.id).collect();
        let users: HashSet<Uuid> = removed.iter().map(|s| s.user_id).collect();
        for user_id in users {
            let cached = self.cache.get(user_id).await;
            if cached.is_some_and(|c| expired_ids.contains(&c.id)) {
                self.cache.delete(user_id).await;
            }
        }

        if !removed.is_empty() {
            tracing::info!("Swept {} expired refresh session(s)", removed.len());
        }
        Ok(removed.len())
    }

    /// Verify an access token presented as a bearer credential
    pub fn authenticate(&self, access_token: &str) -> Result<Claims, AuthError> {
        match self.jwt.verify_access_token(access_token) {
            Ok(claims) => Ok(claims),
            Err(VerifyError::Expired) => Err(AuthError::Unauthenticated("Token expired")),
            Err(VerifyError::Invalid) => Err(AuthError::Forbidden("Invalid token")),
        }
    }

    /// Profile of the authenticated principal
    pub async fn current_user(&self, user_id: Uuid) -> Result<UserResponse, AuthError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::Unauthenticated("User not found"))?;

        Ok(user.into())
    }

    /// All users with the creation time of their latest session
    pub async fn list_users(&self) -> Result<Vec<UserSummary>, AuthError> {
        let users = self.users.list().await?;
        let mut summaries = Vec::with_capacity(users.len());

        for user in users {
            let last_login = self
                .sessions
                .get_by_user_id(user.id)
                .await?
                .map(|s| s.created_at);

            summaries.push(UserSummary {
                id: user.id,
                name: user.name,
                email: user.email,
                role: user.role,
                last_login,
            });
        }

        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_email_valid() {
        assert!(AuthService::validate_email("user@example.com").is_ok());
        assert!(AuthService::validate_email("user.name@example.com").is_ok());
        assert!(AuthService::validate_email("user+tag@example.co.uk").is_ok());
        assert!(AuthService::validate_email("a@x.com").is_ok());
    }

    #[test]
    fn test_validate_email_invalid() {
        assert!(AuthService::validate_email("").is_err());
        assert!(AuthService::validate_email("invalid").is_err());
        assert!(AuthService::validate_email("@example.com").is_err());
        assert!(AuthService::validate_email("user@").is_err());
        assert!(AuthService::validate_email("user@example").is_err());
        assert!(AuthService::validate_email("user@@example.com").is_err());
        assert!(AuthService::validate_email("user@.com").is_err());
        assert!(AuthService::validate_email("user@example.").is_err());
        assert!(AuthService::validate_email("us er@example.com").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(AuthService::validate_name("A").is_ok());
        assert!(matches!(
            AuthService::validate_name(""),
            Err(AuthError::InvalidInput("Name is required"))
        ));
        assert!(AuthService::validate_name(&"n".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(AuthService::validate_password("p1").is_ok());
        assert!(AuthService::validate_password("").is_err());
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(AuthService::normalize_email("  A@X.com "), "a@x.com");
    }

    // ========================================================================
    // Error Conversion Tests
    // ========================================================================

    #[test]
    fn test_duplicate_email_is_conflict() {
        let err: AuthError = UserRepositoryError::EmailAlreadyExists.into();
        assert!(matches!(err, AuthError::Conflict));
    }

    #[test]
    fn test_infrastructure_errors_are_internal() {
        let err: AuthError = JwtError::MissingSecret.into();
        assert!(matches!(err, AuthError::Internal(_)));

        let err: AuthError = PasswordError::HashingError("bad".to_string()).into();
        assert!(matches!(err, AuthError::Internal(_)));

        let err: AuthError = SessionRepositoryError::DatabaseError(sqlx::Error::PoolTimedOut).into();
        assert!(matches!(err, AuthError::Internal(_)));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            AuthError::Unauthenticated(INVALID_CREDENTIALS).to_string(),
            "Invalid credentials"
        );
        assert_eq!(AuthError::Conflict.to_string(), "Email already exists");
    }
}
