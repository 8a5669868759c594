//! JWT utilities for token generation and validation
//!
//! Provides HS256 token creation and validation. Access tokens are short-lived
//! (15 minutes), refresh tokens are long-lived (7 days). The two kinds are
//! signed with distinct secrets so a leaked access secret cannot forge refresh
//! tokens; sharing one secret is supported but logged as a weaker mode.

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::db::models::Role;

/// Default access token expiration time (15 minutes)
const ACCESS_TOKEN_EXPIRATION_MINUTES: i64 = 15;

/// Default refresh token expiration time (7 days)
const REFRESH_TOKEN_EXPIRATION_DAYS: i64 = 7;

const DEFAULT_ISSUER: &str = "tokengate";

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for signing access tokens
    pub access_secret: String,
    /// Secret key for signing refresh tokens; `None` reuses the access secret
    pub refresh_secret: Option<String>,
    /// Access token expiration in minutes
    pub access_token_expiration_minutes: i64,
    /// Refresh token expiration in days
    pub refresh_token_expiration_days: i64,
    /// Token issuer
    pub issuer: String,
}

impl JwtConfig {
    /// Create a new JWT configuration with a single secret
    pub fn new(access_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: None,
            access_token_expiration_minutes: ACCESS_TOKEN_EXPIRATION_MINUTES,
            refresh_token_expiration_days: REFRESH_TOKEN_EXPIRATION_DAYS,
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    /// Create config from environment variables
    pub fn from_env() -> Result<Self, JwtError> {
        let access_secret = std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(JwtError::MissingSecret)?;

        let refresh_secret = std::env::var("REFRESH_TOKEN_SECRET")
            .ok()
            .filter(|s| !s.is_empty());

        let access_exp =
            expiration_var("JWT_ACCESS_EXPIRATION_MINUTES", ACCESS_TOKEN_EXPIRATION_MINUTES)?;
        let refresh_exp =
            expiration_var("JWT_REFRESH_EXPIRATION_DAYS", REFRESH_TOKEN_EXPIRATION_DAYS)?;

        let issuer = std::env::var("JWT_ISSUER").unwrap_or_else(|_| DEFAULT_ISSUER.to_string());

        let config = Self {
            access_secret,
            refresh_secret,
            access_token_expiration_minutes: access_exp,
            refresh_token_expiration_days: refresh_exp,
            issuer,
        };
        config.validate()?;

        Ok(config)
    }

    /// Reject expirations that are not positive or that overflow a timestamp
    pub fn validate(&self) -> Result<(), JwtError> {
        check_expiration(
            "JWT_ACCESS_EXPIRATION_MINUTES",
            self.access_token_expiration_minutes,
            Duration::try_minutes(self.access_token_expiration_minutes),
        )?;
        check_expiration(
            "JWT_REFRESH_EXPIRATION_DAYS",
            self.refresh_token_expiration_days,
            Duration::try_days(self.refresh_token_expiration_days),
        )
    }

    /// Set a distinct refresh token secret
    pub fn refresh_secret(mut self, secret: impl Into<String>) -> Self {
        self.refresh_secret = Some(secret.into());
        self
    }

    /// Set access token expiration
    pub fn access_token_expiration(mut self, minutes: i64) -> Self {
        self.access_token_expiration_minutes = minutes;
        self
    }

    /// Set refresh token expiration
    pub fn refresh_token_expiration(mut self, days: i64) -> Self {
        self.refresh_token_expiration_days = days;
        self
    }

    /// Set issuer
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

fn expiration_var(key: &'static str, default: i64) -> Result<i64, JwtError> {
    match std::env::var(key).ok().filter(|v| !v.trim().is_empty()) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| JwtError::InvalidExpiration { key, value }),
        None => Ok(default),
    }
}

fn check_expiration(key: &'static str, value: i64, ttl: Option<Duration>) -> Result<(), JwtError> {
    let fits = ttl
        .filter(|ttl| *ttl > Duration::zero())
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .is_some();

    if fits {
        Ok(())
    } else {
        Err(JwtError::InvalidExpiration {
            key,
            value: value.to_string(),
        })
    }
}

/// JWT configuration and encoding errors
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT_SECRET environment variable not set")]
    MissingSecret,

    #[error("Invalid token expiration {key}={value}")]
    InvalidExpiration { key: &'static str, value: String },

    #[error("Token encoding failed: {0}")]
    EncodingError(String),
}

/// Why a presented token was not accepted
///
/// `Expired` can be fixed by authenticating again; `Invalid` covers tampering,
/// malformed input, a foreign issuer and the wrong token type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,
}

impl From<jsonwebtoken::errors::Error> for VerifyError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => VerifyError::Expired,
            _ => VerifyError::Invalid,
        }
    }
}

/// Token type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Capability tag of the subject
    pub role: Role,
    /// Token type (access or refresh)
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// JWT ID (unique identifier for this token)
    pub jti: String,
}

impl Claims {
    /// Get user ID as UUID
    pub fn user_id(&self) -> Result<Uuid, VerifyError> {
        Uuid::parse_str(&self.sub).map_err(|_| VerifyError::Invalid)
    }
}

/// Token pair (access + refresh)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token (short-lived)
    pub access_token: String,
    /// Refresh token (long-lived)
    pub refresh_token: String,
    /// Access token expiration (Unix timestamp)
    pub access_expires_at: i64,
    /// Refresh token expiration (Unix timestamp)
    pub refresh_expires_at: i64,
    /// Token type (always "Bearer")
    pub token_type: String,
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// JWT service for token operations
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    access_keys: SigningKeys,
    refresh_keys: SigningKeys,
}

impl JwtService {
    /// Create a new JWT service
    pub fn new(config: JwtConfig) -> Self {
        let access_keys = SigningKeys::from_secret(&config.access_secret);
        let refresh_keys = match &config.refresh_secret {
            Some(secret) => SigningKeys::from_secret(secret),
            None => {
                tracing::warn!(
                    "REFRESH_TOKEN_SECRET not set, refresh tokens are signed with the access secret"
                );
                access_keys.clone()
            }
        };

        Self {
            config,
            access_keys,
            refresh_keys,
        }
    }

    /// Create JWT service from environment variables
    pub fn from_env() -> Result<Self, JwtError> {
        let config = JwtConfig::from_env()?;
        Ok(Self::new(config))
    }

    fn keys(&self, token_type: TokenType) -> &SigningKeys {
        match token_type {
            TokenType::Access => &self.access_keys,
            TokenType::Refresh => &self.refresh_keys,
        }
    }

    fn generate(
        &self,
        user_id: Uuid,
        role: Role,
        token_type: TokenType,
        ttl: Duration,
    ) -> Result<(String, i64), JwtError> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(ttl)
            .ok_or_else(|| JwtError::EncodingError("token expiry out of range".to_string()))?;

        let claims = Claims {
            sub: user_id.to_string(),
            role,
            token_type,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::default(), &claims, &self.keys(token_type).encoding)
            .map_err(|e| JwtError::EncodingError(e.to_string()))?;

        Ok((token, exp.timestamp()))
    }

    /// Generate an access token
    pub fn generate_access_token(&self, user_id: Uuid, role: Role) -> Result<(String, i64), JwtError> {
        self.generate(user_id, role, TokenType::Access, self.access_token_ttl())
    }

    /// Generate a refresh token
    pub fn generate_refresh_token(
        &self,
        user_id: Uuid,
        role: Role,
    ) -> Result<(String, i64), JwtError> {
        self.generate(user_id, role, TokenType::Refresh, self.refresh_token_ttl())
    }

    /// Generate both access and refresh tokens
    pub fn generate_token_pair(&self, user_id: Uuid, role: Role) -> Result<TokenPair, JwtError> {
        let (access_token, access_expires_at) = self.generate_access_token(user_id, role)?;
        let (refresh_token, refresh_expires_at) = self.generate_refresh_token(user_id, role)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            access_expires_at,
            refresh_expires_at,
            token_type: "Bearer".to_string(),
        })
    }

    fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, VerifyError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.issuer]);
        // Set leeway to 0 for strict expiration checking
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.keys(expected).decoding, &validation)?;
        let claims = token_data.claims;

        if claims.token_type != expected {
            return Err(VerifyError::Invalid);
        }
        claims.user_id()?;

        Ok(claims)
    }

    /// Validate an access token
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, VerifyError> {
        self.verify(token, TokenType::Access)
    }

    /// Validate a refresh token
    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, VerifyError> {
        self.verify(token, TokenType::Refresh)
    }

    pub fn access_token_ttl(&self) -> Duration {
        Duration::try_minutes(self.config.access_token_expiration_minutes)
            .unwrap_or(Duration::minutes(ACCESS_TOKEN_EXPIRATION_MINUTES))
    }

    /// Validity window of refresh tokens, shared by sessions, the cache and the cookie
    ///
    /// Out-of-range values fall back to the default; [`JwtConfig::validate`]
    /// reports them.
    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::try_days(self.config.refresh_token_expiration_days)
            .unwrap_or(Duration::days(REFRESH_TOKEN_EXPIRATION_DAYS))
    }

    /// Whether refresh tokens have their own secret
    pub fn has_distinct_refresh_secret(&self) -> bool {
        self.config.refresh_secret.is_some()
    }
}
