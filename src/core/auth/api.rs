//! Auth API endpoints
//!
//! Provides REST API endpoints for authentication:
//! - POST /auth/signup - Register a new user (201)
//! - POST /auth/signin - Sign in and get tokens
//! - POST /auth/refresh - Rotate the refresh session (cookie only)
//! - POST /auth/logout - End all sessions of the caller (bearer)
//! - GET /api/user - Current user info (bearer)
//! - GET /api/admin/users - All users with their last login (admin)
//! - GET /health - Database and cache reachability, environment
//!
//! The access token is returned in the body; the refresh token only ever
//! travels in the `refreshToken` cookie.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use std::sync::Arc;

use crate::core::auth::cookie::{RefreshCookie, extract_refresh_token};
use crate::core::auth::extractor::{AdminUser, AuthUser};
use crate::core::auth::service::{
    AuthError, AuthService, IssuedSession, SigninRequest, SignupRequest,
};
use crate::core::cache::CacheState;
use crate::core::config::Environment;
use crate::core::db::models::{UserResponse, UserSummary};
use crate::core::db::{PgPool, health_check};

/// Auth API state containing the auth service
#[derive(Clone)]
pub struct AuthApiState {
    pub auth_service: AuthService,
    pub refresh_cookie: RefreshCookie,
    pub environment: Environment,
    /// Pool behind the stores; `None` when running on in-memory stores
    pub database: Option<PgPool>,
}

impl AuthApiState {
    pub fn new(auth_service: AuthService, environment: Environment) -> Self {
        let refresh_cookie = RefreshCookie::new(
            environment.is_production(),
            auth_service.jwt().refresh_token_ttl(),
        );

        Self {
            auth_service,
            refresh_cookie,
            environment,
            database: None,
        }
    }

    /// Report this pool's reachability on `/health`
    pub fn with_database(mut self, pool: PgPool) -> Self {
        self.database = Some(pool);
        self
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub message: String,
    pub code: String,
}

impl ApiError {
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Convert AuthError to API response
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuthError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            AuthError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            AuthError::Conflict => (StatusCode::CONFLICT, "EMAIL_EXISTS"),
            AuthError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            AuthError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let message = match &self {
            AuthError::Internal(details) => {
                tracing::error!("Internal error: {}", details);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ApiError::new(message, code))).into_response()
    }
}

/// Body returned whenever a token pair is issued
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub message: &'static str,
    pub access_token: String,
    pub expires_at: i64,
    pub token_type: String,
    pub user: UserResponse,
}

impl SessionResponse {
    fn new(message: &'static str, issued: &IssuedSession) -> Self {
        Self {
            message,
            access_token: issued.tokens.access_token.clone(),
            expires_at: issued.tokens.access_expires_at,
            token_type: issued.tokens.token_type.clone(),
            user: issued.user.clone(),
        }
    }
}

/// Response for logout
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Reachability of a backing service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Ok,
    Degraded,
    Unavailable,
    Disabled,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub environment: String,
    pub database: ComponentStatus,
    pub cache: ComponentStatus,
}

/// Create the auth API router
pub fn auth_api_router(state: AuthApiState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/signin", post(signin_handler))
        .route("/auth/refresh", post(refresh_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/api/user", get(user_handler))
        .route("/api/admin/users", get(admin_users_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Put the refresh token in its cookie and the rest in the body
fn issue_response(
    state: &AuthApiState,
    jar: CookieJar,
    message: &'static str,
    issued: IssuedSession,
) -> (CookieJar, Json<SessionResponse>) {
    let body = SessionResponse::new(message, &issued);
    let jar = state.refresh_cookie.set(jar, issued.tokens.refresh_token);
    (jar, Json(body))
}

/// POST /auth/signup
async fn signup_handler(
    State(state): State<Arc<AuthApiState>>,
    jar: CookieJar,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<SessionResponse>), AuthError> {
    let issued = state.auth_service.signup(request).await?;
    let (jar, body) = issue_response(&state, jar, "Signup successful", issued);

    Ok((StatusCode::CREATED, jar, body))
}

/// POST /auth/signin
async fn signin_handler(
    State(state): State<Arc<AuthApiState>>,
    jar: CookieJar,
    Json(request): Json<SigninRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), AuthError> {
    let issued = state.auth_service.signin(request).await?;

    Ok(issue_response(&state, jar, "Login successful", issued))
}

/// POST /auth/refresh
/// Any failure clears the refresh cookie
async fn refresh_handler(
    State(state): State<Arc<AuthApiState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<SessionResponse>), (CookieJar, AuthError)> {
    let token = extract_refresh_token(&jar);

    match state.auth_service.refresh(token.as_deref()).await {
        Ok(issued) => Ok(issue_response(&state, jar, "Refresh successful", issued)),
        Err(e) => Err((state.refresh_cookie.clear(jar), e)),
    }
}

/// POST /auth/logout
async fn logout_handler(
    State(state): State<Arc<AuthApiState>>,
    user: AuthUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), (CookieJar, AuthError)> {
    let jar = state.refresh_cookie.clear(jar);

    match state.auth_service.logout(user.id).await {
        Ok(()) => Ok((
            jar,
            Json(MessageResponse {
                message: "Logout successful",
            }),
        )),
        Err(e) => Err((jar, e)),
    }
}

/// GET /api/user
async fn user_handler(
    State(state): State<Arc<AuthApiState>>,
    user: AuthUser,
) -> Result<Json<UserResponse>, AuthError> {
    let user = state.auth_service.current_user(user.id).await?;
    Ok(Json(user))
}

/// GET /api/admin/users
async fn admin_users_handler(
    State(state): State<Arc<AuthApiState>>,
    AdminUser(admin): AdminUser,
) -> Result<Json<Vec<UserSummary>>, AuthError> {
    tracing::debug!("Admin {} listing users", admin.id);
    let users = state.auth_service.list_users().await?;
    Ok(Json(users))
}

/// GET /health
///
/// 503 when the database does not answer; a degraded cache only shows up in
/// the body since refreshes keep working without it.
async fn health_handler(
    State(state): State<Arc<AuthApiState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let database = match &state.database {
        Some(pool) => match health_check(pool).await {
            Ok(()) => ComponentStatus::Ok,
            Err(e) => {
                tracing::warn!("Health check: {}", e);
                ComponentStatus::Unavailable
            }
        },
        None => ComponentStatus::Disabled,
    };

    let cache = state.auth_service.cache();
    let cache = if !cache.is_enabled() {
        ComponentStatus::Disabled
    } else {
        match cache.health().state() {
            CacheState::Healthy => ComponentStatus::Ok,
            CacheState::Degraded => ComponentStatus::Degraded,
        }
    };

    let (code, status) = if database == ComponentStatus::Unavailable {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    } else {
        (StatusCode::OK, "ok")
    };

    (
        code,
        Json(HealthResponse {
            status,
            environment: state.environment.to_string(),
            database,
            cache,
        }),
    )
}
