//! Bearer token extractors
//!
//! - [`AuthUser`]: any principal with a valid access token
//! - [`AdminUser`]: same, restricted to the admin role

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use uuid::Uuid;

use crate::core::auth::api::AuthApiState;
use crate::core::auth::service::AuthError;
use crate::core::db::models::Role;

/// Principal authenticated by an `Authorization: Bearer` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

/// Principal holding the admin role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminUser(pub AuthUser);

/// Extract Bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::Unauthenticated("No authorization header"))?
        .to_str()
        .map_err(|_| AuthError::Unauthenticated("Invalid authorization format"))?;

    match auth_header.split_once(' ') {
        Some(("Bearer", token)) if !token.is_empty() && !token.contains(' ') => Ok(token),
        _ => Err(AuthError::Unauthenticated("Invalid authorization format")),
    }
}

impl FromRequestParts<Arc<AuthApiState>> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AuthApiState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)?;
        let claims = state.auth_service.authenticate(token)?;
        let id = claims
            .user_id()
            .map_err(|_| AuthError::Forbidden("Invalid token"))?;

        Ok(AuthUser {
            id,
            role: claims.role,
        })
    }
}

impl FromRequestParts<Arc<AuthApiState>> for AdminUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AuthApiState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;

        if user.role != Role::Admin {
            tracing::debug!("User {} denied admin access", user.id);
            return Err(AuthError::Forbidden("Admin access required"));
        }

        Ok(AdminUser(user))
    }
}
