//! Authentication module for tokengate
//!
//! This module provides the refresh-session lifecycle:
//! - JWT access/refresh token generation and validation
//! - Signup, signin, refresh rotation and logout
//! - Bearer-token extractors and REST API endpoints
//! - Periodic sweeping of expired sessions

pub mod api;
pub mod cookie;
pub mod digest;
pub mod extractor;
pub mod jwt;
pub mod password;
pub mod service;
pub mod sweeper;


pub use api::{AuthApiState, auth_api_router};
pub use extractor::{AdminUser, AuthUser};
pub use jwt::{Claims, JwtConfig, JwtError, JwtService, TokenPair, TokenType, VerifyError};
pub use password::{BcryptVerifier, CredentialVerifier, PasswordError};
pub use service::{AuthError, AuthService, IssuedSession, SigninRequest, SignupRequest};
pub use sweeper::spawn_session_sweeper;
