//! tokengate - refresh-session lifecycle service
//!
//! Issues short-lived access tokens and rotating refresh tokens, backed by
//! PostgreSQL with an optional Redis cache.

pub mod core;
