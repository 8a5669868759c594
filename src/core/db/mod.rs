//! Database module for tokengate
//!
//! This module provides database connectivity, models, the store traits with
//! their PostgreSQL repositories, and in-memory stores.

pub mod memory;
pub mod models;
pub mod pool;
pub mod repositories;

// Re-export commonly used items
pub use memory::{MemorySessionStore, MemoryUserStore};
pub use models::*;
pub use pool::{DbConfig, DbError, create_pool_with_migrations, health_check};
pub use repositories::{
    PgSessionRepository, PgUserRepository, SessionRepositoryError, SessionStore,
    UserRepositoryError, UserStore,
};

// Re-export sqlx types that might be needed
pub use sqlx::PgPool;
