//! Database repositories for tokengate
//!
//! Repositories encapsulate data access behind two traits so the session
//! manager can run against PostgreSQL in production and the in-memory stores
//! in development and tests.

pub mod session;
pub mod user;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::db::models::{NewRefreshSession, NewUser, RefreshSession, User};

pub use session::{PgSessionRepository, SessionRepositoryError};
pub use user::{PgUserRepository, UserRepositoryError};

/// Durable record of issued refresh sessions; the source of truth
///
/// Every mutating operation is atomic.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist a new refresh session
    async fn create(
        &self,
        session: NewRefreshSession,
    ) -> Result<RefreshSession, SessionRepositoryError>;

    /// Most recently created record for the user, revoked or not
    async fn get_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<RefreshSession>, SessionRepositoryError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<RefreshSession>, SessionRepositoryError>;

    /// Hard delete; returns the removed row, `None` if it was already gone
    async fn delete_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<RefreshSession>, SessionRepositoryError>;

    /// Hard delete of every session the user holds
    async fn delete_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshSession>, SessionRepositoryError>;

    /// Flag every session of the user as revoked, keeping the rows
    async fn revoke_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshSession>, SessionRepositoryError>;

    /// Remove sessions whose `expires_at` has passed
    async fn delete_expired(&self) -> Result<Vec<RefreshSession>, SessionRepositoryError>;

    /// Replace `old_id` with `replacement` in a single transaction.
    ///
    /// The old row is deleted only if it still exists and is not revoked.
    /// When nothing was deleted no insert happens and `None` is returned, so
    /// of two concurrent rotations of the same session exactly one wins.
    /// Any other leftover sessions of the same user are removed too.
    async fn rotate(
        &self,
        old_id: Uuid,
        replacement: NewRefreshSession,
    ) -> Result<Option<RefreshSession>, SessionRepositoryError>;
}

/// Principal lookup and registration
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user; duplicate emails fail with `EmailAlreadyExists`
    async fn create(&self, user: NewUser) -> Result<User, UserRepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserRepositoryError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserRepositoryError>;

    /// All users ordered by creation time
    async fn list(&self) -> Result<Vec<User>, UserRepositoryError>;
}
