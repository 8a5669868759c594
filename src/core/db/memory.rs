//! In-process implementations of the store traits
//!
//! Used by debug builds when `DATABASE_URL` is not configured and by the
//! test suite. Each store keeps its rows behind one lock so every operation,
//! `rotate` included, is atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::db::models::{NewRefreshSession, NewUser, RefreshSession, User};
use crate::core::db::repositories::{
    SessionRepositoryError, SessionStore, UserRepositoryError, UserStore,
};

// ============================================================================
// Session Store
// ============================================================================

/// In-memory session store
///
/// Rows are kept in insertion order, so the last matching row is the latest
/// one even when two sessions share a `created_at` timestamp.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<Vec<RefreshSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows for a user, revoked ones included
    pub async fn count_for_user(&self, user_id: Uuid) -> usize {
        self.sessions
            .read()
            .await
            .iter()
            .filter(|s| s.user_id == user_id)
            .count()
    }

    /// Insert a fully formed row, bypassing `create`
    pub async fn insert_raw(&self, session: RefreshSession) {
        self.sessions.write().await.push(session);
    }

    fn build(session: NewRefreshSession) -> RefreshSession {
        RefreshSession {
            id: Uuid::new_v4(),
            user_id: session.user_id,
            token_hash: session.token_hash,
            created_at: Utc::now(),
            expires_at: session.expires_at,
            revoked: false,
        }
    }
}

fn drain_where(
    sessions: &mut Vec<RefreshSession>,
    predicate: impl Fn(&RefreshSession) -> bool,
) -> Vec<RefreshSession> {
    let (removed, kept): (Vec<_>, Vec<_>) = sessions.drain(..).partition(|s| predicate(s));
    *sessions = kept;
    removed
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(
        &self,
        session: NewRefreshSession,
    ) -> Result<RefreshSession, SessionRepositoryError> {
        let session = Self::build(session);
        self.sessions.write().await.push(session.clone());
        Ok(session)
    }

    async fn get_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<RefreshSession>, SessionRepositoryError> {
        Ok(self
            .sessions
            .read()
            .await
            .iter()
            .rev()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<RefreshSession>, SessionRepositoryError> {
        Ok(self
            .sessions
            .read()
            .await
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn delete_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<RefreshSession>, SessionRepositoryError> {
        let mut sessions = self.sessions.write().await;
        Ok(drain_where(&mut sessions, |s| s.id == id).pop())
    }

    async fn delete_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshSession>, SessionRepositoryError> {
        let mut sessions = self.sessions.write().await;
        Ok(drain_where(&mut sessions, |s| s.user_id == user_id))
    }

    async fn revoke_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshSession>, SessionRepositoryError> {
        let mut sessions = self.sessions.write().await;
        let mut revoked = Vec::new();
        for session in sessions.iter_mut().filter(|s| s.user_id == user_id) {
            session.revoked = true;
            revoked.push(session.clone());
        }
        Ok(revoked)
    }

    async fn delete_expired(&self) -> Result<Vec<RefreshSession>, SessionRepositoryError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        Ok(drain_where(&mut sessions, |s| s.expires_at < now))
    }

    async fn rotate(
        &self,
        old_id: Uuid,
        replacement: NewRefreshSession,
    ) -> Result<Option<RefreshSession>, SessionRepositoryError> {
        let mut sessions = self.sessions.write().await;

        let live = sessions
            .iter()
            .any(|s| s.id == old_id && s.user_id == replacement.user_id && !s.revoked);
        if !live {
            return Ok(None);
        }

        let user_id = replacement.user_id;
        drain_where(&mut sessions, |s| s.user_id == user_id);

        let session = Self::build(replacement);
        sessions.push(session.clone());
        Ok(Some(session))
    }
}

// ============================================================================
// User Store
// ============================================================================

/// In-memory user store
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a principal, as an account deletion outside the session core would
    pub async fn remove(&self, id: Uuid) -> Option<User> {
        self.users.write().await.remove(&id)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(&self, user: NewUser) -> Result<User, UserRepositoryError> {
        let mut users = self.users.write().await;

        if users.values().any(|u| u.email == user.email) {
            return Err(UserRepositoryError::EmailAlreadyExists);
        }

        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: Utc::now(),
        };
        users.insert(created.id, created.clone());

        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserRepositoryError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserRepositoryError> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<User>, UserRepositoryError> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }
}
