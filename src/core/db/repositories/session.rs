//! Session repository for refresh token management
//!
//! Stores one row per outstanding refresh credential. Tokens are never stored
//! in plaintext, only as SHA-256 hashes computed by the caller.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::SessionStore;
use crate::core::db::models::{NewRefreshSession, RefreshSession};

/// Session repository error types
#[derive(Debug, thiserror::Error)]
pub enum SessionRepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// PostgreSQL-backed session store
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    /// Create a new session repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionRepository {
    async fn create(
        &self,
        session: NewRefreshSession,
    ) -> Result<RefreshSession, SessionRepositoryError> {
        let session = sqlx::query_as::<_, RefreshSession>(
            r#"
            INSERT INTO refresh_sessions (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token_hash, created_at, expires_at, revoked
            "#,
        )
        .bind(session.user_id)
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    async fn get_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<RefreshSession>, SessionRepositoryError> {
        let session = sqlx::query_as::<_, RefreshSession>(
            r#"
            SELECT id, user_id, token_hash, created_at, expires_at, revoked
            FROM refresh_sessions
            WHERE user_id = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<RefreshSession>, SessionRepositoryError> {
        let session = sqlx::query_as::<_, RefreshSession>(
            r#"
            SELECT id, user_id, token_hash, created_at, expires_at, revoked
            FROM refresh_sessions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn delete_by_id(
        &self,
        id: Uuid,
    ) -> Result<Option<RefreshSession>, SessionRepositoryError> {
        let session = sqlx::query_as::<_, RefreshSession>(
            r#"
            DELETE FROM refresh_sessions
            WHERE id = $1
            RETURNING id, user_id, token_hash, created_at, expires_at, revoked
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn delete_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshSession>, SessionRepositoryError> {
        let sessions = sqlx::query_as::<_, RefreshSession>(
            r#"
            DELETE FROM refresh_sessions
            WHERE user_id = $1
            RETURNING id, user_id, token_hash, created_at, expires_at, revoked
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn revoke_by_user_id(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshSession>, SessionRepositoryError> {
        let sessions = sqlx::query_as::<_, RefreshSession>(
            r#"
            UPDATE refresh_sessions
            SET revoked = TRUE
            WHERE user_id = $1
            RETURNING id, user_id, token_hash, created_at, expires_at, revoked
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn delete_expired(&self) -> Result<Vec<RefreshSession>, SessionRepositoryError> {
        let sessions = sqlx::query_as::<_, RefreshSession>(
            r#"
            DELETE FROM refresh_sessions
            WHERE expires_at < NOW()
            RETURNING id, user_id, token_hash, created_at, expires_at, revoked
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn rotate(
        &self,
        old_id: Uuid,
        replacement: NewRefreshSession,
    ) -> Result<Option<RefreshSession>, SessionRepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Row lock on the old session serializes concurrent rotations
        let removed = sqlx::query_as::<_, RefreshSession>(
            r#"
            DELETE FROM refresh_sessions
            WHERE id = $1 AND user_id = $2 AND revoked = FALSE
            RETURNING id, user_id, token_hash, created_at, expires_at, revoked
            "#,
        )
        .bind(old_id)
        .bind(replacement.user_id)
        .fetch_optional(&mut *tx)
        .await?;

        if removed.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query(
            r#"
            DELETE FROM refresh_sessions
            WHERE user_id = $1
            "#,
        )
        .bind(replacement.user_id)
        .execute(&mut *tx)
        .await?;

        let session = sqlx::query_as::<_, RefreshSession>(
            r#"
            INSERT INTO refresh_sessions (user_id, token_hash, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token_hash, created_at, expires_at, revoked
            "#,
        )
        .bind(replacement.user_id)
        .bind(&replacement.token_hash)
        .bind(replacement.expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(session))
    }
}
