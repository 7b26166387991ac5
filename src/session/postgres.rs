/// Postgres-backed Session Store
///
/// Production implementation over the `refresh_tokens` table. Rotation
/// atomicity comes from running the delete-and-insert of `replace` inside
/// one transaction: a fingerprint deleted by a concurrent rotation or
/// revoke_all makes the delete return no row, and the whole operation
/// reports `NotFound` without inserting anything.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::store::{SessionRecord, SessionStore, SessionStoreError};

/// Postgres error code for unique constraint violations
const UNIQUE_VIOLATION: &str = "23505";

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_db_err(err: sqlx::Error) -> SessionStoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) {
            return SessionStoreError::Conflict;
        }
    }
    SessionStoreError::Unavailable(err.to_string())
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionRecord, SessionStoreError> {
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_hash)
        .bind(created_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;

        Ok(SessionRecord {
            user_id,
            token_hash: token_hash.to_string(),
            created_at,
            expires_at,
        })
    }

    async fn find(&self, token_hash: &str) -> Result<Option<SessionRecord>, SessionStoreError> {
        let row = sqlx::query_as::<_, (Uuid, String, DateTime<Utc>, DateTime<Utc>)>(
            r#"
            SELECT user_id, token_hash, created_at, expires_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_err)?;

        Ok(row.map(|(user_id, token_hash, created_at, expires_at)| SessionRecord {
            user_id,
            token_hash,
            created_at,
            expires_at,
        }))
    }

    async fn replace(
        &self,
        old_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionRecord, SessionStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SessionStoreError::Unavailable(e.to_string()))?;

        let deleted = sqlx::query_as::<_, (Uuid,)>(
            r#"
            DELETE FROM refresh_tokens
            WHERE token_hash = $1
            RETURNING user_id
            "#,
        )
        .bind(old_hash)
        .fetch_optional(&mut tx)
        .await
        .map_err(map_db_err)?;

        // Dropping the transaction without commit rolls back, so the failed
        // path leaves no trace.
        let (user_id,) = deleted.ok_or(SessionStoreError::NotFound)?;

        let created_at = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(new_hash)
        .bind(created_at)
        .bind(expires_at)
        .execute(&mut tx)
        .await
        .map_err(map_db_err)?;

        tx.commit()
            .await
            .map_err(|e| SessionStoreError::Unavailable(e.to_string()))?;

        Ok(SessionRecord {
            user_id,
            token_hash: new_hash.to_string(),
            created_at,
            expires_at,
        })
    }

    async fn revoke_one(&self, token_hash: &str) -> Result<bool, SessionStoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all(&self, user_id: Uuid) -> Result<u64, SessionStoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;

        Ok(result.rows_affected())
    }
}
