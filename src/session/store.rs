/// Session Store contract
///
/// The one stateful component of the credential system. A row exists only
/// while a refresh credential is Live; rotation and revocation both remove
/// rows, so "absent" covers Rotated and Revoked alike. The policy decision
/// for an absent token belongs to the rotation engine, not the store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::error::Error as StdError;
use std::fmt;
use uuid::Uuid;

/// One live session: a refresh credential fingerprint bound to its owner
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub user_id: Uuid,
    pub token_hash: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum SessionStoreError {
    /// A record with the same fingerprint already exists
    Conflict,
    /// The fingerprint is not currently live
    NotFound,
    /// Backend failure (connection loss, transaction abort, ...)
    Unavailable(String),
}

impl fmt::Display for SessionStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStoreError::Conflict => write!(f, "session record already exists"),
            SessionStoreError::NotFound => write!(f, "session record not found"),
            SessionStoreError::Unavailable(msg) => write!(f, "session store unavailable: {}", msg),
        }
    }
}

impl StdError for SessionStoreError {}

/// Persistence contract the rotation engine depends on
///
/// Implementations must serialize conflicting operations on the same
/// identity: of two concurrent `replace` calls for one `old_hash`, exactly
/// one may succeed; `replace` racing `revoke_all` must fail with `NotFound`
/// rather than re-insert a record for a just-wiped identity.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new record. Fails with `Conflict` if the fingerprint is
    /// already live (cannot happen under correct random generation, but the
    /// contract handles it rather than corrupt state).
    async fn create(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionRecord, SessionStoreError>;

    /// Exact fingerprint lookup.
    async fn find(&self, token_hash: &str) -> Result<Option<SessionRecord>, SessionStoreError>;

    /// Atomically remove the record keyed by `old_hash` and insert one keyed
    /// by `new_hash` for the same identity. Fails with `NotFound` if
    /// `old_hash` is not currently live.
    async fn replace(
        &self,
        old_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionRecord, SessionStoreError>;

    /// Delete a single record. Returns whether a record was actually
    /// removed; deleting an absent fingerprint is not an error.
    async fn revoke_one(&self, token_hash: &str) -> Result<bool, SessionStoreError>;

    /// Delete every record for the identity. Returns the number removed.
    async fn revoke_all(&self, user_id: Uuid) -> Result<u64, SessionStoreError>;
}
