/// In-memory Session Store
///
/// Reference implementation backed by a single mutex-guarded map. Every
/// operation is one critical section, which gives it the same atomicity
/// guarantees the contract demands of the transactional store. Used by the
/// rotation engine's tests and suitable for single-node development runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::store::{SessionRecord, SessionStore, SessionStoreError};

#[derive(Default)]
pub struct InMemorySessionStore {
    records: Mutex<HashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionRecord, SessionStoreError> {
        let mut records = self.records.lock().unwrap();

        if records.contains_key(token_hash) {
            return Err(SessionStoreError::Conflict);
        }

        let record = SessionRecord {
            user_id,
            token_hash: token_hash.to_string(),
            created_at: Utc::now(),
            expires_at,
        };
        records.insert(token_hash.to_string(), record.clone());

        Ok(record)
    }

    async fn find(&self, token_hash: &str) -> Result<Option<SessionRecord>, SessionStoreError> {
        let records = self.records.lock().unwrap();
        Ok(records.get(token_hash).cloned())
    }

    async fn replace(
        &self,
        old_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<SessionRecord, SessionStoreError> {
        let mut records = self.records.lock().unwrap();

        // Remove-then-insert under one lock acquisition; a concurrent
        // revoke_all that already removed old_hash surfaces as NotFound
        // here, never as a resurrected session.
        let old = records.remove(old_hash).ok_or(SessionStoreError::NotFound)?;

        if records.contains_key(new_hash) {
            // Restore the removed record before reporting the collision.
            records.insert(old_hash.to_string(), old);
            return Err(SessionStoreError::Conflict);
        }

        let record = SessionRecord {
            user_id: old.user_id,
            token_hash: new_hash.to_string(),
            created_at: Utc::now(),
            expires_at,
        };
        records.insert(new_hash.to_string(), record.clone());

        Ok(record)
    }

    async fn revoke_one(&self, token_hash: &str) -> Result<bool, SessionStoreError> {
        let mut records = self.records.lock().unwrap();
        Ok(records.remove(token_hash).is_some())
    }

    async fn revoke_all(&self, user_id: Uuid) -> Result<u64, SessionStoreError> {
        let mut records = self.records.lock().unwrap();

        let before = records.len();
        records.retain(|_, record| record.user_id != user_id);

        Ok((before - records.len()) as u64)
    }
}
