//! The persistence boundary.
//!
//! Sessions call [`SessionStore::save`] once when they end (and after each
//! move when checkpoints are on). A failed save is logged and otherwise
//! ignored; it never changes the outcome of a game.

use std::collections::HashMap;
use std::future::Future;

use duelgrid_protocol::SessionId;
use tokio::sync::RwLock;

use crate::SessionRecord;

/// Errors from a session store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no stored session {0}")]
    NotFound(SessionId),

    #[error("store backend failed: {0}")]
    Backend(String),
}

/// Saves and loads session records.
pub trait SessionStore: Send + Sync + 'static {
    fn save(
        &self,
        record: &SessionRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn load(
        &self,
        session_id: SessionId,
    ) -> impl Future<Output = Result<SessionRecord, StoreError>> + Send;
}

/// Keeps records in memory. Also remembers every save, in order, so tests
/// can count flushes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<SessionId, SessionRecord>>,
    saves: RwLock<Vec<SessionId>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `session_id` has been saved.
    pub async fn save_count(&self, session_id: SessionId) -> usize {
        self.saves
            .read()
            .await
            .iter()
            .filter(|id| **id == session_id)
            .count()
    }

    /// Total saves across all sessions.
    pub async fn total_saves(&self) -> usize {
        self.saves.read().await.len()
    }
}

impl SessionStore for MemoryStore {
    async fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.session_id, record.clone());
        self.saves.write().await.push(record.session_id);
        Ok(())
    }

    async fn load(&self, session_id: SessionId) -> Result<SessionRecord, StoreError> {
        self.records
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or(StoreError::NotFound(session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duelgrid_protocol::{ID_LEN, PlayerId};

    #[tokio::test]
    async fn test_save_then_load_returns_record() {
        let store = MemoryStore::new();
        let record = SessionRecord::new(
            SessionId::from_bytes([1; ID_LEN]),
            PlayerId::from_bytes([2; ID_LEN]),
        );
        store.save(&record).await.unwrap();

        assert_eq!(store.load(record.session_id).await.unwrap(), record);
        assert_eq!(store.save_count(record.session_id).await, 1);
    }

    #[tokio::test]
    async fn test_load_unknown_returns_not_found() {
        let store = MemoryStore::new();
        let id = SessionId::from_bytes([3; ID_LEN]);
        assert!(matches!(store.load(id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_save_overwrites_and_counts() {
        let store = MemoryStore::new();
        let mut record = SessionRecord::new(
            SessionId::from_bytes([1; ID_LEN]),
            PlayerId::from_bytes([2; ID_LEN]),
        );
        store.save(&record).await.unwrap();
        record.second_player = Some(PlayerId::from_bytes([4; ID_LEN]));
        store.save(&record).await.unwrap();

        assert_eq!(store.save_count(record.session_id).await, 2);
        assert_eq!(
            store.load(record.session_id).await.unwrap().second_player,
            record.second_player
        );
    }
}
