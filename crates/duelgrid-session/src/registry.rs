//! The session registry: every live session, its latest record, and the
//! queue of sessions waiting for an opponent.
//!
//! Lookups take a read lock and run concurrently. Inserts, removals and
//! the "pair into a waiting session" step take the write lock, so two
//! connections can never claim the same waiting seat.

use std::collections::{HashMap, VecDeque};

use duelgrid_protocol::{SessionId, SessionStatus};
use tokio::sync::RwLock;

use crate::SessionRecord;
use crate::actor::SessionHandle;

/// Counters kept alongside the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Sessions created since start.
    pub total_sessions: u64,
    /// Sessions currently in the registry.
    pub active_sessions: usize,
    /// Highest `active_sessions` seen.
    pub peak_sessions: usize,
}

struct Entry<C> {
    record: SessionRecord,
    handle: SessionHandle<C>,
}

struct Inner<C> {
    entries: HashMap<SessionId, Entry<C>>,
    waiting: VecDeque<SessionId>,
    stats: ServerStats,
}

pub(crate) struct Registry<C> {
    inner: RwLock<Inner<C>>,
}

impl<C> Registry<C> {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                waiting: VecDeque::new(),
                stats: ServerStats::default(),
            }),
        }
    }

    /// Adds a new session. `waiting` queues it for the next human opponent.
    pub(crate) async fn insert(&self, record: SessionRecord, handle: SessionHandle<C>, waiting: bool) {
        let mut inner = self.inner.write().await;
        let session_id = record.session_id;
        inner.entries.insert(session_id, Entry { record, handle });
        if waiting {
            inner.waiting.push_back(session_id);
        }
        inner.stats.total_sessions += 1;
        inner.stats.active_sessions = inner.entries.len();
        inner.stats.peak_sessions = inner.stats.peak_sessions.max(inner.entries.len());
    }

    /// Takes the oldest session still awaiting an opponent and marks it
    /// `Handshaking`. Stale queue entries are skipped.
    pub(crate) async fn claim_waiting(&self) -> Option<SessionHandle<C>> {
        let mut inner = self.inner.write().await;
        while let Some(session_id) = inner.waiting.pop_front() {
            if let Some(entry) = inner.entries.get_mut(&session_id) {
                if entry.record.status == SessionStatus::AwaitingOpponent {
                    entry.record.status = SessionStatus::Handshaking;
                    return Some(entry.handle.clone());
                }
            }
        }
        None
    }

    /// Replaces the stored record of a live session.
    pub(crate) async fn publish(&self, record: SessionRecord) {
        if let Some(entry) = self.inner.write().await.entries.get_mut(&record.session_id) {
            entry.record = record;
        }
    }

    pub(crate) async fn lookup(&self, session_id: SessionId) -> Option<SessionRecord> {
        self.inner
            .read()
            .await
            .entries
            .get(&session_id)
            .map(|e| e.record.clone())
    }

    pub(crate) async fn handle(&self, session_id: SessionId) -> Option<SessionHandle<C>> {
        self.inner
            .read()
            .await
            .entries
            .get(&session_id)
            .map(|e| e.handle.clone())
    }

    /// Handles of every live session.
    pub(crate) async fn handles(&self) -> Vec<SessionHandle<C>> {
        self.inner
            .read()
            .await
            .entries
            .values()
            .map(|e| e.handle.clone())
            .collect()
    }

    /// Evicts a session. Returns its last record, or `None` if it was
    /// already gone.
    pub(crate) async fn remove(&self, session_id: SessionId) -> Option<SessionRecord> {
        let mut inner = self.inner.write().await;
        let entry = inner.entries.remove(&session_id)?;
        inner.waiting.retain(|id| *id != session_id);
        inner.stats.active_sessions = inner.entries.len();
        Some(entry.record)
    }

    pub(crate) async fn stats(&self) -> ServerStats {
        self.inner.read().await.stats
    }
}
