//! The session record: what the registry holds and the store persists.

use std::time::{SystemTime, UNIX_EPOCH};

use duelgrid_protocol::{BoardState, PlayerId, SessionId, SessionStatus};
use serde::{Deserialize, Serialize};

/// Channel sequence counters for one network participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCounters {
    pub player: PlayerId,
    /// Frames the server has sealed to this player.
    pub sent: u64,
    /// Frames the server has opened from this player.
    pub received: u64,
}

/// Snapshot of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub first_player: PlayerId,
    pub second_player: Option<PlayerId>,
    /// `None` until both seats are filled.
    pub board: Option<BoardState>,
    pub counters: Vec<ChannelCounters>,
    pub status: SessionStatus,
    /// Milliseconds since the Unix epoch.
    pub created_at_ms: u64,
}

impl SessionRecord {
    /// A fresh record with one participant waiting.
    pub fn new(session_id: SessionId, first_player: PlayerId) -> Self {
        Self {
            session_id,
            first_player,
            second_player: None,
            board: None,
            counters: Vec::new(),
            status: SessionStatus::AwaitingOpponent,
            created_at_ms: now_ms(),
        }
    }

    pub fn players(&self) -> impl Iterator<Item = PlayerId> + '_ {
        std::iter::once(self.first_player).chain(self.second_player)
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use duelgrid_protocol::ID_LEN;

    #[test]
    fn test_new_record_awaits_opponent() {
        let record = SessionRecord::new(
            SessionId::from_bytes([1; ID_LEN]),
            PlayerId::from_bytes([2; ID_LEN]),
        );
        assert_eq!(record.status, SessionStatus::AwaitingOpponent);
        assert_eq!(record.players().count(), 1);
        assert!(record.created_at_ms > 0);
    }

    #[test]
    fn test_record_serializes_to_json() {
        let record = SessionRecord::new(
            SessionId::from_bytes([1; ID_LEN]),
            PlayerId::from_bytes([2; ID_LEN]),
        );
        let json = serde_json::to_string(&record).unwrap();
        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
