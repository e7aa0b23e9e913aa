//! Application messages carried inside sealed frames.
//!
//! Both enums are internally tagged with a `"type"` field, so a move looks
//! like `{"type":"Move","player":"…","position":4,"seq":3}` on the wire.

use serde::{Deserialize, Serialize};

use crate::types::{
    AbortReason, BoardState, Mark, Move, Outcome, PlayerId, SessionId, SessionStatus,
};

/// Who a new participant wants to play against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Opponent {
    /// The next connection to arrive.
    #[default]
    Human,
    /// A server-side move provider.
    Automated,
}

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// First sealed message on every channel. Doubles as key
    /// confirmation: the server can only read it with the right key.
    Hello {
        #[serde(default)]
        opponent: Opponent,
        /// Ask for the summary of an earlier session instead of playing.
        #[serde(default)]
        resume: Option<SessionId>,
    },

    /// Place a mark.
    Move(Move),

    /// Leave the game. The session is aborted as a disconnect.
    Leave,
}

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Reply to `Hello`: the identity this connection was issued and the
    /// session it landed in.
    Welcome {
        session_id: SessionId,
        player_id: PlayerId,
        status: SessionStatus,
    },

    /// Both seats are filled and the board is live.
    GameStarted {
        session_id: SessionId,
        mark: Mark,
        opponent: PlayerId,
        state: BoardState,
    },

    /// It's the recipient's move.
    YourTurn { state: BoardState },

    /// A move was accepted. Sent to both participants.
    MoveApplied {
        player: PlayerId,
        position: u32,
        state: BoardState,
    },

    /// The board engine reported a terminal position.
    GameOver { outcome: Outcome, state: BoardState },

    /// The session ended early.
    Aborted { reason: AbortReason },

    /// A frame from the recipient was dropped. The recipient must send its
    /// frames again starting at `from_seq`.
    Resend { from_seq: u64 },

    /// Answer to a resume request.
    SessionSummary {
        session_id: SessionId,
        status: SessionStatus,
        board: Option<BoardState>,
    },

    /// A request could not be served. The connection is closed after this.
    Error { message: String },
}
