//! Error types for the game layer.

use duelgrid_protocol::{AbortReason, PlayerId, SessionStatus};

use crate::IllegalMove;

/// Errors from the session state machine.
///
/// Every error raised by [`GameSession::apply_move`](crate::GameSession::apply_move)
/// has already aborted the session by the time the caller sees it;
/// [`abort_reason`](Self::abort_reason) says with which reason.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// The session isn't in a state that allows this operation.
    #[error("cannot {action} while {status}")]
    InvalidState {
        action: &'static str,
        status: SessionStatus,
    },

    /// A move arrived from the player who doesn't hold the turn.
    #[error("player {0} moved out of turn")]
    OutOfTurn(PlayerId),

    /// A move arrived from someone who isn't seated in this session.
    #[error("player {0} is not in this session")]
    UnknownPlayer(PlayerId),

    /// The move names a different player than the connection it came from.
    #[error("move names player {claimed} but arrived from {sender}")]
    PlayerMismatch { sender: PlayerId, claimed: PlayerId },

    /// The move's sequence number doesn't increase.
    #[error("move sequence {got} does not follow {last}")]
    StaleSequence { last: u64, got: u64 },

    /// The board engine rejected the move.
    #[error("illegal move: {0}")]
    Illegal(#[from] IllegalMove),
}

impl GameError {
    /// The abort reason this error maps to.
    pub fn abort_reason(&self) -> AbortReason {
        match self {
            GameError::Illegal(_) => AbortReason::IllegalMove,
            _ => AbortReason::ProtocolViolation,
        }
    }
}
