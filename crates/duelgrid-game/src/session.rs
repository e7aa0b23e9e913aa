//! The per-game state machine.
//!
//! ```text
//! AwaitingOpponent ──claim──→ Handshaking ──start──→ InProgress ──→ Completed
//!        │                         │                      │
//!        └─────────────────────────┴──────────────────────┴─────→ Aborted
//! ```
//!
//! A `GameSession` owns its board exclusively. Moves are applied one at a
//! time by whoever owns the session (the session actor), so there is no
//! locking here. Once the status is terminal it never changes again.

use std::sync::Arc;

use duelgrid_protocol::{AbortReason, BoardState, Move, Outcome, PlayerId, SessionId, SessionStatus};

use crate::{BoardEngine, GameError, GameStatus};

/// What happened after a move was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveResult {
    /// The game goes on; the turn has passed.
    Continue { state: BoardState },
    /// The move ended the game.
    Finished { outcome: Outcome, state: BoardState },
}

/// One game between two participants.
pub struct GameSession<E> {
    session_id: SessionId,
    engine: Arc<E>,
    dimension: u8,
    first: PlayerId,
    second: Option<PlayerId>,
    board: Option<BoardState>,
    status: SessionStatus,
    /// Last accepted move sequence per seat (X, O).
    last_seq: [Option<u64>; 2],
}

impl<E: BoardEngine> GameSession<E> {
    /// Creates a session with its first participant seated.
    pub fn new(session_id: SessionId, first: PlayerId, engine: Arc<E>, dimension: u8) -> Self {
        Self {
            session_id,
            engine,
            dimension,
            first,
            second: None,
            board: None,
            status: SessionStatus::AwaitingOpponent,
            last_seq: [None, None],
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// The board, once the game has started.
    pub fn board(&self) -> Option<&BoardState> {
        self.board.as_ref()
    }

    pub fn first_player(&self) -> PlayerId {
        self.first
    }

    pub fn second_player(&self) -> Option<PlayerId> {
        self.second
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Seats the second participant. `AwaitingOpponent → Handshaking`.
    pub fn claim(&mut self, second: PlayerId) -> Result<(), GameError> {
        if self.status != SessionStatus::AwaitingOpponent {
            return Err(GameError::InvalidState {
                action: "seat a second player",
                status: self.status,
            });
        }
        self.second = Some(second);
        self.status = SessionStatus::Handshaking;
        tracing::debug!(session_id = %self.session_id, player_id = %second, "opponent claimed seat");
        Ok(())
    }

    /// Lays out the board. `Handshaking → InProgress`.
    pub fn start(&mut self) -> Result<&BoardState, GameError> {
        let second = match (self.status, self.second) {
            (SessionStatus::Handshaking, Some(second)) => second,
            _ => {
                return Err(GameError::InvalidState {
                    action: "start",
                    status: self.status,
                });
            }
        };
        self.status = SessionStatus::InProgress;
        Ok(self
            .board
            .insert(BoardState::new(self.dimension, [self.first, second])))
    }

    /// Applies a move that arrived from `sender`.
    ///
    /// Turn order, player identity and sequence are checked before the
    /// engine sees the move. Any failure aborts the session; the board is
    /// left exactly as it was.
    pub fn apply_move(&mut self, sender: PlayerId, mv: &Move) -> Result<MoveResult, GameError> {
        match self.check_move(sender, mv) {
            Ok(result) => Ok(result),
            Err(e) => {
                self.abort(e.abort_reason());
                Err(e)
            }
        }
    }

    fn check_move(&mut self, sender: PlayerId, mv: &Move) -> Result<MoveResult, GameError> {
        let board = match (&self.status, &self.board) {
            (SessionStatus::InProgress, Some(board)) => board,
            _ => {
                return Err(GameError::InvalidState {
                    action: "move",
                    status: self.status,
                });
            }
        };
        if mv.player != sender {
            return Err(GameError::PlayerMismatch {
                sender,
                claimed: mv.player,
            });
        }
        let Some(mark) = board.mark_of(sender) else {
            return Err(GameError::UnknownPlayer(sender));
        };
        if mark != board.turn {
            return Err(GameError::OutOfTurn(sender));
        }
        let seat = usize::from(mark == duelgrid_protocol::Mark::O);
        if let Some(last) = self.last_seq[seat] {
            if mv.seq <= last {
                return Err(GameError::StaleSequence { last, got: mv.seq });
            }
        }

        let next = self.engine.evaluate(board, mv)?;
        self.last_seq[seat] = Some(mv.seq);

        let result = match self.engine.status(&next) {
            GameStatus::Ongoing => MoveResult::Continue { state: next.clone() },
            GameStatus::Win(winner) => {
                let outcome = Outcome::Win { winner };
                self.status = SessionStatus::Completed { outcome };
                MoveResult::Finished {
                    outcome,
                    state: next.clone(),
                }
            }
            GameStatus::Draw => {
                self.status = SessionStatus::Completed {
                    outcome: Outcome::Draw,
                };
                MoveResult::Finished {
                    outcome: Outcome::Draw,
                    state: next.clone(),
                }
            }
        };
        self.board = Some(next);
        Ok(result)
    }

    /// Moves the session to `Aborted`. Returns `false` (and changes
    /// nothing) if it was already terminal.
    pub fn abort(&mut self, reason: AbortReason) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        tracing::debug!(session_id = %self.session_id, %reason, from = %self.status, "session aborted");
        self.status = SessionStatus::Aborted { reason };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TicTacToeEngine;
    use duelgrid_protocol::ID_LEN;

    const A: PlayerId = PlayerId::from_bytes([1; ID_LEN]);
    const B: PlayerId = PlayerId::from_bytes([2; ID_LEN]);

    fn started() -> GameSession<TicTacToeEngine> {
        let mut session = GameSession::new(
            SessionId::from_bytes([9; ID_LEN]),
            A,
            Arc::new(TicTacToeEngine),
            3,
        );
        session.claim(B).unwrap();
        session.start().unwrap();
        session
    }

    fn mv(player: PlayerId, position: u32, seq: u64) -> Move {
        Move { player, position, seq }
    }

    #[test]
    fn test_new_session_awaits_opponent() {
        let session = GameSession::new(SessionId::from_bytes([0; ID_LEN]), A, Arc::new(TicTacToeEngine), 3);
        assert_eq!(session.status(), SessionStatus::AwaitingOpponent);
        assert!(session.board().is_none());
    }

    #[test]
    fn test_start_without_claim_fails() {
        let mut session = GameSession::new(SessionId::from_bytes([0; ID_LEN]), A, Arc::new(TicTacToeEngine), 3);
        assert!(matches!(session.start(), Err(GameError::InvalidState { .. })));
    }

    #[test]
    fn test_claim_twice_fails() {
        let mut session = started();
        assert!(session.claim(B).is_err());
    }

    #[test]
    fn test_start_assigns_x_to_first_player() {
        let session = started();
        let board = session.board().unwrap();
        assert_eq!(board.current_player(), A);
        assert_eq!(session.status(), SessionStatus::InProgress);
    }

    #[test]
    fn test_apply_move_continue_flips_turn() {
        let mut session = started();
        let result = session.apply_move(A, &mv(A, 4, 1)).unwrap();
        let MoveResult::Continue { state } = result else {
            panic!("expected Continue");
        };
        assert_eq!(state.current_player(), B);
    }

    #[test]
    fn test_apply_move_out_of_turn_aborts_without_engine() {
        let mut session = started();
        let before = session.board().cloned();

        let err = session.apply_move(B, &mv(B, 0, 1)).unwrap_err();
        assert!(matches!(err, GameError::OutOfTurn(p) if p == B));
        assert_eq!(
            session.status(),
            SessionStatus::Aborted { reason: AbortReason::ProtocolViolation }
        );
        assert_eq!(session.board().cloned(), before);
    }

    #[test]
    fn test_apply_move_illegal_aborts_with_illegal_move() {
        let mut session = started();
        session.apply_move(A, &mv(A, 4, 1)).unwrap();
        let err = session.apply_move(B, &mv(B, 4, 1)).unwrap_err();
        assert!(matches!(err, GameError::Illegal(_)));
        assert_eq!(
            session.status(),
            SessionStatus::Aborted { reason: AbortReason::IllegalMove }
        );
    }

    #[test]
    fn test_apply_move_impersonation_aborts() {
        let mut session = started();
        let err = session.apply_move(B, &mv(A, 0, 1)).unwrap_err();
        assert!(matches!(err, GameError::PlayerMismatch { .. }));
        assert!(session.is_terminal());
    }

    #[test]
    fn test_apply_move_stranger_aborts() {
        let mut session = started();
        let stranger = PlayerId::from_bytes([3; ID_LEN]);
        let err = session.apply_move(stranger, &mv(stranger, 0, 1)).unwrap_err();
        assert!(matches!(err, GameError::UnknownPlayer(_)));
    }

    #[test]
    fn test_apply_move_repeated_sequence_aborts() {
        let mut session = started();
        session.apply_move(A, &mv(A, 0, 5)).unwrap();
        session.apply_move(B, &mv(B, 1, 1)).unwrap();
        let err = session.apply_move(A, &mv(A, 2, 5)).unwrap_err();
        assert!(matches!(err, GameError::StaleSequence { last: 5, got: 5 }));
    }

    #[test]
    fn test_apply_move_win_completes_session() {
        let mut session = started();
        for (i, (player, pos)) in [(A, 0), (B, 3), (A, 1), (B, 4)].into_iter().enumerate() {
            session.apply_move(player, &mv(player, pos, i as u64 + 1)).unwrap();
        }
        let result = session.apply_move(A, &mv(A, 2, 10)).unwrap();
        assert!(matches!(
            result,
            MoveResult::Finished { outcome: Outcome::Win { winner }, .. } if winner == A
        ));
        assert_eq!(
            session.status(),
            SessionStatus::Completed { outcome: Outcome::Win { winner: A } }
        );
    }

    #[test]
    fn test_apply_move_after_completion_leaves_status() {
        let mut session = started();
        for (i, (player, pos)) in [(A, 0), (B, 3), (A, 1), (B, 4), (A, 2)].into_iter().enumerate() {
            session.apply_move(player, &mv(player, pos, i as u64 + 1)).unwrap();
        }
        let completed = session.status();
        assert!(session.apply_move(B, &mv(B, 5, 20)).is_err());
        assert_eq!(session.status(), completed);
    }

    #[test]
    fn test_abort_is_terminal_and_sticky() {
        let mut session = started();
        assert!(session.abort(AbortReason::Timeout));
        assert!(!session.abort(AbortReason::Disconnected));
        assert_eq!(
            session.status(),
            SessionStatus::Aborted { reason: AbortReason::Timeout }
        );
    }

    #[test]
    fn test_abort_while_awaiting_opponent() {
        let mut session = GameSession::new(SessionId::from_bytes([0; ID_LEN]), A, Arc::new(TicTacToeEngine), 3);
        assert!(session.abort(AbortReason::Timeout));
        assert!(session.is_terminal());
    }
}
