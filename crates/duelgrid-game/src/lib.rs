//! Game rules and the per-game state machine for Duelgrid.
//!
//! # Key types
//!
//! - [`BoardEngine`]: evaluates moves and reports win/draw; the rules
//!   live behind this trait ([`TicTacToeEngine`] ships in-process)
//! - [`MoveProvider`]: picks moves for automated participants
//!   ([`RandomMove`], [`FirstAvailable`], [`MinimaxMove`])
//! - [`GameSession`]: one game's status, board, and turn enforcement
//! - [`GameError`]: why a move was refused, and the abort it caused

mod engine;
mod error;
mod provider;
mod session;

pub use engine::{BoardEngine, GameStatus, IllegalMove, TicTacToeEngine};
pub use error::GameError;
pub use provider::{FirstAvailable, MinimaxMove, MoveProvider, RandomMove};
pub use session::{GameSession, MoveResult};
