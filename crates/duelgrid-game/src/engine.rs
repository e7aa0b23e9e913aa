//! The `BoardEngine` trait: the rules boundary.
//!
//! Sessions never decide what a legal move is or who has won; they hand a
//! board and a move to an engine and act on the answer. Engines are pure:
//! no interior state, safe to call from any number of sessions at once.

use duelgrid_protocol::{BoardState, Move, PlayerId};

/// What the engine says about a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameStatus {
    Ongoing,
    Win(PlayerId),
    Draw,
}

/// Why the engine rejected a move.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IllegalMove {
    #[error("position {position} is off a board of {cells} cells")]
    OutOfBounds { position: u32, cells: usize },

    #[error("position {0} is already taken")]
    Occupied(u32),

    #[error("player {0} does not hold the turn")]
    WrongPlayer(PlayerId),

    #[error("the game is already decided")]
    GameOver,
}

/// Evaluates moves and reports terminal positions.
///
/// Implementations must not retain the board they're given.
pub trait BoardEngine: Send + Sync + 'static {
    /// Applies `mv` to `board`, returning the next board.
    fn evaluate(&self, board: &BoardState, mv: &Move) -> Result<BoardState, IllegalMove>;

    /// Reports whether `board` is won, drawn, or still open.
    fn status(&self, board: &BoardState) -> GameStatus;
}

/// Tic-tac-toe on any square board: a full row, column or diagonal wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct TicTacToeEngine;

impl BoardEngine for TicTacToeEngine {
    fn evaluate(&self, board: &BoardState, mv: &Move) -> Result<BoardState, IllegalMove> {
        if self.status(board) != GameStatus::Ongoing {
            return Err(IllegalMove::GameOver);
        }
        if mv.player != board.current_player() {
            return Err(IllegalMove::WrongPlayer(mv.player));
        }
        let index = mv.position as usize;
        match board.cells.get(index) {
            None => {
                return Err(IllegalMove::OutOfBounds {
                    position: mv.position,
                    cells: board.cells.len(),
                });
            }
            Some(Some(_)) => return Err(IllegalMove::Occupied(mv.position)),
            Some(None) => {}
        }

        let mut next = board.clone();
        next.cells[index] = Some(board.turn);
        next.turn = board.turn.other();
        next.move_count += 1;
        Ok(next)
    }

    fn status(&self, board: &BoardState) -> GameStatus {
        let n = usize::from(board.dimension);
        let at = |row: usize, col: usize| board.cells.get(row * n + col).copied().flatten();

        let mut lines: Vec<Vec<(usize, usize)>> = Vec::with_capacity(2 * n + 2);
        for i in 0..n {
            lines.push((0..n).map(|j| (i, j)).collect()); // row
            lines.push((0..n).map(|j| (j, i)).collect()); // column
        }
        lines.push((0..n).map(|i| (i, i)).collect());
        lines.push((0..n).map(|i| (i, n - 1 - i)).collect());

        for line in &lines {
            let Some(&(r0, c0)) = line.first() else { continue };
            if let Some(mark) = at(r0, c0) {
                if line.iter().all(|&(r, c)| at(r, c) == Some(mark)) {
                    return GameStatus::Win(board.player_for(mark));
                }
            }
        }

        if board.cells.iter().all(Option::is_some) {
            GameStatus::Draw
        } else {
            GameStatus::Ongoing
        }
    }
}
