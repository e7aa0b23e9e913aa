//! Move providers for automated participants.

use duelgrid_protocol::{BoardState, Move, PlayerId};
use rand::seq::IndexedRandom;

use crate::{BoardEngine, GameStatus, TicTacToeEngine};

/// Picks moves on behalf of a participant with no network connection.
///
/// Called synchronously by the session actor whenever the automated side
/// holds the turn. The returned move still goes through the board engine.
pub trait MoveProvider: Send + Sync + 'static {
    fn next_move(&self, board: &BoardState, player: PlayerId) -> Move;

    /// Short name for logs.
    fn name(&self) -> &'static str {
        "automated"
    }
}

/// Plays a uniformly random open cell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomMove;

impl MoveProvider for RandomMove {
    fn next_move(&self, board: &BoardState, player: PlayerId) -> Move {
        let open = board.open_positions();
        let position = open.choose(&mut rand::rng()).copied().unwrap_or(0);
        automated_move(board, player, position)
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Plays the lowest-numbered open cell. Deterministic, which makes it
/// handy in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstAvailable;

impl MoveProvider for FirstAvailable {
    fn next_move(&self, board: &BoardState, player: PlayerId) -> Move {
        let position = board.open_positions().first().copied().unwrap_or(0);
        automated_move(board, player, position)
    }

    fn name(&self) -> &'static str {
        "first-available"
    }
}

/// Searches the game tree with alpha-beta pruning and plays the best cell.
///
/// Wins score `100 - depth` and losses `depth - 100`, so a quicker win is
/// preferred over a slower one and a loss is put off as long as possible.
/// Positions at `max_depth` count as draws. The default depth covers a
/// whole 3×3 game; larger boards want a smaller one.
#[derive(Debug, Clone, Copy)]
pub struct MinimaxMove<E = TicTacToeEngine> {
    engine: E,
    max_depth: u32,
}

const WIN_SCORE: i32 = 100;

impl<E: BoardEngine> MinimaxMove<E> {
    pub const DEFAULT_MAX_DEPTH: u32 = 9;

    pub fn new(engine: E) -> Self {
        Self {
            engine,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }

    /// Stops searching `depth` plies below the current position.
    pub fn with_max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    fn play(&self, board: &BoardState, position: u32) -> Option<BoardState> {
        let mv = automated_move(board, board.current_player(), position);
        self.engine.evaluate(board, &mv).ok()
    }

    fn search(
        &self,
        board: &BoardState,
        maximizer: PlayerId,
        depth: u32,
        mut alpha: i32,
        mut beta: i32,
    ) -> i32 {
        let plies = i32::try_from(depth).unwrap_or(WIN_SCORE);
        match self.engine.status(board) {
            GameStatus::Win(winner) if winner == maximizer => return WIN_SCORE - plies,
            GameStatus::Win(_) => return plies - WIN_SCORE,
            GameStatus::Draw => return 0,
            GameStatus::Ongoing if depth >= self.max_depth => return 0,
            GameStatus::Ongoing => {}
        }

        let maximizing = board.current_player() == maximizer;
        let mut best: Option<i32> = None;
        for position in board.open_positions() {
            let Some(next) = self.play(board, position) else {
                continue;
            };
            let score = self.search(&next, maximizer, depth + 1, alpha, beta);
            if maximizing {
                let value = best.map_or(score, |b| b.max(score));
                best = Some(value);
                alpha = alpha.max(value);
            } else {
                let value = best.map_or(score, |b| b.min(score));
                best = Some(value);
                beta = beta.min(value);
            }
            if alpha >= beta {
                break;
            }
        }
        best.unwrap_or(0)
    }
}

impl Default for MinimaxMove {
    fn default() -> Self {
        Self::new(TicTacToeEngine)
    }
}

impl<E: BoardEngine> MoveProvider for MinimaxMove<E> {
    fn next_move(&self, board: &BoardState, player: PlayerId) -> Move {
        let mut best: Option<(i32, u32)> = None;
        let mut alpha = i32::MIN;
        for position in board.open_positions() {
            let Some(next) = self.play(board, position) else {
                continue;
            };
            let score = self.search(&next, player, 1, alpha, i32::MAX);
            tracing::trace!(player_id = %player, position, score, "minimax candidate");
            if best.is_none_or(|(top, _)| score > top) {
                best = Some((score, position));
                alpha = alpha.max(score);
            }
        }
        let position = best
            .map(|(_, position)| position)
            .or_else(|| board.open_positions().first().copied())
            .unwrap_or(0);
        automated_move(board, player, position)
    }

    fn name(&self) -> &'static str {
        "minimax"
    }
}

// Automated moves never travel in a frame, so the board's move counter
// stands in for the sequence number. It increases with every move.
fn automated_move(board: &BoardState, player: PlayerId, position: u32) -> Move {
    Move {
        player,
        position,
        seq: u64::from(board.move_count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duelgrid_protocol::{ID_LEN, Mark};

    const X: PlayerId = PlayerId::from_bytes([1; ID_LEN]);
    const O: PlayerId = PlayerId::from_bytes([2; ID_LEN]);

    #[test]
    fn test_first_available_skips_taken_cells() {
        let mut board = BoardState::new(3, [X, O]);
        board.cells[0] = Some(Mark::X);
        board.cells[1] = Some(Mark::O);
        board.move_count = 2;

        let mv = FirstAvailable.next_move(&board, X);
        assert_eq!(mv.position, 2);
        assert_eq!(mv.player, X);
        assert_eq!(mv.seq, 2);
    }

    fn board(cells: &str, turn: Mark) -> BoardState {
        let mut board = BoardState::new(3, [X, O]);
        for (i, c) in cells.chars().enumerate() {
            board.cells[i] = match c {
                'X' => Some(Mark::X),
                'O' => Some(Mark::O),
                _ => None,
            };
        }
        board.move_count = board.cells.iter().flatten().count() as u32;
        board.turn = turn;
        board
    }

    #[test]
    fn test_minimax_takes_immediate_win() {
        // X: 0, 4. O: 3, 6. X to move; 8 completes the diagonal.
        let b = board("X__OX_O__", Mark::X);
        assert_eq!(MinimaxMove::default().next_move(&b, X).position, 8);
    }

    #[test]
    fn test_minimax_blocks_opponent_win() {
        let b = board("XX_O_____", Mark::O);
        let mv = MinimaxMove::default().next_move(&b, O);
        assert_eq!(mv.position, 2);
        assert_eq!(mv.player, O);
    }

    #[test]
    fn test_minimax_prefers_win_over_block() {
        // Both sides threaten; X wins at 2 instead of blocking at 5.
        let b = board("XX_OO____", Mark::X);
        assert_eq!(MinimaxMove::default().next_move(&b, X).position, 2);
    }

    #[test]
    fn test_minimax_self_play_draws() {
        let engine = TicTacToeEngine;
        let bot = MinimaxMove::default();
        let mut b = BoardState::new(3, [X, O]);
        while engine.status(&b) == GameStatus::Ongoing {
            let mv = bot.next_move(&b, b.current_player());
            b = engine.evaluate(&b, &mv).unwrap();
        }
        assert_eq!(engine.status(&b), GameStatus::Draw);
        assert_eq!(b.move_count, 9);
    }

    #[test]
    fn test_minimax_shallow_depth_still_legal() {
        let b = BoardState::new(4, [X, O]);
        let mv = MinimaxMove::default().with_max_depth(2).next_move(&b, X);
        assert!(b.is_open(mv.position));
    }

    #[test]
    fn test_random_move_always_picks_open_cell() {
        let mut board = BoardState::new(3, [X, O]);
        for p in 0..8 {
            board.cells[p] = Some(Mark::X);
        }
        for _ in 0..20 {
            assert_eq!(RandomMove.next_move(&board, O).position, 8);
        }
    }
}
