//! Core protocol types: identities, the board, moves, and session status.
//!
//! Everything here travels inside sealed frames (or is persisted in a
//! session record), so every type derives `Serialize`/`Deserialize` and the
//! serde attributes pin down the exact JSON shape clients see.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Length in bytes of every opaque identifier (128 bits).
pub const ID_LEN: usize = 16;

/// Defines a 128-bit opaque identifier newtype.
///
/// Identifiers are random tokens, not counters, so they're compared and
/// hashed as raw bytes and rendered as 32 lowercase hex characters.
/// `#[serde(into/try_from = "String")]` makes the JSON form that same hex
/// string rather than an array of 16 numbers.
macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(into = "String", try_from = "String")]
        pub struct $name([u8; ID_LEN]);

        impl $name {
            /// Wraps raw identifier bytes.
            pub const fn from_bytes(bytes: [u8; ID_LEN]) -> Self {
                Self(bytes)
            }

            /// Returns the raw identifier bytes.
            pub fn as_bytes(&self) -> &[u8; ID_LEN] {
                &self.0
            }

            /// Renders the identifier as 32 lowercase hex characters.
            pub fn to_hex(&self) -> String {
                self.0.iter().map(|b| format!("{b:02x}")).collect()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $label, self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = ProtocolError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_hex_id(s).map(Self)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.to_hex()
            }
        }

        impl TryFrom<String> for $name {
            type Error = ProtocolError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }
    };
}

opaque_id!(
    /// Opaque, unguessable identifier for one connected participant.
    ///
    /// Issued once per connection by the identity issuer and never
    /// reassigned.
    PlayerId,
    "PlayerId"
);

opaque_id!(
    /// Opaque identifier for one game session; the registry key.
    SessionId,
    "SessionId"
);

fn parse_hex_id(s: &str) -> Result<[u8; ID_LEN], ProtocolError> {
    if s.len() != ID_LEN * 2 || !s.is_ascii() {
        return Err(ProtocolError::InvalidMessage(format!(
            "identifier must be {} hex characters",
            ID_LEN * 2
        )));
    }
    let mut out = [0u8; ID_LEN];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| {
            ProtocolError::InvalidMessage(format!("identifier is not hex: {s:?}"))
        })?;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// A player's marker on the board. X always moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mark {
    X,
    O,
}

impl Mark {
    /// The opposing marker.
    pub fn other(self) -> Mark {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }

    fn index(self) -> usize {
        match self {
            Mark::X => 0,
            Mark::O => 1,
        }
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mark::X => f.write_str("X"),
            Mark::O => f.write_str("O"),
        }
    }
}

/// Snapshot of one game's board between turns.
///
/// Cells are stored row-major: position `p` is row `p / dimension`,
/// column `p % dimension`. `players[0]` plays X, `players[1]` plays O.
///
/// ```text
///  0 | 1 | 2
/// ---+---+---
///  3 | 4 | 5
/// ---+---+---
///  6 | 7 | 8
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardState {
    /// Side length of the square grid.
    pub dimension: u8,
    /// Grid contents, `dimension * dimension` entries.
    pub cells: Vec<Option<Mark>>,
    /// The two participants, indexed by mark.
    pub players: [PlayerId; 2],
    /// Whose turn it is.
    pub turn: Mark,
    /// Number of moves applied so far.
    pub move_count: u32,
}

impl BoardState {
    /// Creates an empty board with X to move.
    pub fn new(dimension: u8, players: [PlayerId; 2]) -> Self {
        let size = usize::from(dimension) * usize::from(dimension);
        Self {
            dimension,
            cells: vec![None; size],
            players,
            turn: Mark::X,
            move_count: 0,
        }
    }

    /// The player holding the turn.
    pub fn current_player(&self) -> PlayerId {
        self.player_for(self.turn)
    }

    /// The player who plays `mark`.
    pub fn player_for(&self, mark: Mark) -> PlayerId {
        self.players[mark.index()]
    }

    /// The mark `player` plays, if they're in this game.
    pub fn mark_of(&self, player: PlayerId) -> Option<Mark> {
        if self.players[0] == player {
            Some(Mark::X)
        } else if self.players[1] == player {
            Some(Mark::O)
        } else {
            None
        }
    }

    /// Returns `true` if `position` is on the board and empty.
    pub fn is_open(&self, position: u32) -> bool {
        matches!(self.cells.get(position as usize), Some(None))
    }

    /// All empty positions, in ascending order.
    pub fn open_positions(&self) -> Vec<u32> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_none())
            .map(|(i, _)| i as u32)
            .collect()
    }
}

/// One move as submitted by a participant.
///
/// `seq` must equal the channel sequence number of the frame that carried
/// the move; the server rejects anything else as a protocol violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub player: PlayerId,
    pub position: u32,
    pub seq: u64,
}

// ---------------------------------------------------------------------------
// Session status
// ---------------------------------------------------------------------------

/// How a completed game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Win { winner: PlayerId },
    Draw,
}

/// Why a session was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AbortReason {
    /// No frame arrived within the idle window.
    Timeout,
    /// A participant's connection dropped or they left.
    Disconnected,
    /// Out-of-turn move, malformed move frame, or a move whose sequence
    /// number doesn't match its frame.
    ProtocolViolation,
    /// The board engine rejected a well-formed move.
    IllegalMove,
    /// Channel authentication failures exceeded the retry budget.
    AuthenticationFailure,
    /// An operator terminated the session.
    Terminated,
    /// The server is shutting down.
    Shutdown,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AbortReason::Timeout => "TIMEOUT",
            AbortReason::Disconnected => "DISCONNECTED",
            AbortReason::ProtocolViolation => "PROTOCOL_VIOLATION",
            AbortReason::IllegalMove => "ILLEGAL_MOVE",
            AbortReason::AuthenticationFailure => "AUTHENTICATION_FAILURE",
            AbortReason::Terminated => "TERMINATED",
            AbortReason::Shutdown => "SHUTDOWN",
        };
        f.write_str(s)
    }
}

/// Lifecycle state of a session.
///
/// ```text
/// AwaitingOpponent → Handshaking → InProgress → Completed
///         │               │            │
///         └───────────────┴────────────┴──────→ Aborted
/// ```
///
/// `Completed` and `Aborted` are terminal: once reached, the status never
/// changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// One participant connected, waiting for a second.
    AwaitingOpponent,
    /// A second participant has been paired in; the game is being set up.
    Handshaking,
    /// Moves are being exchanged.
    InProgress,
    /// The board engine reported a win or draw.
    Completed { outcome: Outcome },
    /// The session ended early.
    Aborted { reason: AbortReason },
}

impl SessionStatus {
    /// Returns `true` for `Completed` and `Aborted`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed { .. } | SessionStatus::Aborted { .. }
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::AwaitingOpponent => f.write_str("AWAITING_OPPONENT"),
            SessionStatus::Handshaking => f.write_str("HANDSHAKING"),
            SessionStatus::InProgress => f.write_str("IN_PROGRESS"),
            SessionStatus::Completed { outcome: Outcome::Draw } => {
                f.write_str("COMPLETED(DRAW)")
            }
            SessionStatus::Completed {
                outcome: Outcome::Win { winner },
            } => write!(f, "COMPLETED(WIN {winner})"),
            SessionStatus::Aborted { reason } => write!(f, "ABORTED({reason})"),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(n: u8) -> PlayerId {
        PlayerId::from_bytes([n; ID_LEN])
    }

    // =====================================================================
    // Identifiers
    // =====================================================================

    #[test]
    fn test_player_id_serializes_as_hex_string() {
        let json = serde_json::to_string(&pid(0xab)).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(16)));
    }

    #[test]
    fn test_session_id_parses_its_own_display() {
        let id = SessionId::from_bytes([1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16]);
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_id_parse_wrong_length_returns_error() {
        let result: Result<PlayerId, _> = "abcd".parse();
        assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn test_id_parse_non_hex_returns_error() {
        let result: Result<PlayerId, _> = "zz".repeat(16).parse();
        assert!(result.is_err());
    }

    #[test]
    fn test_id_deserialize_rejects_garbage() {
        let result: Result<SessionId, _> = serde_json::from_str("\"not-an-id\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_id_debug_names_the_type() {
        assert!(format!("{:?}", pid(0)).starts_with("PlayerId("));
    }

    // =====================================================================
    // BoardState
    // =====================================================================

    #[test]
    fn test_board_new_is_empty_with_x_to_move() {
        let board = BoardState::new(3, [pid(1), pid(2)]);
        assert_eq!(board.cells.len(), 9);
        assert!(board.cells.iter().all(Option::is_none));
        assert_eq!(board.turn, Mark::X);
        assert_eq!(board.current_player(), pid(1));
        assert_eq!(board.move_count, 0);
    }

    #[test]
    fn test_board_mark_of_maps_players() {
        let board = BoardState::new(3, [pid(1), pid(2)]);
        assert_eq!(board.mark_of(pid(1)), Some(Mark::X));
        assert_eq!(board.mark_of(pid(2)), Some(Mark::O));
        assert_eq!(board.mark_of(pid(3)), None);
    }

    #[test]
    fn test_board_is_open_rejects_off_board_and_occupied() {
        let mut board = BoardState::new(3, [pid(1), pid(2)]);
        board.cells[4] = Some(Mark::X);
        assert!(board.is_open(0));
        assert!(!board.is_open(4));
        assert!(!board.is_open(9));
        assert_eq!(board.open_positions().len(), 8);
    }

    // =====================================================================
    // Status
    // =====================================================================

    #[test]
    fn test_status_terminal_variants() {
        assert!(!SessionStatus::AwaitingOpponent.is_terminal());
        assert!(!SessionStatus::Handshaking.is_terminal());
        assert!(!SessionStatus::InProgress.is_terminal());
        assert!(SessionStatus::Completed { outcome: Outcome::Draw }.is_terminal());
        assert!(
            SessionStatus::Aborted { reason: AbortReason::Timeout }.is_terminal()
        );
    }

    #[test]
    fn test_status_json_shape() {
        let status = SessionStatus::Aborted { reason: AbortReason::Timeout };
        let json: serde_json::Value = serde_json::to_value(status).unwrap();
        assert_eq!(json["status"], "ABORTED");
        assert_eq!(json["reason"], "TIMEOUT");
    }

    #[test]
    fn test_outcome_win_json_shape() {
        let outcome = Outcome::Win { winner: pid(9) };
        let json: serde_json::Value = serde_json::to_value(outcome).unwrap();
        assert_eq!(json["result"], "WIN");
        assert_eq!(json["winner"], "09".repeat(16));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SessionStatus::InProgress.to_string(), "IN_PROGRESS");
        assert_eq!(
            SessionStatus::Aborted { reason: AbortReason::Disconnected }.to_string(),
            "ABORTED(DISCONNECTED)"
        );
    }
}
