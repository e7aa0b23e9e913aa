//! Session configuration.

use std::time::Duration;

/// Configuration for session behavior.
///
/// Controls timeouts, the authentication retry budget, and persistence
/// cadence. Start from `SessionConfig::default()` and override the fields
/// you care about.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a session may go without receiving a frame before it is
    /// aborted with `TIMEOUT`. Applies while waiting for an opponent too.
    ///
    /// Default: 60 seconds.
    pub idle_timeout: Duration,

    /// How long a new connection has to finish the key exchange and send
    /// its first sealed message.
    ///
    /// Default: 10 seconds.
    pub handshake_timeout: Duration,

    /// Frames per channel that may fail authentication before the session
    /// is aborted. A failed frame may mean tampering, so the default is 0.
    pub auth_retry_budget: u32,

    /// Side length of the board, between [`Self::MIN_BOARD_DIMENSION`] and
    /// [`Self::MAX_BOARD_DIMENSION`]. Default: 3.
    pub board_dimension: u8,

    /// Save the session record after every applied move, not only at the
    /// end. Default: false.
    pub checkpoint_moves: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(10),
            auth_retry_budget: 0,
            board_dimension: 3,
            checkpoint_moves: false,
        }
    }
}

/// A [`SessionConfig`] value that no session could run with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "board dimension {0} is outside {min}..={max}",
        min = SessionConfig::MIN_BOARD_DIMENSION,
        max = SessionConfig::MAX_BOARD_DIMENSION
    )]
    BoardDimension(u8),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

impl SessionConfig {
    /// Smallest board on which a game can take more than one move.
    pub const MIN_BOARD_DIMENSION: u8 = 3;

    /// Largest board accepted. Keeps every board message far below the
    /// transport's message size limit.
    pub const MAX_BOARD_DIMENSION: u8 = 16;

    /// Checks that every field is usable.
    ///
    /// Called by `SessionManager::new`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(Self::MIN_BOARD_DIMENSION..=Self::MAX_BOARD_DIMENSION).contains(&self.board_dimension) {
            return Err(ConfigError::BoardDimension(self.board_dimension));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("idle_timeout"));
        }
        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("handshake_timeout"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_ok() {
        assert_eq!(SessionConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_validate_board_dimension_out_of_range_rejected() {
        for dimension in [0, 1, 2, 17, u8::MAX] {
            let config = SessionConfig {
                board_dimension: dimension,
                ..SessionConfig::default()
            };
            assert_eq!(config.validate(), Err(ConfigError::BoardDimension(dimension)));
        }
        let largest = SessionConfig {
            board_dimension: SessionConfig::MAX_BOARD_DIMENSION,
            ..SessionConfig::default()
        };
        assert_eq!(largest.validate(), Ok(()));
    }

    #[test]
    fn test_validate_zero_timeout_rejected() {
        let config = SessionConfig {
            handshake_timeout: Duration::ZERO,
            ..SessionConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroTimeout("handshake_timeout"))
        );
    }
}
