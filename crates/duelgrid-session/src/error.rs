//! Error types for the session layer.

use duelgrid_channel::{ChannelError, HandshakeError};
use duelgrid_protocol::SessionId;

use crate::{ConfigError, StoreError};

/// Errors that can occur while admitting connections or managing sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session configuration was rejected.
    #[error("invalid session config: {0}")]
    Config(#[from] ConfigError),

    /// The key exchange or key confirmation failed. No session was
    /// created for the connection.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// The connection didn't finish the handshake in time.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// The first sealed message wasn't a `Hello`.
    #[error("expected Hello, got {0}")]
    UnexpectedMessage(&'static str),

    /// Sending on an established channel failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// No live or persisted session has this ID.
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The session's actor is gone.
    #[error("session {0} is unavailable")]
    Unavailable(SessionId),

    /// The persistence collaborator failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
