//! Unified error type for the Duelgrid facade.

use duelgrid_channel::{ChannelError, HandshakeError};
use duelgrid_protocol::ProtocolError;
use duelgrid_session::{SessionError, StoreError};
use duelgrid_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum DuelgridError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Key exchange or key confirmation failed.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// An established channel failed (authentication, sequence, closed).
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// The client tried to move before the server assigned it an identity.
    #[error("not seated in a session yet")]
    NotSeated,
}
