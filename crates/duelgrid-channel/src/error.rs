//! Error types for the handshake and the secure channel.

use duelgrid_protocol::{KemAlgorithm, ProtocolError};
use duelgrid_transport::TransportError;

/// Reasons a handshake fails. Every one of them is fatal for the
/// connection: nothing is retried and no session is created.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A hello was malformed or named an algorithm we don't speak.
    #[error("malformed hello: {0}")]
    Hello(#[from] ProtocolError),

    /// The peer hung up before the handshake finished.
    #[error("peer closed the connection during the handshake")]
    Closed,

    /// The client answered with a different algorithm than offered.
    #[error("algorithm mismatch: offered {offered}, got {got}")]
    AlgorithmMismatch {
        offered: KemAlgorithm,
        got: KemAlgorithm,
    },

    /// The client encapsulated against a key we didn't offer.
    #[error("unknown key id {0}")]
    UnknownKey(u32),

    /// Public key or encapsulation bytes didn't parse for the algorithm.
    #[error("malformed {0}")]
    MalformedKeyMaterial(&'static str),

    /// Encapsulation or decapsulation failed.
    #[error("key encapsulation failed")]
    Encapsulation,

    /// HKDF refused to expand the secret.
    #[error("key derivation failed")]
    KeyDerivation,

    /// The first sealed frame didn't open, so the two sides derived
    /// different keys.
    #[error("key confirmation failed: {0}")]
    Confirmation(#[source] ChannelError),
}

/// Errors raised while sealing, opening, sending or receiving frames.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The peer closed the connection.
    #[error("channel closed by peer")]
    Closed,

    /// The frame body is too short to hold a header and tag.
    #[error("malformed frame: {0}")]
    MalformedFrame(#[source] ProtocolError),

    /// The tag did not verify for this sequence number.
    #[error("authentication failed for frame {seq}")]
    Authentication { seq: u64 },

    /// The frame is not the next one expected (gap, reorder or replay).
    #[error("sequence violation: expected {expected}, got {got}")]
    Sequence { expected: u64, got: u64 },

    /// A frame failed and was dropped within the retry budget. The peer
    /// has to resend from `expected` before anything else opens.
    #[error("frame dropped ({failures} so far), expecting a resend from {expected}")]
    FrameDropped { expected: u64, failures: u32 },

    /// The peer asked for a frame that is no longer retained.
    #[error("frame {seq} cannot be resent")]
    ResendUnavailable { seq: u64 },

    /// More frames failed authentication than the retry budget allows.
    #[error("{failures} frames failed authentication, retry budget exhausted")]
    RetryBudgetExhausted { failures: u32 },

    /// This direction has used every sequence number.
    #[error("sequence space exhausted")]
    SequenceExhausted,

    /// The plaintext opened fine but isn't a valid message.
    #[error("undecodable payload: {0}")]
    Decode(#[source] ProtocolError),

    /// The plaintext couldn't be encoded.
    #[error("unencodable payload: {0}")]
    Encode(#[source] ProtocolError),
}

impl ChannelError {
    /// Returns `true` for failures that count against the retry budget:
    /// bad tags, bad sequence numbers and unparseable frame bodies.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            ChannelError::Authentication { .. }
                | ChannelError::Sequence { .. }
                | ChannelError::MalformedFrame(_)
        )
    }
}
