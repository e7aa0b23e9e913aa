//! Error types for the protocol layer.
//!
//! Each crate in Duelgrid defines its own error enum. A `ProtocolError`
//! always means the bytes themselves were wrong: a codec failure, a
//! malformed hello, or a frame too short to hold its header.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields,
    /// wrong data types, or truncated messages.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// Fewer bytes than the layout requires.
    #[error("truncated message: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    /// The handshake names a key-encapsulation algorithm we don't speak.
    #[error("unsupported algorithm identifier {0:#04x}")]
    UnsupportedAlgorithm(u8),

    /// The handshake carries a protocol version we don't speak.
    #[error("unsupported handshake version {0}")]
    UnsupportedVersion(u8),

    /// The message is invalid at the protocol level.
    ///
    /// Bad magic bytes, an unexpected hello kind, trailing bytes, or an
    /// identifier that isn't 32 hex characters all land here.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
