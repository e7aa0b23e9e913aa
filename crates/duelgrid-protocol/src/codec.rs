//! Codec trait and implementations for serializing/deserializing messages.
//!
//! After the handshake every frame's plaintext is an application message
//! ([`ClientMessage`](crate::ClientMessage) or
//! [`ServerMessage`](crate::ServerMessage)) run through a [`Codec`]. The
//! secure channel never looks inside the plaintext, so the format can be
//! swapped without touching the framing.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because one codec value is shared by every
/// session task on the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON keeps sealed payloads easy to inspect once decrypted, which is
/// what you want while a client implementation is being brought up.
///
/// ```rust
/// use duelgrid_protocol::{ClientMessage, Codec, JsonCodec, Opponent};
///
/// let codec = JsonCodec;
/// let hello = ClientMessage::Hello { opponent: Opponent::Human, resume: None };
///
/// let bytes = codec.encode(&hello).unwrap();
/// let decoded: ClientMessage = codec.decode(&bytes).unwrap();
/// assert_eq!(hello, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
