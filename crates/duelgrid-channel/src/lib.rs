//! Key exchange and secure channel for Duelgrid.
//!
//! A connection becomes a secure channel in two steps:
//!
//! 1. **Handshake** ([`server_handshake`], [`client_handshake`]). The
//!    server offers an ML-KEM public key from its [`KeyRing`]; the client
//!    encapsulates a fresh secret against it ([`initiate`]) and the server
//!    recovers it ([`respond`]). Both sides feed the secret and a hash of
//!    the two hellos through HKDF ([`derive_session_keys`]) to get one key
//!    per direction.
//! 2. **Channel** ([`SecureSender`], [`SecureReceiver`]). Every message is
//!    sealed with ChaCha20-Poly1305 under a per-direction sequence number
//!    ([`ChannelCipher`]). Receivers accept exactly the next sequence
//!    number, so gaps, reordering and replays are all rejected.
//!
//! Handshake failures are fatal ([`HandshakeError`]). Channel
//! authentication failures drop the frame and count against a retry
//! budget, which defaults to zero ([`ChannelError`]). Within the budget the
//! peer recovers by resending from the dropped frame
//! ([`SecureSender::resend`]).

mod channel;
mod cipher;
mod error;
mod handshake;
mod kem;

pub use channel::{RESEND_WINDOW, SecureReceiver, SecureSender};
pub use cipher::{ChannelCipher, KEY_LEN, SessionKey};
pub use error::{ChannelError, HandshakeError};
pub use handshake::{
    SessionKeys, client_handshake, derive_session_keys, server_handshake, transcript_hash,
};
pub use kem::{
    KeyPolicy, KeyRing, SHARED_SECRET_LEN, ServerKeyPair, SharedSecret, initiate, respond,
};
