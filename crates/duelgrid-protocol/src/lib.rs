//! Wire protocol for Duelgrid.
//!
//! This crate defines the "language" that clients and servers speak:
//!
//! - **Types** ([`PlayerId`], [`BoardState`], [`Move`], [`SessionStatus`],
//!   etc.): the values games are made of.
//! - **Messages** ([`ClientMessage`], [`ServerMessage`]): what travels
//!   inside a sealed frame once the handshake is done.
//! - **Handshake** ([`ServerHello`], [`ClientHello`]): the two plaintext
//!   messages exchanged before any key exists.
//! - **Frames** ([`Frame`]): the body layout of a sealed message.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong while doing so.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (whole messages) and the
//! secure channel. It doesn't know about connections, keys or sessions; it
//! only knows how bytes are laid out.
//!
//! ```text
//! Transport (bytes) → Protocol (hello / frame layout) → Channel (AEAD)
//!                                                      → Codec (messages)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod frame;
mod handshake;
mod messages;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use frame::{Frame, MIN_FRAME_LEN, SEQ_LEN, TAG_LEN};
pub use handshake::{ClientHello, HANDSHAKE_VERSION, KemAlgorithm, ServerHello};
pub use messages::{ClientMessage, Opponent, ServerMessage};
pub use types::{
    AbortReason, BoardState, ID_LEN, Mark, Move, Outcome, PlayerId, SessionId,
    SessionStatus,
};
