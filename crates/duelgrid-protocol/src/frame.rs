//! Sealed frame body layout.
//!
//! ```text
//! +-------------+----------------+-----------+
//! | seq u64 BE  | ciphertext     | tag       |
//! | 8 B         | plaintext len  | 16 B      |
//! +-------------+----------------+-----------+
//! ```
//!
//! The 4-byte length prefix in front of this is added by the stream
//! transport. The sequence number travels in the clear; it's bound to the
//! payload as AEAD associated data.

use crate::ProtocolError;

/// Size of the sequence-number header.
pub const SEQ_LEN: usize = 8;
/// Size of the AEAD authentication tag.
pub const TAG_LEN: usize = 16;
/// Smallest valid frame body: header plus tag, empty plaintext.
pub const MIN_FRAME_LEN: usize = SEQ_LEN + TAG_LEN;

/// A sealed frame as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sender-side sequence number.
    pub seq: u64,
    /// Ciphertext with the tag appended.
    pub sealed: Vec<u8>,
}

impl Frame {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SEQ_LEN + self.sealed.len());
        out.extend_from_slice(&self.seq.to_be_bytes());
        out.extend_from_slice(&self.sealed);
        out
    }

    /// Splits a frame body into sequence number and sealed payload.
    ///
    /// # Errors
    /// `ProtocolError::Truncated` when the body can't hold a header and a
    /// tag.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < MIN_FRAME_LEN {
            return Err(ProtocolError::Truncated {
                needed: MIN_FRAME_LEN,
                got: data.len(),
            });
        }
        let (header, sealed) = data.split_at(SEQ_LEN);
        let mut seq = [0u8; SEQ_LEN];
        seq.copy_from_slice(header);
        Ok(Self {
            seq: u64::from_be_bytes(seq),
            sealed: sealed.to_vec(),
        })
    }

    /// The associated data the tag is computed over.
    pub fn aad(seq: u64) -> [u8; SEQ_LEN] {
        seq.to_be_bytes()
    }
}
