//! One direction of the secure channel: ChaCha20-Poly1305 with an exact
//! next-sequence rule.
//!
//! The nonce is `0u32 || seq` (big-endian) and the sequence bytes are the
//! associated data, so a frame only opens under the key and sequence
//! number it was sealed with. The counter advances only after a frame has
//! sealed or opened successfully.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use duelgrid_protocol::Frame;
use zeroize::Zeroize;

use crate::ChannelError;

/// Length of a direction key.
pub const KEY_LEN: usize = 32;

/// A 256-bit key for one direction. Wiped on drop.
pub struct SessionKey([u8; KEY_LEN]);

impl SessionKey {
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Seals or opens frames for one direction of a channel.
///
/// A sending side only calls [`seal`](Self::seal); a receiving side only
/// calls [`open`](Self::open). Each keeps its own counter starting at 0.
pub struct ChannelCipher {
    aead: ChaCha20Poly1305,
    next_seq: u64,
}

impl ChannelCipher {
    pub fn new(key: &SessionKey) -> Self {
        Self {
            aead: ChaCha20Poly1305::new(Key::from_slice(key.as_bytes())),
            next_seq: 0,
        }
    }

    /// The sequence number the next frame will carry (or must carry).
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Encrypts `plaintext` under the next sequence number.
    ///
    /// # Errors
    /// `SequenceExhausted` once the counter can't advance.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Frame, ChannelError> {
        let seq = self.next_seq;
        let next = seq.checked_add(1).ok_or(ChannelError::SequenceExhausted)?;
        let aad = Frame::aad(seq);
        let sealed = self
            .aead
            .encrypt(
                Nonce::from_slice(&nonce(seq)),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            // Only fails for plaintexts beyond the cipher's length limit.
            .map_err(|_| ChannelError::SequenceExhausted)?;
        self.next_seq = next;
        Ok(Frame { seq, sealed })
    }

    /// Verifies and decrypts `frame`.
    ///
    /// # Errors
    /// `Sequence` if the frame isn't exactly the next one; `Authentication`
    /// if the tag doesn't verify. Neither advances the counter.
    pub fn open(&mut self, frame: &Frame) -> Result<Vec<u8>, ChannelError> {
        if frame.seq != self.next_seq {
            return Err(ChannelError::Sequence {
                expected: self.next_seq,
                got: frame.seq,
            });
        }
        let next = frame
            .seq
            .checked_add(1)
            .ok_or(ChannelError::SequenceExhausted)?;
        let aad = Frame::aad(frame.seq);
        let plaintext = self
            .aead
            .decrypt(
                Nonce::from_slice(&nonce(frame.seq)),
                Payload {
                    msg: &frame.sealed,
                    aad: &aad,
                },
            )
            .map_err(|_| ChannelError::Authentication { seq: frame.seq })?;
        self.next_seq = next;
        Ok(plaintext)
    }
}

fn nonce(seq: u64) -> [u8; 12] {
    let mut out = [0u8; 12];
    out[4..].copy_from_slice(&seq.to_be_bytes());
    out
}
