//! The two halves of an established secure channel.
//!
//! A handshake yields a [`SecureSender`] and a [`SecureReceiver`] sharing
//! one [`Connection`]. They are separate values so a reader task can sit in
//! `recv` while other code sends.
//!
//! A dropped frame is recovered by resending: the receiver reports the
//! sequence number it still expects ([`ChannelError::FrameDropped`]), the
//! application asks the peer for it, and the peer's [`SecureSender::resend`]
//! writes its retained frames again from that number. Resent frames are the
//! exact bytes sealed the first time, so no nonce ever covers two
//! plaintexts.

use std::collections::VecDeque;
use std::sync::Arc;

use duelgrid_protocol::{Codec, Frame};
use duelgrid_transport::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::ChannelError;
use crate::cipher::ChannelCipher;

/// Number of sent frames kept for [`SecureSender::resend`].
pub const RESEND_WINDOW: usize = 8;

/// Sending half: seals plaintext and writes frames.
pub struct SecureSender<C> {
    conn: Arc<C>,
    cipher: ChannelCipher,
    retained: VecDeque<Frame>,
}

impl<C: Connection> SecureSender<C> {
    pub(crate) fn new(conn: Arc<C>, cipher: ChannelCipher) -> Self {
        Self {
            conn,
            cipher,
            retained: VecDeque::with_capacity(RESEND_WINDOW),
        }
    }

    /// Seals and sends `plaintext`, returning the sequence number used.
    pub async fn send(&mut self, plaintext: &[u8]) -> Result<u64, ChannelError> {
        let frame = self.cipher.seal(plaintext)?;
        let seq = frame.seq;
        self.conn.send(&frame.encode()).await?;
        if self.retained.len() == RESEND_WINDOW {
            self.retained.pop_front();
        }
        self.retained.push_back(frame);
        Ok(seq)
    }

    /// Writes every retained frame from `from_seq` onward again, in order.
    /// Returns how many frames were resent.
    ///
    /// # Errors
    /// `ResendUnavailable` if `from_seq` was never sent or has already left
    /// the window.
    pub async fn resend(&mut self, from_seq: u64) -> Result<usize, ChannelError> {
        let start = self
            .retained
            .iter()
            .position(|frame| frame.seq == from_seq)
            .ok_or(ChannelError::ResendUnavailable { seq: from_seq })?;
        let mut resent = 0;
        for frame in self.retained.iter().skip(start) {
            self.conn.send(&frame.encode()).await?;
            resent += 1;
        }
        tracing::debug!(conn = %self.conn.id(), from_seq, resent, "resent frames");
        Ok(resent)
    }

    /// Encodes `msg` with `codec`, then sends it.
    pub async fn send_message<T: Serialize>(
        &mut self,
        codec: &impl Codec,
        msg: &T,
    ) -> Result<u64, ChannelError> {
        let bytes = codec.encode(msg).map_err(ChannelError::Encode)?;
        self.send(&bytes).await
    }

    /// Number of frames sent so far.
    pub fn next_seq(&self) -> u64 {
        self.cipher.next_seq()
    }

    /// Closes the underlying connection.
    pub async fn close(&self) -> Result<(), ChannelError> {
        self.conn.close().await?;
        Ok(())
    }

    pub fn connection(&self) -> &Arc<C> {
        &self.conn
    }
}

/// Receiving half: reads frames, enforces ordering, and opens them.
///
/// Frames that fail authentication are dropped. Up to `retry_budget` such
/// frames are tolerated over the life of the channel, each reported as
/// [`ChannelError::FrameDropped`]; the next one fails with
/// [`ChannelError::RetryBudgetExhausted`].
///
/// After a drop, frames the peer sent past the missing one are discarded
/// without counting against the budget: they come back with the resend.
pub struct SecureReceiver<C> {
    conn: Arc<C>,
    cipher: ChannelCipher,
    retry_budget: u32,
    failures: u32,
    awaiting_resend: Option<u64>,
}

impl<C: Connection> SecureReceiver<C> {
    pub(crate) fn new(conn: Arc<C>, cipher: ChannelCipher) -> Self {
        Self {
            conn,
            cipher,
            retry_budget: 0,
            failures: 0,
            awaiting_resend: None,
        }
    }

    /// Sets how many failed frames are tolerated. Defaults to zero.
    pub fn set_retry_budget(&mut self, budget: u32) {
        self.retry_budget = budget;
    }

    /// Receives the next frame that opens, returning its sequence number
    /// and plaintext.
    ///
    /// # Errors
    /// `Closed` when the peer hangs up, `FrameDropped` when a frame fails
    /// within the budget, `RetryBudgetExhausted` when one failed frame too
    /// many arrives, `Transport` on I/O failure.
    pub async fn recv(&mut self) -> Result<(u64, Vec<u8>), ChannelError> {
        loop {
            let bytes = self.conn.recv().await?.ok_or(ChannelError::Closed)?;
            let opened = Frame::decode(&bytes)
                .map_err(ChannelError::MalformedFrame)
                .and_then(|frame| {
                    self.cipher
                        .open(&frame)
                        .map(|plaintext| (frame.seq, plaintext))
                });

            match opened {
                Ok(frame) => {
                    self.awaiting_resend = None;
                    return Ok(frame);
                }
                Err(ChannelError::Sequence { expected, got })
                    if got > expected && self.awaiting_resend == Some(expected) =>
                {
                    tracing::debug!(
                        conn = %self.conn.id(),
                        expected,
                        got,
                        "discarded frame sent after a dropped one"
                    );
                }
                Err(e) if e.is_authentication_failure() => {
                    self.failures += 1;
                    tracing::warn!(
                        conn = %self.conn.id(),
                        failures = self.failures,
                        budget = self.retry_budget,
                        error = %e,
                        "dropped frame"
                    );
                    if self.failures > self.retry_budget {
                        return Err(ChannelError::RetryBudgetExhausted {
                            failures: self.failures,
                        });
                    }
                    let expected = self.cipher.next_seq();
                    self.awaiting_resend = Some(expected);
                    return Err(ChannelError::FrameDropped {
                        expected,
                        failures: self.failures,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Receives the next frame and decodes it with `codec`.
    ///
    /// A payload that opens but doesn't decode is returned as
    /// [`ChannelError::Decode`]; it does not count against the budget.
    pub async fn recv_message<T: DeserializeOwned>(
        &mut self,
        codec: &impl Codec,
    ) -> Result<(u64, T), ChannelError> {
        let (seq, plaintext) = self.recv().await?;
        let msg = codec.decode(&plaintext).map_err(ChannelError::Decode)?;
        Ok((seq, msg))
    }

    /// Number of frames opened so far.
    pub fn next_seq(&self) -> u64 {
        self.cipher.next_seq()
    }

    /// Number of frames dropped so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }
}
