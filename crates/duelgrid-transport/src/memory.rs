//! In-process connections backed by Tokio channels.
//!
//! [`pair`] returns two connected ends. Whatever one end sends, the other
//! receives, message for message. Closing either end makes the peer's
//! `recv` return `Ok(None)`.

use tokio::sync::{Mutex, mpsc};

use crate::{Connection, ConnectionId, TransportError};

/// One end of an in-memory connection pair.
pub struct MemoryConnection {
    id: ConnectionId,
    outbound: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    inbound: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

/// Creates two connected in-memory endpoints.
pub fn pair() -> (MemoryConnection, MemoryConnection) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    let a = MemoryConnection {
        id: ConnectionId::next(),
        outbound: Mutex::new(Some(a_tx)),
        inbound: Mutex::new(a_rx),
    };
    let b = MemoryConnection {
        id: ConnectionId::next(),
        outbound: Mutex::new(Some(b_tx)),
        inbound: Mutex::new(b_rx),
    };
    (a, b)
}

impl Connection for MemoryConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let outbound = self.outbound.lock().await;
        let tx = outbound
            .as_ref()
            .ok_or_else(|| TransportError::ConnectionClosed("local end closed".into()))?;
        tx.send(data.to_vec())
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        // Dropping the sender ends the peer's receive stream.
        self.outbound.lock().await.take();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
