//! Length-prefixed TCP transport.
//!
//! Every message is written as `[u32 big-endian length][body]`. Reads use
//! `read_exact`, so partial reads from the socket are reassembled before a
//! message is handed to the caller.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Largest message body accepted from a peer (64 KiB).
pub const MAX_MESSAGE_LEN: usize = 64 * 1024;

/// A TCP [`Transport`] that listens for incoming connections.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self { listener })
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;

    async fn accept(&mut self) -> Result<Self::Connection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        let conn = TcpConnection::from_stream(stream, Some(addr));
        tracing::debug!(id = %conn.id, %addr, "accepted TCP connection");
        Ok(conn)
    }

    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// A single length-prefixed TCP connection.
///
/// The read and write halves sit behind separate locks, so a reader task
/// blocked in [`recv`](Connection::recv) never stalls a concurrent send.
pub struct TcpConnection {
    id: ConnectionId,
    peer: Option<SocketAddr>,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
}

impl TcpConnection {
    /// Opens a client connection to `addr`.
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::SendFailed)?;
        let peer = stream.peer_addr().ok();
        Ok(Self::from_stream(stream, peer))
    }

    /// Wraps an already connected stream.
    pub fn from_stream(stream: TcpStream, peer: Option<SocketAddr>) -> Self {
        // Handshake and move frames are tiny; don't let Nagle hold them.
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();
        Self {
            id: ConnectionId::next(),
            peer,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
        }
    }

    /// Returns the remote address, if known.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

impl Connection for TcpConnection {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if data.len() > MAX_MESSAGE_LEN {
            return Err(TransportError::MessageTooLarge {
                len: data.len(),
                max: MAX_MESSAGE_LEN,
            });
        }
        let mut buf = Vec::with_capacity(4 + data.len());
        buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
        buf.extend_from_slice(data);

        let mut writer = self.writer.lock().await;
        writer.write_all(&buf).await.map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut reader = self.reader.lock().await;

        let mut prefix = [0u8; 4];
        let mut filled = 0;
        while filled < prefix.len() {
            let n = reader
                .read(&mut prefix[filled..])
                .await
                .map_err(TransportError::ReceiveFailed)?;
            if n == 0 {
                // EOF on a message boundary is a clean close.
                if filled == 0 {
                    return Ok(None);
                }
                return Err(TransportError::ReceiveFailed(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("connection closed after {filled} of 4 length bytes"),
                )));
            }
            filled += n;
        }

        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_MESSAGE_LEN {
            return Err(TransportError::MessageTooLarge {
                len,
                max: MAX_MESSAGE_LEN,
            });
        }

        let mut body = vec![0u8; len];
        reader
            .read_exact(&mut body)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        Ok(Some(body))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.writer
            .lock()
            .await
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
