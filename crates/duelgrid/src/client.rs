//! `GameClient`: the initiating side of the protocol.
//!
//! Connects, runs the key exchange, confirms the keys with a sealed Hello,
//! then exchanges application messages over the secure channel.

use std::sync::Arc;

use duelgrid_channel::{SecureReceiver, SecureSender, client_handshake};
use duelgrid_protocol::{
    ClientMessage, JsonCodec, Move, Opponent, PlayerId, ServerMessage, SessionId,
};
use duelgrid_transport::{Connection, TcpConnection};

use crate::DuelgridError;

/// A player's connection to a Duelgrid server.
pub struct GameClient<C = TcpConnection> {
    sender: SecureSender<C>,
    receiver: SecureReceiver<C>,
    player_id: Option<PlayerId>,
    session_id: Option<SessionId>,
}

impl GameClient<TcpConnection> {
    /// Connects over TCP and asks to be seated against `opponent`.
    pub async fn connect(addr: &str, opponent: Opponent) -> Result<Self, DuelgridError> {
        let conn = TcpConnection::connect(addr).await?;
        Self::handshake(
            conn,
            ClientMessage::Hello {
                opponent,
                resume: None,
            },
        )
        .await
    }

    /// Asks the server about a session this player was in. Returns the
    /// server's answer: a `SessionSummary`, or an `Error` if the session is
    /// unknown.
    pub async fn resume(addr: &str, session_id: SessionId) -> Result<ServerMessage, DuelgridError> {
        let conn = TcpConnection::connect(addr).await?;
        let mut client = Self::handshake(
            conn,
            ClientMessage::Hello {
                opponent: Opponent::default(),
                resume: Some(session_id),
            },
        )
        .await?;
        client.next_message().await
    }
}

impl<C: Connection> GameClient<C> {
    /// Runs the handshake over any connection and sends `hello` as the
    /// key-confirming first frame.
    pub async fn handshake(conn: C, hello: ClientMessage) -> Result<Self, DuelgridError> {
        let (mut sender, receiver) = client_handshake(Arc::new(conn)).await?;
        sender.send_message(&JsonCodec, &hello).await?;
        Ok(Self {
            sender,
            receiver,
            player_id: None,
            session_id: None,
        })
    }

    /// Our identity, once the server's Welcome has been read.
    pub fn player_id(&self) -> Option<PlayerId> {
        self.player_id
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    /// Waits for the next message from the server.
    ///
    /// Resend requests are answered here and never returned.
    pub async fn next_message(&mut self) -> Result<ServerMessage, DuelgridError> {
        loop {
            let (_, msg) = self
                .receiver
                .recv_message::<ServerMessage>(&JsonCodec)
                .await?;
            match &msg {
                ServerMessage::Resend { from_seq } => {
                    self.sender.resend(*from_seq).await?;
                    continue;
                }
                ServerMessage::Welcome {
                    session_id,
                    player_id,
                    ..
                } => {
                    self.session_id = Some(*session_id);
                    self.player_id = Some(*player_id);
                }
                _ => {}
            }
            return Ok(msg);
        }
    }

    /// Claims `position`. The move carries the sequence number of the frame
    /// it is sealed in.
    pub async fn play(&mut self, position: u32) -> Result<(), DuelgridError> {
        let player = self.player_id.ok_or(DuelgridError::NotSeated)?;
        let mv = Move {
            player,
            position,
            seq: self.sender.next_seq(),
        };
        self.sender
            .send_message(&JsonCodec, &ClientMessage::Move(mv))
            .await?;
        Ok(())
    }

    /// Leaves the game; the session ends for both players.
    pub async fn leave(&mut self) -> Result<(), DuelgridError> {
        self.sender
            .send_message(&JsonCodec, &ClientMessage::Leave)
            .await?;
        Ok(())
    }
}
