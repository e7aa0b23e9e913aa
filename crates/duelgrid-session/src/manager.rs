//! The session manager: admits connections and owns the registry.
//!
//! Each accepted connection goes through the same pipeline:
//!
//! ```text
//! accept(conn)
//!   ├─ key exchange + first sealed frame must be Hello   (handshake_timeout)
//!   │     └─ failure → connection closed, no session, no record
//!   ├─ Hello { resume: Some(id) } → SessionSummary, close
//!   ├─ Hello { opponent: Automated } → new session + automated seat
//!   └─ Hello { opponent: Human }
//!         ├─ a session is waiting → join it (first come, first served)
//!         └─ none waiting        → new session, queued
//! ```
//!
//! Once seated, the connection's receiving half is handed to a reader task
//! that forwards decrypted messages to the session actor. The manager never
//! touches a board itself; it only finds actors and talks to them.

use std::sync::Arc;

use duelgrid_channel::{
    ChannelError, HandshakeError, KeyRing, SecureReceiver, SecureSender, server_handshake,
};
use duelgrid_game::{BoardEngine, GameSession, MoveProvider};
use duelgrid_protocol::{
    AbortReason, ClientMessage, JsonCodec, Opponent, PlayerId, ServerMessage, SessionId,
};
use duelgrid_transport::Connection;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::actor::{MoveSource, SessionActor, SessionHandle};
use crate::registry::{Registry, ServerStats};
use crate::{IdentityIssuer, SessionConfig, SessionError, SessionRecord, SessionStore, StoreError};

/// Admits connections, pairs players, and answers operator queries.
///
/// Cloning is cheap; every clone shares one registry.
pub struct SessionManager<C, E, S> {
    engine: Arc<E>,
    store: Arc<S>,
    keys: Arc<KeyRing>,
    registry: Arc<Registry<C>>,
    config: SessionConfig,
    issuer: IdentityIssuer,
    automated: Option<Arc<dyn MoveProvider>>,
    /// Held while a human arrival decides between claiming a waiting
    /// session and opening a new one.
    pairing: Arc<Mutex<()>>,
}

impl<C, E, S> Clone for SessionManager<C, E, S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            store: Arc::clone(&self.store),
            keys: Arc::clone(&self.keys),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
            issuer: self.issuer,
            automated: self.automated.clone(),
            pairing: Arc::clone(&self.pairing),
        }
    }
}

/// A connection that finished the handshake and said Hello.
struct Admitted<C> {
    sender: SecureSender<C>,
    receiver: SecureReceiver<C>,
    opponent: Opponent,
    resume: Option<SessionId>,
}

impl<C, E, S> SessionManager<C, E, S>
where
    C: Connection,
    E: BoardEngine,
    S: SessionStore,
{
    /// # Errors
    /// `Config` if `config` fails [`SessionConfig::validate`].
    pub fn new(
        engine: Arc<E>,
        store: Arc<S>,
        keys: KeyRing,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            engine,
            store,
            keys: Arc::new(keys),
            registry: Arc::new(Registry::new()),
            config,
            issuer: IdentityIssuer,
            automated: None,
            pairing: Arc::new(Mutex::new(())),
        })
    }

    /// Lets clients that ask for an automated opponent play against
    /// `provider`. Without one, such clients are paired with humans.
    pub fn with_automated_opponent(mut self, provider: Arc<dyn MoveProvider>) -> Self {
        self.automated = Some(provider);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs the handshake on `conn` and seats it in a session.
    ///
    /// Returns the session the connection joined (or asked about, for a
    /// resume request).
    ///
    /// # Errors
    /// Any handshake failure, including a first frame that fails
    /// authentication, closes the connection and creates nothing.
    pub async fn accept(&self, conn: C) -> Result<SessionId, SessionError> {
        let conn = Arc::new(conn);
        let admitted = match timeout(self.config.handshake_timeout, self.admit(Arc::clone(&conn))).await {
            Ok(Ok(admitted)) => admitted,
            Ok(Err(e)) => {
                tracing::warn!(conn = %conn.id(), error = %e, "handshake failed");
                let _ = conn.close().await;
                return Err(e);
            }
            Err(_) => {
                tracing::warn!(conn = %conn.id(), "handshake timed out");
                let _ = conn.close().await;
                return Err(SessionError::HandshakeTimeout);
            }
        };

        let Admitted {
            mut sender,
            mut receiver,
            opponent,
            resume,
        } = admitted;

        if let Some(session_id) = resume {
            return self.summarize(session_id, &mut sender).await;
        }

        receiver.set_retry_budget(self.config.auth_retry_budget);
        let player = self.issuer.issue_player_id();
        let received = receiver.next_seq();
        tracing::debug!(conn = %conn.id(), player_id = %player, ?opponent, "connection admitted");

        let source = MoveSource::NetworkParticipant { player, sender };
        let handle = match (opponent, &self.automated) {
            (Opponent::Automated, Some(provider)) => {
                let handle = self.create_session(source, received, false).await;
                self.seat_automated(&handle, Arc::clone(provider)).await?;
                handle
            }
            (Opponent::Automated, None) => {
                tracing::debug!(player_id = %player, "no automated opponent configured, pairing with a human");
                self.pair(source, received).await?
            }
            (Opponent::Human, _) => self.pair(source, received).await?,
        };

        tokio::spawn(read_frames(player, receiver, handle.clone()));
        Ok(handle.session_id())
    }

    /// Key exchange, then key confirmation: the first sealed frame must
    /// open and must be a Hello.
    async fn admit(&self, conn: Arc<C>) -> Result<Admitted<C>, SessionError> {
        let keypair = self.keys.current().await;
        let (sender, mut receiver) = server_handshake(conn, &keypair).await?;

        let (_, msg) = receiver
            .recv_message::<ClientMessage>(&JsonCodec)
            .await
            .map_err(HandshakeError::Confirmation)?;
        match msg {
            ClientMessage::Hello { opponent, resume } => Ok(Admitted {
                sender,
                receiver,
                opponent,
                resume,
            }),
            ClientMessage::Move(_) => Err(SessionError::UnexpectedMessage("Move")),
            ClientMessage::Leave => Err(SessionError::UnexpectedMessage("Leave")),
        }
    }

    /// Answers a resume request with the session's summary and hangs up.
    async fn summarize(
        &self,
        session_id: SessionId,
        sender: &mut SecureSender<C>,
    ) -> Result<SessionId, SessionError> {
        let found = self.lookup(session_id).await;
        let reply = match &found {
            Ok(record) => ServerMessage::SessionSummary {
                session_id,
                status: record.status,
                board: record.board.clone(),
            },
            Err(e) => ServerMessage::Error {
                message: e.to_string(),
            },
        };
        sender.send_message(&JsonCodec, &reply).await?;
        let _ = sender.close().await;
        found.map(|_| session_id)
    }

    /// Seats an automated opponent in a fresh session. If it can't be
    /// seated the session is ended at once rather than left to idle out.
    async fn seat_automated(
        &self,
        handle: &SessionHandle<C>,
        provider: Arc<dyn MoveProvider>,
    ) -> Result<(), SessionError> {
        let bot = MoveSource::AutomatedParticipant {
            player: self.issuer.issue_player_id(),
            provider,
        };
        if handle.join(bot, 0).await.is_ok() {
            return Ok(());
        }
        tracing::warn!(session_id = %handle.session_id(), "automated opponent could not join");
        handle.terminate(AbortReason::Terminated).await;
        Err(SessionError::Unavailable(handle.session_id()))
    }

    /// Joins the oldest waiting session, or opens a new one.
    ///
    /// Claiming and opening happen under one lock, so simultaneous arrivals
    /// never each open a session while another sits waiting.
    async fn pair(
        &self,
        mut source: MoveSource<C>,
        received: u64,
    ) -> Result<SessionHandle<C>, SessionError> {
        loop {
            let handle = {
                let _pairing = self.pairing.lock().await;
                match self.registry.claim_waiting().await {
                    Some(handle) => handle,
                    None => return Ok(self.create_session(source, received, true).await),
                }
            };
            match handle.join(source, received).await {
                Ok(()) => return Ok(handle),
                // The waiting session ended under us; try the next one.
                Err(Some(returned)) => source = returned,
                Err(None) => return Err(SessionError::Unavailable(handle.session_id())),
            }
        }
    }

    async fn create_session(
        &self,
        first: MoveSource<C>,
        received: u64,
        waiting: bool,
    ) -> SessionHandle<C> {
        let session_id = self.issuer.issue_session_id();
        let session = GameSession::new(
            session_id,
            first.player(),
            Arc::clone(&self.engine),
            self.config.board_dimension,
        );
        let (actor, handle) = SessionActor::new(
            session,
            first,
            received,
            Arc::clone(&self.registry),
            Arc::clone(&self.store),
            self.config.clone(),
        );
        self.registry
            .insert(actor.record(), handle.clone(), waiting)
            .await;
        tokio::spawn(actor.run());
        handle
    }

    /// The latest record for `session_id`: live sessions first, then the
    /// store.
    pub async fn lookup(&self, session_id: SessionId) -> Result<SessionRecord, SessionError> {
        if let Some(record) = self.registry.lookup(session_id).await {
            return Ok(record);
        }
        match self.store.load(session_id).await {
            Ok(record) => Ok(record),
            Err(StoreError::NotFound(_)) => Err(SessionError::NotFound(session_id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Ends a session and returns its final record.
    ///
    /// Safe to call on a session that already ended: the stored record is
    /// returned and nothing is saved again.
    pub async fn terminate(
        &self,
        session_id: SessionId,
        reason: AbortReason,
    ) -> Result<SessionRecord, SessionError> {
        if let Some(handle) = self.registry.handle(session_id).await {
            if let Some(record) = handle.terminate(reason).await {
                return Ok(record);
            }
        }
        self.lookup(session_id).await
    }

    /// Ends every live session. Returns how many were ended.
    pub async fn terminate_all(&self, reason: AbortReason) -> usize {
        let handles = self.registry.handles().await;
        let mut ended = 0;
        for handle in handles {
            if handle.terminate(reason).await.is_some() {
                ended += 1;
            }
        }
        tracing::info!(ended, %reason, "terminated all sessions");
        ended
    }

    pub async fn stats(&self) -> ServerStats {
        self.registry.stats().await
    }
}

// ---------------------------------------------------------------------------
// Reader task
// ---------------------------------------------------------------------------

/// Forwards one participant's decrypted messages to its session until the
/// session ends or the channel fails.
async fn read_frames<C: Connection>(
    player: PlayerId,
    mut receiver: SecureReceiver<C>,
    handle: SessionHandle<C>,
) {
    let mut shutdown = handle.shutdown_signal();
    loop {
        let result = tokio::select! {
            _ = shutdown.changed() => return,
            result = receiver.recv_message::<ClientMessage>(&JsonCodec) => result,
        };
        match result {
            Ok((seq, msg)) => {
                if !handle.inbound(player, seq, msg).await {
                    return;
                }
            }
            Err(ChannelError::FrameDropped { expected, .. }) => {
                if !handle.request_resend(player, expected).await {
                    return;
                }
            }
            Err(e) => {
                let reason = fault_reason(&e);
                tracing::debug!(
                    session_id = %handle.session_id(),
                    player_id = %player,
                    error = %e,
                    %reason,
                    "reader stopped"
                );
                handle.fault(player, reason).await;
                return;
            }
        }
    }
}

fn fault_reason(error: &ChannelError) -> AbortReason {
    match error {
        ChannelError::Closed | ChannelError::Transport(_) => AbortReason::Disconnected,
        ChannelError::RetryBudgetExhausted { .. } => AbortReason::AuthenticationFailure,
        _ => AbortReason::ProtocolViolation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duelgrid_channel::KeyPolicy;
    use duelgrid_game::{FirstAvailable, TicTacToeEngine};
    use duelgrid_protocol::{KemAlgorithm, ProtocolError};
    use duelgrid_transport::TransportError;
    use duelgrid_transport::memory::MemoryConnection;

    use crate::MemoryStore;

    fn manager() -> SessionManager<MemoryConnection, TicTacToeEngine, MemoryStore> {
        SessionManager::new(
            Arc::new(TicTacToeEngine),
            Arc::new(MemoryStore::new()),
            KeyRing::new(KemAlgorithm::MlKem512, KeyPolicy::PerHandshake),
            SessionConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_invalid_config_rejected() {
        let config = SessionConfig {
            board_dimension: 0,
            ..SessionConfig::default()
        };
        let result = SessionManager::<MemoryConnection, _, _>::new(
            Arc::new(TicTacToeEngine),
            Arc::new(MemoryStore::new()),
            KeyRing::new(KemAlgorithm::MlKem512, KeyPolicy::PerHandshake),
            config,
        );
        assert!(matches!(
            result,
            Err(SessionError::Config(crate::ConfigError::BoardDimension(0)))
        ));
    }

    #[tokio::test]
    async fn test_seat_automated_on_ended_session_unavailable() {
        let manager = manager();
        let first = MoveSource::AutomatedParticipant {
            player: manager.issuer.issue_player_id(),
            provider: Arc::new(FirstAvailable),
        };
        let handle = manager.create_session(first, 0, false).await;
        assert!(handle.terminate(AbortReason::Terminated).await.is_some());

        let result = manager
            .seat_automated(&handle, Arc::new(FirstAvailable))
            .await;
        assert!(matches!(result, Err(SessionError::Unavailable(id)) if id == handle.session_id()));
        assert_eq!(manager.stats().await.active_sessions, 0);
    }

    #[test]
    fn test_fault_reason_closed_is_disconnected() {
        assert_eq!(fault_reason(&ChannelError::Closed), AbortReason::Disconnected);
        assert_eq!(
            fault_reason(&ChannelError::Transport(TransportError::ConnectionClosed("reset".into()))),
            AbortReason::Disconnected
        );
    }

    #[test]
    fn test_fault_reason_budget_is_authentication_failure() {
        assert_eq!(
            fault_reason(&ChannelError::RetryBudgetExhausted { failures: 1 }),
            AbortReason::AuthenticationFailure
        );
    }

    #[test]
    fn test_fault_reason_bad_payload_is_protocol_violation() {
        assert_eq!(
            fault_reason(&ChannelError::Decode(ProtocolError::InvalidMessage("junk".into()))),
            AbortReason::ProtocolViolation
        );
    }
}
