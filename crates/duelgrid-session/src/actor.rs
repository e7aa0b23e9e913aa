//! Session actor: an isolated Tokio task that owns one game.
//!
//! The actor owns the [`GameSession`] and the sending half of every
//! participant's channel. Reader tasks forward decrypted messages through
//! an mpsc channel, so moves for one session are applied strictly one at a
//! time, in arrival order, with no locks around the board.
//!
//! Every way a session can end (completion, abort, timeout, operator
//! terminate) leaves the command loop and runs [`SessionActor::teardown`]
//! exactly once: notify, signal readers, close channels, save, evict.

use std::sync::Arc;

use duelgrid_channel::SecureSender;
use duelgrid_game::{BoardEngine, GameSession, MoveProvider, MoveResult};
use duelgrid_protocol::{
    AbortReason, ClientMessage, JsonCodec, Mark, Move, PlayerId, ServerMessage, SessionId,
    SessionStatus,
};
use duelgrid_transport::Connection;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, timeout_at};

use crate::registry::Registry;
use crate::{ChannelCounters, SessionConfig, SessionRecord, SessionStore};

/// Command channel size per session.
const COMMAND_CHANNEL_SIZE: usize = 64;

// ---------------------------------------------------------------------------
// Participants
// ---------------------------------------------------------------------------

/// Where a participant's moves come from.
pub enum MoveSource<C> {
    /// A remote player. Moves arrive as sealed frames; the actor answers
    /// through `sender`.
    NetworkParticipant {
        player: PlayerId,
        sender: SecureSender<C>,
    },
    /// A server-side strategy, asked for a move whenever it holds the turn.
    AutomatedParticipant {
        player: PlayerId,
        provider: Arc<dyn MoveProvider>,
    },
}

impl<C> MoveSource<C> {
    pub fn player(&self) -> PlayerId {
        match self {
            MoveSource::NetworkParticipant { player, .. }
            | MoveSource::AutomatedParticipant { player, .. } => *player,
        }
    }
}

struct Seat<C> {
    source: MoveSource<C>,
    /// Next frame sequence expected from this participant.
    received: u64,
}

impl<C: Connection> Seat<C> {
    fn counters(&self) -> Option<ChannelCounters> {
        match &self.source {
            MoveSource::NetworkParticipant { player, sender } => Some(ChannelCounters {
                player: *player,
                sent: sender.next_seq(),
                received: self.received,
            }),
            MoveSource::AutomatedParticipant { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Commands and handle
// ---------------------------------------------------------------------------

pub(crate) enum SessionCommand<C> {
    /// Seat a second participant.
    Join {
        source: MoveSource<C>,
        received: u64,
        reply: oneshot::Sender<Result<(), Option<MoveSource<C>>>>,
    },

    /// A decrypted message from a participant's reader task.
    Inbound {
        player: PlayerId,
        frame_seq: u64,
        msg: ClientMessage,
    },

    /// A participant's frame was dropped; ask them to send it again.
    Resend { player: PlayerId, from_seq: u64 },

    /// A participant's channel failed.
    Fault {
        player: PlayerId,
        reason: AbortReason,
    },

    /// Operator-requested termination. Replies with the final record.
    Terminate {
        reason: AbortReason,
        reply: oneshot::Sender<SessionRecord>,
    },
}

/// Handle to a running session actor. Cheap to clone.
pub(crate) struct SessionHandle<C> {
    session_id: SessionId,
    sender: mpsc::Sender<SessionCommand<C>>,
    shutdown: watch::Receiver<bool>,
}

impl<C> Clone for SessionHandle<C> {
    fn clone(&self) -> Self {
        Self {
            session_id: self.session_id,
            sender: self.sender.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<C> SessionHandle<C> {
    pub(crate) fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// A receiver that changes (or closes) when the session tears down.
    pub(crate) fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }

    /// Asks the actor to seat `source`. On refusal the source comes back
    /// so the caller can seat it elsewhere; `Err(None)` means it was lost
    /// with the actor.
    pub(crate) async fn join(
        &self,
        source: MoveSource<C>,
        received: u64,
    ) -> Result<(), Option<MoveSource<C>>> {
        let (reply, rx) = oneshot::channel();
        let cmd = SessionCommand::Join {
            source,
            received,
            reply,
        };
        if let Err(mpsc::error::SendError(cmd)) = self.sender.send(cmd).await {
            return match cmd {
                SessionCommand::Join { source, .. } => Err(Some(source)),
                _ => Err(None),
            };
        }
        rx.await.unwrap_or(Err(None))
    }

    /// Forwards a decrypted message. Returns `false` once the actor is gone.
    pub(crate) async fn inbound(&self, player: PlayerId, frame_seq: u64, msg: ClientMessage) -> bool {
        self.sender
            .send(SessionCommand::Inbound {
                player,
                frame_seq,
                msg,
            })
            .await
            .is_ok()
    }

    pub(crate) async fn request_resend(&self, player: PlayerId, from_seq: u64) -> bool {
        self.sender
            .send(SessionCommand::Resend { player, from_seq })
            .await
            .is_ok()
    }

    pub(crate) async fn fault(&self, player: PlayerId, reason: AbortReason) {
        let _ = self.sender.send(SessionCommand::Fault { player, reason }).await;
    }

    /// Ends the session. `None` if the actor was already gone.
    pub(crate) async fn terminate(&self, reason: AbortReason) -> Option<SessionRecord> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Terminate { reason, reply })
            .await
            .ok()?;
        rx.await.ok()
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

pub(crate) struct SessionActor<C, E, S> {
    session: GameSession<E>,
    seats: Vec<Seat<C>>,
    registry: Arc<Registry<C>>,
    store: Arc<S>,
    config: SessionConfig,
    codec: JsonCodec,
    commands: mpsc::Receiver<SessionCommand<C>>,
    shutdown: watch::Sender<bool>,
    created_at_ms: u64,
}

impl<C, E, S> SessionActor<C, E, S>
where
    C: Connection,
    E: BoardEngine,
    S: SessionStore,
{
    /// Builds an actor with its first participant seated.
    pub(crate) fn new(
        session: GameSession<E>,
        first: MoveSource<C>,
        received: u64,
        registry: Arc<Registry<C>>,
        store: Arc<S>,
        config: SessionConfig,
    ) -> (Self, SessionHandle<C>) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = SessionHandle {
            session_id: session.session_id(),
            sender: tx,
            shutdown: shutdown_rx,
        };
        let created_at_ms = SessionRecord::new(session.session_id(), first.player()).created_at_ms;
        let actor = Self {
            session,
            seats: vec![Seat {
                source: first,
                received,
            }],
            registry,
            store,
            config,
            codec: JsonCodec,
            commands: rx,
            shutdown: shutdown_tx,
            created_at_ms,
        };
        (actor, handle)
    }

    fn session_id(&self) -> SessionId {
        self.session.session_id()
    }

    /// Current snapshot of the session.
    pub(crate) fn record(&self) -> SessionRecord {
        SessionRecord {
            session_id: self.session.session_id(),
            first_player: self.session.first_player(),
            second_player: self.session.second_player(),
            board: self.session.board().cloned(),
            counters: self.seats.iter().filter_map(Seat::counters).collect(),
            status: self.session.status(),
            created_at_ms: self.created_at_ms,
        }
    }

    /// Runs the actor until the session reaches a terminal state.
    pub(crate) async fn run(mut self) {
        let first = self.session.first_player();
        tracing::info!(session_id = %self.session_id(), player_id = %first, "session created");
        self.send_to(
            first,
            &ServerMessage::Welcome {
                session_id: self.session_id(),
                player_id: first,
                status: self.session.status(),
            },
        )
        .await;

        let idle = self.config.idle_timeout;
        let mut deadline = Instant::now() + idle;
        let mut terminate_replies = Vec::new();

        while !self.session.is_terminal() {
            let cmd = match timeout_at(deadline, self.commands.recv()).await {
                Ok(Some(cmd)) => cmd,
                Ok(None) => {
                    self.session.abort(AbortReason::Shutdown);
                    break;
                }
                Err(_) => {
                    tracing::info!(
                        session_id = %self.session_id(),
                        status = %self.session.status(),
                        "idle timeout"
                    );
                    self.session.abort(AbortReason::Timeout);
                    break;
                }
            };

            match cmd {
                SessionCommand::Join {
                    source,
                    received,
                    reply,
                } => {
                    let result = self.handle_join(source, received).await;
                    deadline = Instant::now() + idle;
                    let _ = reply.send(result);
                }
                SessionCommand::Inbound {
                    player,
                    frame_seq,
                    msg,
                } => {
                    deadline = Instant::now() + idle;
                    self.handle_inbound(player, frame_seq, msg).await;
                }
                SessionCommand::Resend { player, from_seq } => {
                    tracing::info!(
                        session_id = %self.session_id(),
                        player_id = %player,
                        from_seq,
                        "requesting resend"
                    );
                    self.send_to(player, &ServerMessage::Resend { from_seq })
                        .await;
                }
                SessionCommand::Fault { player, reason } => {
                    tracing::info!(
                        session_id = %self.session_id(),
                        player_id = %player,
                        %reason,
                        "participant channel failed"
                    );
                    self.session.abort(reason);
                }
                SessionCommand::Terminate { reason, reply } => {
                    tracing::info!(session_id = %self.session_id(), %reason, "terminate requested");
                    self.session.abort(reason);
                    terminate_replies.push(reply);
                }
            }
        }

        let record = self.teardown().await;
        for reply in terminate_replies {
            let _ = reply.send(record.clone());
        }
    }

    async fn handle_join(
        &mut self,
        source: MoveSource<C>,
        received: u64,
    ) -> Result<(), Option<MoveSource<C>>> {
        let player = source.player();
        if let Err(e) = self.session.claim(player) {
            tracing::debug!(session_id = %self.session_id(), error = %e, "join refused");
            return Err(Some(source));
        }
        self.seats.push(Seat { source, received });

        let board = match self.session.start() {
            Ok(board) => board.clone(),
            Err(e) => {
                tracing::warn!(session_id = %self.session_id(), error = %e, "could not start game");
                self.session.abort(AbortReason::ProtocolViolation);
                return Ok(());
            }
        };
        self.registry.publish(self.record()).await;
        tracing::info!(
            session_id = %self.session_id(),
            x = %board.players[0],
            o = %board.players[1],
            "session paired"
        );

        self.send_to(
            player,
            &ServerMessage::Welcome {
                session_id: self.session_id(),
                player_id: player,
                status: self.session.status(),
            },
        )
        .await;
        for (mark, opponent) in [
            (Mark::X, board.players[1]),
            (Mark::O, board.players[0]),
        ] {
            let msg = ServerMessage::GameStarted {
                session_id: self.session_id(),
                mark,
                opponent,
                state: board.clone(),
            };
            self.send_to(board.player_for(mark), &msg).await;
        }

        self.advance().await;
        Ok(())
    }

    async fn handle_inbound(&mut self, player: PlayerId, frame_seq: u64, msg: ClientMessage) {
        if let Some(seat) = self.seats.iter_mut().find(|s| s.source.player() == player) {
            seat.received = frame_seq.saturating_add(1);
        }

        match msg {
            ClientMessage::Move(mv) => {
                if mv.seq != frame_seq {
                    tracing::warn!(
                        session_id = %self.session_id(),
                        player_id = %player,
                        move_seq = mv.seq,
                        frame_seq,
                        "move sequence does not match its frame"
                    );
                    self.session.abort(AbortReason::ProtocolViolation);
                    return;
                }
                self.play(player, mv).await;
                self.advance().await;
            }
            ClientMessage::Leave => {
                tracing::info!(session_id = %self.session_id(), player_id = %player, "participant left");
                self.session.abort(AbortReason::Disconnected);
            }
            ClientMessage::Hello { .. } => {
                tracing::warn!(session_id = %self.session_id(), player_id = %player, "repeated Hello");
                self.session.abort(AbortReason::ProtocolViolation);
            }
        }
    }

    /// Applies one move and tells both participants about it.
    async fn play(&mut self, player: PlayerId, mv: Move) {
        match self.session.apply_move(player, &mv) {
            Ok(MoveResult::Continue { state }) => {
                tracing::debug!(
                    session_id = %self.session_id(),
                    player_id = %player,
                    position = mv.position,
                    "move applied"
                );
                let record = self.record();
                self.registry.publish(record.clone()).await;
                if self.config.checkpoint_moves {
                    self.save(&record).await;
                }
                self.broadcast(&ServerMessage::MoveApplied {
                    player,
                    position: mv.position,
                    state,
                })
                .await;
            }
            Ok(MoveResult::Finished { outcome, state }) => {
                tracing::info!(session_id = %self.session_id(), ?outcome, "session completed");
                self.broadcast(&ServerMessage::MoveApplied {
                    player,
                    position: mv.position,
                    state: state.clone(),
                })
                .await;
                self.broadcast(&ServerMessage::GameOver { outcome, state })
                    .await;
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %self.session_id(),
                    player_id = %player,
                    error = %e,
                    "move rejected"
                );
            }
        }
    }

    /// Lets automated participants move until a network participant holds
    /// the turn, then tells that participant it's their move.
    async fn advance(&mut self) {
        while self.session.status() == SessionStatus::InProgress {
            let Some(board) = self.session.board().cloned() else {
                return;
            };
            let current = board.current_player();
            let provider = self.seats.iter().find_map(|seat| match &seat.source {
                MoveSource::AutomatedParticipant { player, provider } if *player == current => {
                    Some(Arc::clone(provider))
                }
                _ => None,
            });

            match provider {
                Some(provider) => {
                    let mv = provider.next_move(&board, current);
                    tracing::debug!(
                        session_id = %self.session_id(),
                        provider = provider.name(),
                        position = mv.position,
                        "automated move"
                    );
                    self.play(current, mv).await;
                }
                None => {
                    self.send_to(current, &ServerMessage::YourTurn { state: board })
                        .await;
                    return;
                }
            }
        }
    }

    async fn send_to(&mut self, player: PlayerId, msg: &ServerMessage) {
        let codec = self.codec;
        let session_id = self.session.session_id();
        for seat in &mut self.seats {
            if let MoveSource::NetworkParticipant { player: p, sender } = &mut seat.source {
                if *p == player {
                    if let Err(e) = sender.send_message(&codec, msg).await {
                        tracing::debug!(%session_id, player_id = %p, error = %e, "send failed");
                    }
                }
            }
        }
    }

    async fn broadcast(&mut self, msg: &ServerMessage) {
        let players: Vec<PlayerId> = self.seats.iter().map(|s| s.source.player()).collect();
        for player in players {
            self.send_to(player, msg).await;
        }
    }

    async fn save(&self, record: &SessionRecord) {
        match self.store.save(record).await {
            Ok(()) => tracing::debug!(session_id = %record.session_id, status = %record.status, "session record saved"),
            Err(e) => tracing::warn!(
                session_id = %record.session_id,
                error = %e,
                "failed to save session record"
            ),
        }
    }

    /// The single exit path for every session.
    async fn teardown(&mut self) -> SessionRecord {
        let status = self.session.status();
        if let SessionStatus::Aborted { reason } = status {
            self.broadcast(&ServerMessage::Aborted { reason }).await;
        }

        let record = self.record();
        self.registry.publish(record.clone()).await;

        // Stop reader tasks, then close our side of every channel.
        let _ = self.shutdown.send(true);
        for seat in &self.seats {
            if let MoveSource::NetworkParticipant { sender, .. } = &seat.source {
                if let Err(e) = sender.close().await {
                    tracing::debug!(session_id = %self.session_id(), error = %e, "close failed");
                }
            }
        }

        self.save(&record).await;
        self.registry.remove(self.session_id()).await;
        tracing::info!(session_id = %self.session_id(), %status, "session closed");

        // Anything still queued gets an answer instead of being dropped.
        self.commands.close();
        while let Ok(cmd) = self.commands.try_recv() {
            match cmd {
                SessionCommand::Join { source, reply, .. } => {
                    let _ = reply.send(Err(Some(source)));
                }
                SessionCommand::Terminate { reply, .. } => {
                    let _ = reply.send(record.clone());
                }
                SessionCommand::Inbound { .. }
                | SessionCommand::Resend { .. }
                | SessionCommand::Fault { .. } => {}
            }
        }

        record
    }
}
