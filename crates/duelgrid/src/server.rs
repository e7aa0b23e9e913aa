//! `DuelgridServer` builder and accept loop.
//!
//! This is the entry point for running a Duelgrid server. It ties together
//! all the layers: transport → channel → session → game.

use std::future::Future;
use std::sync::Arc;

use duelgrid_channel::{KeyPolicy, KeyRing};
use duelgrid_game::{BoardEngine, MoveProvider};
use duelgrid_protocol::{AbortReason, KemAlgorithm};
use duelgrid_session::{SessionConfig, SessionError, SessionManager, SessionStore};
use duelgrid_transport::{TcpTransport, Transport};
use tokio::task::JoinSet;

use crate::DuelgridError;

/// Builder for configuring and starting a Duelgrid server.
///
/// # Example
///
/// ```rust,ignore
/// use duelgrid::prelude::*;
///
/// let server = DuelgridServerBuilder::new()
///     .bind("0.0.0.0:7878")
///     .automated_opponent(RandomMove)
///     .build(TicTacToeEngine, Arc::new(MemoryStore::new()))
///     .await?;
/// server.run().await
/// ```
pub struct DuelgridServerBuilder {
    bind_addr: String,
    session_config: SessionConfig,
    key_policy: KeyPolicy,
    algorithm: KemAlgorithm,
    automated: Option<Arc<dyn MoveProvider>>,
}

impl DuelgridServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:7878".to_string(),
            session_config: SessionConfig::default(),
            key_policy: KeyPolicy::default(),
            algorithm: KemAlgorithm::default(),
            automated: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Sets how often the server's KEM keypair is replaced.
    pub fn key_policy(mut self, policy: KeyPolicy) -> Self {
        self.key_policy = policy;
        self
    }

    pub fn algorithm(mut self, algorithm: KemAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Offers `provider` to clients that ask for an automated opponent.
    pub fn automated_opponent(mut self, provider: impl MoveProvider) -> Self {
        self.automated = Some(Arc::new(provider));
        self
    }

    /// Binds a TCP listener and builds the server.
    pub async fn build<E, S>(
        self,
        engine: E,
        store: Arc<S>,
    ) -> Result<DuelgridServer<TcpTransport, E, S>, DuelgridError>
    where
        E: BoardEngine,
        S: SessionStore,
    {
        self.session_config.validate().map_err(SessionError::from)?;
        let transport = TcpTransport::bind(&self.bind_addr).await?;
        self.with_transport(transport, engine, store)
    }

    /// Builds the server on an already-bound transport.
    ///
    /// # Errors
    /// `Session(Config(..))` if the session config is invalid.
    pub fn with_transport<T, E, S>(
        self,
        transport: T,
        engine: E,
        store: Arc<S>,
    ) -> Result<DuelgridServer<T, E, S>, DuelgridError>
    where
        T: Transport,
        E: BoardEngine,
        S: SessionStore,
    {
        let keys = KeyRing::new(self.algorithm, self.key_policy);
        let mut manager = SessionManager::new(Arc::new(engine), store, keys, self.session_config)?;
        if let Some(provider) = self.automated {
            manager = manager.with_automated_opponent(provider);
        }
        Ok(DuelgridServer { transport, manager })
    }
}

impl Default for DuelgridServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Duelgrid server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct DuelgridServer<T: Transport, E, S> {
    transport: T,
    manager: SessionManager<T::Connection, E, S>,
}

impl<T, E, S> DuelgridServer<T, E, S>
where
    T: Transport,
    E: BoardEngine,
    S: SessionStore,
{
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The session manager, for lookups and operator actions while the
    /// server runs.
    pub fn manager(&self) -> SessionManager<T::Connection, E, S> {
        self.manager.clone()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), DuelgridError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then ends every live
    /// session with `SHUTDOWN` and logs the session totals.
    ///
    /// Connections still in the handshake when `shutdown` resolves are
    /// dropped first, so no session can appear after the sweep.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), DuelgridError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Duelgrid server running");
        tokio::pin!(shutdown);
        let mut admitting = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                // Reap finished admissions so the set doesn't grow.
                Some(_) = admitting.join_next(), if !admitting.is_empty() => {}
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let manager = self.manager.clone();
                        admitting.spawn(async move {
                            match manager.accept(conn).await {
                                Ok(session_id) => {
                                    tracing::debug!(%session_id, "connection seated");
                                }
                                Err(e) => {
                                    tracing::debug!(error = %e, "connection rejected");
                                }
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        admitting.shutdown().await;
        self.transport.shutdown().await?;
        let ended = self.manager.terminate_all(AbortReason::Shutdown).await;
        let stats = self.manager.stats().await;
        tracing::info!(
            ended,
            total_sessions = stats.total_sessions,
            peak_sessions = stats.peak_sessions,
            "Duelgrid server stopped"
        );
        Ok(())
    }
}
