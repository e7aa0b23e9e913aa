//! # Duelgrid
//!
//! Secure two-player board game sessions.
//!
//! Every connection starts with an ML-KEM key exchange; after that each
//! message travels in a ChaCha20-Poly1305 frame bound to its sequence
//! number. The server pairs players first come, first served (or against an
//! automated opponent), runs each game in its own task, and hands the final
//! record to a [`SessionStore`](prelude::SessionStore).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use duelgrid::prelude::*;
//!
//! # async fn serve() -> Result<(), DuelgridError> {
//! init_tracing();
//! let server = DuelgridServerBuilder::new()
//!     .bind("0.0.0.0:7878")
//!     .build(TicTacToeEngine, std::sync::Arc::new(MemoryStore::new()))
//!     .await?;
//! server.run().await
//! # }
//! ```

mod client;
mod error;
mod server;

pub use client::GameClient;
pub use error::DuelgridError;
pub use server::{DuelgridServer, DuelgridServerBuilder};

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
/// Does nothing if a subscriber is already installed.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

pub mod prelude {
    pub use crate::{DuelgridError, DuelgridServer, DuelgridServerBuilder, GameClient, init_tracing};
    pub use duelgrid_channel::KeyPolicy;
    pub use duelgrid_game::{
        BoardEngine, FirstAvailable, GameStatus, IllegalMove, MinimaxMove, MoveProvider,
        RandomMove, TicTacToeEngine,
    };
    pub use duelgrid_protocol::{
        AbortReason, BoardState, ClientMessage, KemAlgorithm, Mark, Move, Opponent, Outcome,
        PlayerId, ServerMessage, SessionId, SessionStatus,
    };
    pub use duelgrid_session::{
        ConfigError, MemoryStore, ServerStats, SessionConfig, SessionError, SessionManager,
        SessionRecord, SessionStore, StoreError,
    };
    pub use duelgrid_transport::{Connection, TcpConnection, TcpTransport, Transport};
}
