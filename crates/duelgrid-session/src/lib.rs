//! Session management for Duelgrid.
//!
//! This crate turns authenticated connections into games:
//!
//! 1. **Admission**: key exchange plus key confirmation ([`SessionManager::accept`])
//! 2. **Pairing**: first come, first served, or against an automated
//!    opponent ([`MoveSource`])
//! 3. **Sessions**: one actor task per game, owning the board and both
//!    channels, with an idle timeout and a single teardown path
//! 4. **Persistence**: a [`SessionStore`] that receives each session's
//!    final [`SessionRecord`]
//!
//! # How it fits in the stack
//!
//! ```text
//! Server (above)              ← accepts transports, drives the manager
//!     ↕
//! Session Layer (this crate)  ← registry, pairing, session actors
//!     ↕
//! Channel + Game (below)      ← secure channels, board engine, move providers
//! ```

mod actor;
mod config;
mod error;
mod identity;
mod manager;
mod record;
mod registry;
mod store;

pub use actor::MoveSource;
pub use config::{ConfigError, SessionConfig};
pub use error::SessionError;
pub use identity::IdentityIssuer;
pub use manager::SessionManager;
pub use record::{ChannelCounters, SessionRecord};
pub use registry::ServerStats;
pub use store::{MemoryStore, SessionStore, StoreError};
