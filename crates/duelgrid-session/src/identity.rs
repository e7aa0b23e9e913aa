//! Identity issuer: random player and session identifiers.
//!
//! Identifiers are 128 random bits from the thread-local CSPRNG, so there
//! is no shared counter to coordinate and guessing a live ID is
//! infeasible.

use duelgrid_protocol::{ID_LEN, PlayerId, SessionId};
use rand::Rng;

/// Issues unguessable identifiers. Stateless; copy it freely.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityIssuer;

impl IdentityIssuer {
    pub fn issue_player_id(&self) -> PlayerId {
        PlayerId::from_bytes(random_bytes())
    }

    pub fn issue_session_id(&self) -> SessionId {
        SessionId::from_bytes(random_bytes())
    }
}

fn random_bytes() -> [u8; ID_LEN] {
    rand::rng().random()
}
