use std::sync::Arc;
use std::time::Duration;

use duelgrid::prelude::*;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const DEFAULT_ADDR: &str = "0.0.0.0:7878";

/// Server settings read from the environment.
#[derive(Debug, Clone, PartialEq)]
struct DemoConfig {
    addr: String,
    idle_timeout: Option<Duration>,
    key_rotation: Option<Duration>,
}

impl DemoConfig {
    fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `DUELGRID_ADDR`, `DUELGRID_IDLE_SECS`, `DUELGRID_KEY_ROTATION_SECS`.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        Ok(Self {
            addr: lookup("DUELGRID_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string()),
            idle_timeout: secs(&lookup, "DUELGRID_IDLE_SECS")?,
            key_rotation: secs(&lookup, "DUELGRID_KEY_ROTATION_SECS")?,
        })
    }

    fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::default();
        if let Some(idle) = self.idle_timeout {
            config.idle_timeout = idle;
        }
        config
    }

    fn key_policy(&self) -> KeyPolicy {
        match self.key_rotation {
            Some(interval) => KeyPolicy::Rotating { interval },
            None => KeyPolicy::PerHandshake,
        }
    }
}

fn secs(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<Duration>, String> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(0) => Err(format!("{key} must be greater than zero")),
            Ok(n) => Ok(Some(Duration::from_secs(n))),
            Err(_) => Err(format!("{key} must be a whole number of seconds, got {raw:?}")),
        },
    }
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let config = DemoConfig::from_env()?;
    tracing::info!(
        addr = %config.addr,
        idle_timeout = ?config.idle_timeout,
        key_rotation = ?config.key_rotation,
        "starting tic-tac-toe server"
    );

    let server = DuelgridServerBuilder::new()
        .bind(&config.addr)
        .session_config(config.session_config())
        .key_policy(config.key_policy())
        .automated_opponent(RandomMove)
        .build(TicTacToeEngine, Arc::new(MemoryStore::new()))
        .await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await?;
    Ok(())
}
