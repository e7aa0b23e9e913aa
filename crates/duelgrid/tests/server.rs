//! End-to-end tests: a real server on a TCP port and `GameClient`s.

use std::sync::Arc;
use std::time::Duration;

use duelgrid::prelude::*;
use tokio::sync::oneshot;

// =========================================================================
// Helpers
// =========================================================================

type TcpManager = SessionManager<TcpConnection, TicTacToeEngine, MemoryStore>;

/// Starts a server on a random port.
async fn start_server(builder: DuelgridServerBuilder) -> (String, TcpManager, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let server = builder
        .bind("127.0.0.1:0")
        .build(TicTacToeEngine, Arc::clone(&store))
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let manager = server.manager();

    tokio::spawn(async move {
        let _ = server.run().await;
    });
    (addr, manager, store)
}

async fn next(client: &mut GameClient) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(5), client.next_message())
        .await
        .expect("timed out waiting for a server message")
        .expect("server message")
}

/// Plays the first open cell on every turn until the game ends.
async fn play_first_open(mut client: GameClient) -> (Mark, PlayerId, SessionId, Outcome) {
    let mut mark = None;
    loop {
        match next(&mut client).await {
            ServerMessage::GameStarted { mark: m, .. } => mark = Some(m),
            ServerMessage::YourTurn { state } => {
                client.play(state.open_positions()[0]).await.unwrap();
            }
            ServerMessage::GameOver { outcome, .. } => {
                return (
                    mark.unwrap(),
                    client.player_id().unwrap(),
                    client.session_id().unwrap(),
                    outcome,
                );
            }
            _ => {}
        }
    }
}

async fn wait_for_saved(store: &MemoryStore, session_id: SessionId) -> SessionRecord {
    for _ in 0..200 {
        if let Ok(record) = store.load(session_id).await {
            if record.status.is_terminal() {
                return record;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session {session_id} was never saved");
}

// =========================================================================
// Games
// =========================================================================

#[tokio::test]
async fn test_run_two_clients_play_to_completion() {
    let (addr, manager, store) = start_server(DuelgridServerBuilder::new()).await;

    let a = GameClient::connect(&addr, Opponent::Human).await.unwrap();
    let b = GameClient::connect(&addr, Opponent::Human).await.unwrap();
    let a = tokio::spawn(play_first_open(a));
    let b = tokio::spawn(play_first_open(b));
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    // With both taking the first open cell, X completes 2-4-6.
    let x = if a.0 == Mark::X { a.1 } else { b.1 };
    assert_eq!(a.3, Outcome::Win { winner: x });
    assert_eq!(b.3, Outcome::Win { winner: x });
    assert_ne!(a.0, b.0);
    assert_eq!(a.2, b.2);

    let stats = loop {
        let stats = manager.stats().await;
        if stats.active_sessions == 0 {
            break stats;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    };
    assert_eq!(stats.total_sessions, 1);
    assert_eq!(store.total_saves().await, 1);
}

#[tokio::test]
async fn test_run_automated_opponent_game_saved() {
    let builder = DuelgridServerBuilder::new().automated_opponent(FirstAvailable);
    let (addr, _manager, store) = start_server(builder).await;

    let client = GameClient::connect(&addr, Opponent::Automated).await.unwrap();
    let (mark, player, session_id, outcome) = play_first_open(client).await;

    assert_eq!(mark, Mark::X);
    assert_eq!(outcome, Outcome::Win { winner: player });
    let record = wait_for_saved(&store, session_id).await;
    assert_eq!(record.second_player.map(|p| p != player), Some(true));
}

#[tokio::test]
async fn test_run_key_rotation_and_algorithm_games_still_start() {
    let builder = DuelgridServerBuilder::new()
        .algorithm(KemAlgorithm::MlKem1024)
        .key_policy(KeyPolicy::Rotating {
            interval: Duration::from_secs(60),
        })
        .automated_opponent(RandomMove);
    let (addr, _manager, _store) = start_server(builder).await;

    for _ in 0..2 {
        let mut client = GameClient::connect(&addr, Opponent::Automated).await.unwrap();
        assert!(matches!(next(&mut client).await, ServerMessage::Welcome { .. }));
        assert!(matches!(
            next(&mut client).await,
            ServerMessage::GameStarted { .. }
        ));
    }
}

// =========================================================================
// Session management
// =========================================================================

#[tokio::test]
async fn test_terminate_notifies_waiting_client() {
    let (addr, manager, store) = start_server(DuelgridServerBuilder::new()).await;
    let mut client = GameClient::connect(&addr, Opponent::Human).await.unwrap();
    let ServerMessage::Welcome { session_id, .. } = next(&mut client).await else {
        panic!("expected Welcome");
    };

    let record = manager
        .terminate(session_id, AbortReason::Terminated)
        .await
        .unwrap();
    assert_eq!(
        record.status,
        SessionStatus::Aborted {
            reason: AbortReason::Terminated
        }
    );
    assert!(matches!(
        next(&mut client).await,
        ServerMessage::Aborted {
            reason: AbortReason::Terminated
        }
    ));
    assert_eq!(store.save_count(session_id).await, 1);
}

#[tokio::test]
async fn test_resume_after_game_returns_summary() {
    let builder = DuelgridServerBuilder::new().automated_opponent(FirstAvailable);
    let (addr, _manager, store) = start_server(builder).await;

    let mut client = GameClient::connect(&addr, Opponent::Automated).await.unwrap();
    let ServerMessage::Welcome { session_id, .. } = next(&mut client).await else {
        panic!("expected Welcome");
    };
    play_first_open(client).await;
    wait_for_saved(&store, session_id).await;

    match GameClient::resume(&addr, session_id).await.unwrap() {
        ServerMessage::SessionSummary { status, board, .. } => {
            assert!(matches!(status, SessionStatus::Completed { .. }));
            assert_eq!(board.unwrap().move_count, 7);
        }
        other => panic!("expected SessionSummary, got {other:?}"),
    }
}

#[tokio::test]
async fn test_leave_aborts_opponent_disconnected() {
    let (addr, _manager, _store) = start_server(DuelgridServerBuilder::new()).await;
    let mut a = GameClient::connect(&addr, Opponent::Human).await.unwrap();
    assert!(matches!(next(&mut a).await, ServerMessage::Welcome { .. }));
    let mut b = GameClient::connect(&addr, Opponent::Human).await.unwrap();
    assert!(matches!(next(&mut b).await, ServerMessage::Welcome { .. }));

    a.leave().await.unwrap();
    loop {
        if let ServerMessage::Aborted { reason } = next(&mut b).await {
            assert_eq!(reason, AbortReason::Disconnected);
            break;
        }
    }
}

#[tokio::test]
async fn test_play_before_welcome_not_seated() {
    let (addr, _manager, _store) = start_server(DuelgridServerBuilder::new()).await;
    let mut client = GameClient::connect(&addr, Opponent::Human).await.unwrap();

    assert!(matches!(client.play(0).await, Err(DuelgridError::NotSeated)));
}

#[tokio::test]
async fn test_run_until_shutdown_aborts_live_sessions() {
    let store = Arc::new(MemoryStore::new());
    let server = DuelgridServerBuilder::new()
        .bind("127.0.0.1:0")
        .build(TicTacToeEngine, Arc::clone(&store))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));

    let mut client = GameClient::connect(&addr, Opponent::Human).await.unwrap();
    assert!(matches!(next(&mut client).await, ServerMessage::Welcome { .. }));

    stop_tx.send(()).unwrap();
    running.await.unwrap().unwrap();

    assert!(matches!(
        next(&mut client).await,
        ServerMessage::Aborted {
            reason: AbortReason::Shutdown
        }
    ));
    assert_eq!(store.total_saves().await, 1);
}

#[tokio::test]
async fn test_run_until_shutdown_drops_connections_mid_handshake() {
    let store = Arc::new(MemoryStore::new());
    let server = DuelgridServerBuilder::new()
        .bind("127.0.0.1:0")
        .build(TicTacToeEngine, Arc::clone(&store))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let manager = server.manager();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let running = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));

    // Take the server's key offer and never answer it.
    let stalled = TcpConnection::connect(&addr).await.unwrap();
    assert!(stalled.recv().await.unwrap().is_some());

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("shutdown should not wait for the handshake timeout")
        .unwrap()
        .unwrap();

    assert!(!matches!(stalled.recv().await, Ok(Some(_))));
    assert_eq!(manager.stats().await.total_sessions, 0);
    assert_eq!(store.total_saves().await, 0);
}

#[tokio::test]
async fn test_build_invalid_session_config_rejected() {
    let result = DuelgridServerBuilder::new()
        .bind("127.0.0.1:0")
        .session_config(SessionConfig {
            board_dimension: 40,
            ..SessionConfig::default()
        })
        .build(TicTacToeEngine, Arc::new(MemoryStore::new()))
        .await;

    assert!(matches!(
        result,
        Err(DuelgridError::Session(SessionError::Config(
            ConfigError::BoardDimension(40)
        )))
    ));
}

#[tokio::test]
async fn test_run_minimax_opponent_never_loses_to_first_open() {
    let builder = DuelgridServerBuilder::new().automated_opponent(MinimaxMove::default());
    let (addr, _manager, _store) = start_server(builder).await;

    let client = GameClient::connect(&addr, Opponent::Automated).await.unwrap();
    let (_, player, _, outcome) = play_first_open(client).await;

    assert_ne!(outcome, Outcome::Win { winner: player });
}
