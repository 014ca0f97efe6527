//! # Loopback Session Example
//!
//! Drives a [`SessionSynchronizer`] against an in-process fake server:
//!
//! - a channel-based loopback [`Transport`] and the [`Connector`] that hands it out
//! - a scripted "server" task that answers the room join with pushes
//! - a [`Navigator`] that just logs where the client would go
//!
//! No network is involved, which makes this the shape to copy for testing
//! screen logic against the synchronizer.
//!
//! ## Running
//!
//! ```sh
//! RUST_LOG=debug cargo run --example loopback_session
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use retro_party_client::error::Result as ApiResult;
use retro_party_client::protocol::{
    AdvanceAck, CardId, CreateGameResponse, DeletedAck, GameStateResponse, GameStateUpdated,
    JoinGameResponse, NewCard, PhaseAck, PickWinnerAck, PlayerConnectionChanged, PlayerRole,
    PlayerSummary, ReadyAck, RoundId, SubmissionId, SubmittedAck, VoteAck,
};
use retro_party_client::{
    ClientMessage, Connector, EventOutcome, GameApi, GamePhase, GameState, MemoryStorage,
    Navigator, RealtimeConfig, RetroClientError, ServerEvent, SessionSynchronizer, Transport,
};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A loopback transport and its connector
// ─────────────────────────────────────────────────────────────────────

/// Client half of an in-process connection.
struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

/// Server half: read what the client sent, push events back.
struct LoopbackServer {
    rx: mpsc::UnboundedReceiver<String>,
    tx: mpsc::UnboundedSender<String>,
}

fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        },
        LoopbackServer {
            rx: server_rx,
            tx: server_tx,
        },
    )
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), RetroClientError> {
        self.tx
            .send(message)
            .map_err(|e| RetroClientError::TransportSend(e.to_string()))
    }

    // Cancel-safe: `UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<String, RetroClientError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), RetroClientError> {
        self.rx.close();
        Ok(())
    }
}

/// Hands out one prepared transport; later attempts wait forever.
struct LoopbackConnector {
    transport: Mutex<Option<LoopbackTransport>>,
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, RetroClientError> {
        let next = self
            .transport
            .lock()
            .map_err(|_| RetroClientError::NotConnected)?
            .take();
        match next {
            Some(transport) => Ok(Box::new(transport)),
            None => std::future::pending().await,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: Collaborators the synchronizer needs
// ─────────────────────────────────────────────────────────────────────

/// The game is seeded directly, so no request ever reaches this API.
struct OfflineApi;

#[async_trait]
impl GameApi for OfflineApi {
    async fn create_game(&self, _: &str, _: PlayerRole) -> ApiResult<CreateGameResponse> {
        Err(RetroClientError::NotConnected)
    }
    async fn join_game(&self, _: &str, _: &str) -> ApiResult<JoinGameResponse> {
        Err(RetroClientError::NotConnected)
    }
    async fn get_game_state(&self, _: &str, _: &str) -> ApiResult<GameStateResponse> {
        Err(RetroClientError::NotConnected)
    }
    async fn reconnect(&self, _: &str, _: &str) -> ApiResult<GameStateResponse> {
        Err(RetroClientError::NotConnected)
    }
    async fn start_game(&self, _: &str, _: &str) -> ApiResult<PhaseAck> {
        Err(RetroClientError::NotConnected)
    }
    async fn submit_cards(&self, _: &str, _: &str, _: &[NewCard]) -> ApiResult<SubmittedAck> {
        Err(RetroClientError::NotConnected)
    }
    async fn mark_ready(&self, _: &str, _: &str) -> ApiResult<ReadyAck> {
        Err(RetroClientError::NotConnected)
    }
    async fn begin_game(&self, _: &str, _: &str) -> ApiResult<PhaseAck> {
        Err(RetroClientError::NotConnected)
    }
    async fn submit_card(&self, _: &str, _: RoundId, _: CardId, _: &str) -> ApiResult<SubmittedAck> {
        Err(RetroClientError::NotConnected)
    }
    async fn pick_winner(
        &self,
        _: &str,
        _: RoundId,
        _: SubmissionId,
        _: &str,
    ) -> ApiResult<PickWinnerAck> {
        Err(RetroClientError::NotConnected)
    }
    async fn vote(&self, _: &str, _: RoundId, _: CardId, _: &str) -> ApiResult<VoteAck> {
        Err(RetroClientError::NotConnected)
    }
    async fn advance_round(&self, _: &str, _: &str) -> ApiResult<AdvanceAck> {
        Err(RetroClientError::NotConnected)
    }
    async fn finish_game(&self, _: &str, _: &str) -> ApiResult<DeletedAck> {
        Err(RetroClientError::NotConnected)
    }
}

/// Logs navigations instead of performing them.
#[derive(Default)]
struct LogNavigator {
    url: Mutex<String>,
}

impl Navigator for LogNavigator {
    fn current_url(&self) -> String {
        self.url.lock().map(|u| u.clone()).unwrap_or_default()
    }

    fn navigate(&self, url: &str) {
        tracing::info!("navigate → {url}");
        if let Ok(mut current) = self.url.lock() {
            *current = url.to_string();
        }
    }
}

fn lobby() -> GameState {
    let player = |id, name: &str| PlayerSummary {
        id,
        display_name: name.into(),
        role: PlayerRole::Player,
        join_order: 0,
        score: 0,
        is_connected: true,
        is_ready: false,
        card_count: 0,
    };
    GameState {
        code: "DEMO42".into(),
        phase: GamePhase::Lobby,
        creator_id: 1,
        players: vec![player(1, "Ann"), player(2, "Bo")],
        current_round: None,
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Script the server and watch the synchronizer follow it
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (transport, mut server) = loopback_pair();
    let connector = LoopbackConnector {
        transport: Mutex::new(Some(transport)),
    };

    let mut sync = SessionSynchronizer::new(
        Arc::new(OfflineApi),
        MemoryStorage::new(),
        connector,
        Arc::new(LogNavigator::default()),
        RealtimeConfig::default(),
    );

    // Pretend a create request just succeeded.
    sync.seed_from_response("DEMO42", "demo-token", 1, lobby(), vec![]);

    // ── Fake server: wait for the room join, then push a few events ─
    let server_task = tokio::spawn(async move {
        while let Some(raw) = server.rx.recv().await {
            let Ok(message) = serde_json::from_str::<ClientMessage>(&raw) else {
                continue;
            };
            tracing::info!("server received {message:?}");
            if !matches!(message, ClientMessage::JoinGameRoom(_)) {
                continue;
            }

            let mut next = lobby();
            next.phase = GamePhase::CardCreation;
            let events = [
                ServerEvent::PlayerConnectionChanged(PlayerConnectionChanged {
                    player_id: 2,
                    is_connected: false,
                }),
                ServerEvent::GameStateUpdated(GameStateUpdated {
                    game: next,
                    version: Some(1),
                }),
            ];
            for event in &events {
                let Ok(json) = serde_json::to_string(event) else {
                    continue;
                };
                if server.tx.send(json).is_err() {
                    return;
                }
            }
        }
    });

    // ── Apply what arrives ──────────────────────────────────────────
    while let Some(outcome) = sync.next_update().await {
        tracing::info!(
            "{outcome:?}: phase={:?} players={:?}",
            sync.current_phase(),
            sync.game_state()
                .map(|s| s.players.iter().map(|p| (p.id, p.is_connected)).collect::<Vec<_>>())
        );
        if outcome == EventOutcome::Replaced {
            break;
        }
    }

    sync.reset().await;
    server_task.abort();
    tracing::info!("done");
    Ok(())
}
