#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Retro Party client integration tests.
//!
//! Provides a channel-driven [`MockTransport`] with its server-side
//! [`MockServer`] handle, a scripted [`MockConnector`], a scripted
//! [`MockApi`], a recording [`MockNavigator`] and game fixtures.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};

use retro_party_client::error::Result;
use retro_party_client::protocol::{
    AdvanceAck, Card, CardId, CardType, CreateGameResponse, CurrentRound, DeletedAck,
    GameStateResponse, GameStateUpdated, JoinGameResponse, NewCard, PhaseAck, PickWinnerAck,
    PlayerId, PlayerRole, PlayerSummary, ReadyAck, RoundId, RoundPhase, SubmissionId,
    SubmissionStatus, SubmittedAck, VoteAck, VoteStatus,
};
use retro_party_client::{
    ClientMessage, Connector, GameApi, GamePhase, GameState, MemoryStorage, Navigator,
    RealtimeConfig, RetroClientError, ServerEvent, SessionSynchronizer, Transport,
};

type Incoming = Option<std::result::Result<String, RetroClientError>>;

// ── MockTransport / MockServer ──────────────────────────────────────

/// Client side of an in-memory connection.
///
/// `recv()` yields whatever the paired [`MockServer`] pushes and hangs once
/// the server handle is gone. Everything the client sends is recorded.
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Incoming>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

/// Server side of a [`MockTransport`].
#[derive(Clone)]
pub struct MockServer {
    tx: mpsc::UnboundedSender<Incoming>,
    sent: Arc<StdMutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

pub fn mock_transport() -> (MockTransport, MockServer) {
    let (tx, incoming) = mpsc::unbounded_channel();
    let sent = Arc::new(StdMutex::new(Vec::new()));
    let closed = Arc::new(AtomicBool::new(false));
    let transport = MockTransport {
        incoming,
        sent: Arc::clone(&sent),
        closed: Arc::clone(&closed),
    };
    (transport, MockServer { tx, sent, closed })
}

impl MockServer {
    pub fn push(&self, event: &ServerEvent) {
        self.push_raw(&serde_json::to_string(event).unwrap());
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.tx.send(Some(Ok(text.to_string())));
    }

    /// Close the connection from the server side.
    pub fn hang_up(&self) {
        let _ = self.tx.send(None);
    }

    /// Fail the connection with a receive error.
    pub fn fail(&self) {
        let _ = self
            .tx
            .send(Some(Err(RetroClientError::TransportReceive("reset".into()))));
    }

    /// Control messages the client sent on this connection, in order.
    pub fn received(&self) -> Vec<ClientMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> std::result::Result<(), RetroClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RetroClientError::TransportClosed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Incoming {
        match self.incoming.recv().await {
            Some(item) => item,
            // Server handle dropped: stay open until the client closes.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> std::result::Result<(), RetroClientError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

#[derive(Default)]
struct ConnectorState {
    queue: StdMutex<VecDeque<std::result::Result<MockTransport, RetroClientError>>>,
    attempts: AtomicUsize,
    ready: Notify,
}

/// Scripted [`Connector`]. Each `connect()` takes the next queued outcome and
/// waits while the queue is empty. Clones share the same script.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<ConnectorState>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful connection and return its server handle.
    pub fn accept(&self) -> MockServer {
        let (transport, server) = mock_transport();
        self.state.queue.lock().unwrap().push_back(Ok(transport));
        self.state.ready.notify_one();
        server
    }

    /// Queue a failed connection attempt.
    pub fn refuse(&self) {
        self.state
            .queue
            .lock()
            .unwrap()
            .push_back(Err(RetroClientError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            ))));
        self.state.ready.notify_one();
    }

    /// Number of `connect()` calls so far.
    pub fn attempts(&self) -> usize {
        self.state.attempts.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> std::result::Result<Box<dyn Transport>, RetroClientError> {
        self.state.attempts.fetch_add(1, Ordering::AcqRel);
        loop {
            let next = self.state.queue.lock().unwrap().pop_front();
            match next {
                Some(Ok(transport)) => return Ok(Box::new(transport)),
                Some(Err(e)) => return Err(e),
                None => self.state.ready.notified().await,
            }
        }
    }
}

// ── MockApi ─────────────────────────────────────────────────────────

/// Scripted [`GameApi`]. Responses are queued per method name as JSON and
/// decoded into the method's return type. Unscripted calls fail.
#[derive(Default)]
pub struct MockApi {
    responses: StdMutex<HashMap<&'static str, VecDeque<std::result::Result<Value, RetroClientError>>>>,
    calls: StdMutex<Vec<String>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, method: &'static str, value: Value) {
        self.responses
            .lock()
            .unwrap()
            .entry(method)
            .or_default()
            .push_back(Ok(value));
    }

    pub fn fail(&self, method: &'static str, err: RetroClientError) {
        self.responses
            .lock()
            .unwrap()
            .entry(method)
            .or_default()
            .push_back(Err(err));
    }

    /// Every call as `"method arg arg …"`, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.split(' ').next() == Some(method))
            .count()
    }

    fn next<T: DeserializeOwned>(&self, method: &'static str, args: &[&dyn ToString]) -> Result<T> {
        let mut call = method.to_string();
        for arg in args {
            call.push(' ');
            call.push_str(&arg.to_string());
        }
        self.calls.lock().unwrap().push(call);

        let scripted = self
            .responses
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Ok(value)) => Ok(serde_json::from_value(value)?),
            Some(Err(e)) => Err(e),
            None => Err(RetroClientError::Http(format!("no scripted response for {method}"))),
        }
    }
}

#[async_trait]
impl GameApi for MockApi {
    async fn create_game(&self, display_name: &str, role: PlayerRole) -> Result<CreateGameResponse> {
        let role = serde_json::to_value(role).unwrap();
        self.next("create_game", &[&display_name, &role])
    }

    async fn join_game(&self, code: &str, display_name: &str) -> Result<JoinGameResponse> {
        self.next("join_game", &[&code, &display_name])
    }

    async fn get_game_state(&self, code: &str, token: &str) -> Result<GameStateResponse> {
        self.next("get_game_state", &[&code, &token])
    }

    async fn reconnect(&self, code: &str, token: &str) -> Result<GameStateResponse> {
        self.next("reconnect", &[&code, &token])
    }

    async fn start_game(&self, code: &str, token: &str) -> Result<PhaseAck> {
        self.next("start_game", &[&code, &token])
    }

    async fn submit_cards(&self, code: &str, token: &str, cards: &[NewCard]) -> Result<SubmittedAck> {
        self.next("submit_cards", &[&code, &token, &cards.len()])
    }

    async fn mark_ready(&self, code: &str, token: &str) -> Result<ReadyAck> {
        self.next("mark_ready", &[&code, &token])
    }

    async fn begin_game(&self, code: &str, token: &str) -> Result<PhaseAck> {
        self.next("begin_game", &[&code, &token])
    }

    async fn submit_card(
        &self,
        code: &str,
        round_id: RoundId,
        card_id: CardId,
        token: &str,
    ) -> Result<SubmittedAck> {
        self.next("submit_card", &[&code, &round_id, &card_id, &token])
    }

    async fn pick_winner(
        &self,
        code: &str,
        round_id: RoundId,
        submission_id: SubmissionId,
        token: &str,
    ) -> Result<PickWinnerAck> {
        self.next("pick_winner", &[&code, &round_id, &submission_id, &token])
    }

    async fn vote(&self, code: &str, round_id: RoundId, card_id: CardId, token: &str) -> Result<VoteAck> {
        self.next("vote", &[&code, &round_id, &card_id, &token])
    }

    async fn advance_round(&self, code: &str, token: &str) -> Result<AdvanceAck> {
        self.next("advance_round", &[&code, &token])
    }

    async fn finish_game(&self, code: &str, token: &str) -> Result<DeletedAck> {
        self.next("finish_game", &[&code, &token])
    }
}

// ── MockNavigator ───────────────────────────────────────────────────

/// Records every navigation and reports the last target as the current URL.
pub struct MockNavigator {
    url: StdMutex<String>,
    history: StdMutex<Vec<String>>,
}

impl MockNavigator {
    pub fn at(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: StdMutex::new(url.to_string()),
            history: StdMutex::new(Vec::new()),
        })
    }

    pub fn url(&self) -> String {
        self.url.lock().unwrap().clone()
    }

    pub fn history(&self) -> Vec<String> {
        self.history.lock().unwrap().clone()
    }
}

impl Navigator for MockNavigator {
    fn current_url(&self) -> String {
        self.url()
    }

    fn navigate(&self, url: &str) {
        *self.url.lock().unwrap() = url.to_string();
        self.history.lock().unwrap().push(url.to_string());
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

pub const CODE: &str = "AB12CD";
pub const TOKEN: &str = "t1";
pub const ME: PlayerId = 1;
pub const OTHER: PlayerId = 2;

pub fn player(id: PlayerId, name: &str, role: PlayerRole) -> PlayerSummary {
    PlayerSummary {
        id,
        display_name: name.into(),
        role,
        join_order: u32::try_from(id).unwrap_or_default(),
        score: 0,
        is_connected: true,
        is_ready: false,
        card_count: 0,
    }
}

pub fn round(id: RoundId, judge: Option<PlayerId>) -> CurrentRound {
    CurrentRound {
        id,
        round_number: u32::try_from(id).unwrap_or(1),
        judge_id: judge,
        adjective: "bold".into(),
        phase: RoundPhase::Submitting,
        is_final_round: false,
        submission_status: vec![
            SubmissionStatus {
                player_id: ME,
                display_name: "Ann".into(),
                has_submitted: false,
            },
            SubmissionStatus {
                player_id: OTHER,
                display_name: "Bo".into(),
                has_submitted: false,
            },
        ],
        vote_status: vec![
            VoteStatus {
                player_id: ME,
                display_name: "Ann".into(),
                has_voted: false,
            },
            VoteStatus {
                player_id: OTHER,
                display_name: "Bo".into(),
                has_voted: false,
            },
        ],
        revealed_submissions: None,
        winner_id: None,
        winning_card_id: None,
        winner_ids: vec![],
        winning_card_ids: vec![],
    }
}

/// A game created by [`ME`] with [`OTHER`] joined. Round-carrying phases get
/// round 1 judged by [`OTHER`].
pub fn game(phase: GamePhase) -> GameState {
    GameState {
        code: CODE.into(),
        phase,
        creator_id: ME,
        players: vec![
            player(ME, "Ann", PlayerRole::Player),
            player(OTHER, "Bo", PlayerRole::Player),
        ],
        current_round: phase.has_round().then(|| round(1, Some(OTHER))),
    }
}

pub fn hand() -> Vec<Card> {
    vec![
        Card {
            id: 11,
            card_type: CardType::Start,
            text: "pairing".into(),
        },
        Card {
            id: 12,
            card_type: CardType::Stop,
            text: "scope creep".into(),
        },
    ]
}

/// JSON body of a state/reconnect response.
pub fn state_response(game: &GameState, cards: &[Card], version: Option<u64>) -> Value {
    json!({ "game": game, "my_cards": cards, "version": version })
}

pub fn updated(game: GameState, version: Option<u64>) -> ServerEvent {
    ServerEvent::GameStateUpdated(GameStateUpdated { game, version })
}

pub fn join(code: &str, token: &str) -> ClientMessage {
    ClientMessage::JoinGameRoom(retro_party_client::protocol::RoomCredentials::new(code, token))
}

pub fn leave(code: &str, token: &str) -> ClientMessage {
    ClientMessage::LeaveGameRoom(retro_party_client::protocol::RoomCredentials::new(code, token))
}

// ── Harness ─────────────────────────────────────────────────────────

/// Millisecond-scale reconnects so tests stay fast.
pub fn fast_config() -> RealtimeConfig {
    RealtimeConfig {
        reconnect_delay: Duration::from_millis(5),
        max_reconnect_delay: Duration::from_millis(20),
        event_channel_capacity: 64,
        shutdown_timeout: Duration::from_millis(500),
    }
}

/// A synchronizer wired to mocks, plus handles to inspect them.
pub struct Harness {
    pub sync: SessionSynchronizer,
    pub api: Arc<MockApi>,
    pub connector: MockConnector,
    pub navigator: Arc<MockNavigator>,
    pub storage: MemoryStorage,
}

pub fn harness_at(url: &str) -> Harness {
    let api = MockApi::new();
    let connector = MockConnector::new();
    let navigator = MockNavigator::at(url);
    let storage = MemoryStorage::new();
    let sync = SessionSynchronizer::new(
        api.clone(),
        storage.clone(),
        connector.clone(),
        navigator.clone(),
        fast_config(),
    );
    Harness {
        sync,
        api,
        connector,
        navigator,
        storage,
    }
}

pub fn harness() -> Harness {
    harness_at("/")
}

impl Harness {
    /// Seed a session as a successful create would, with the connection
    /// already accepted.
    pub fn seeded(&mut self, phase: GamePhase) -> MockServer {
        let server = self.connector.accept();
        self.sync.seed_from_response(CODE, TOKEN, ME, game(phase), hand());
        server
    }
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait for the next event the synchronizer applies.
pub async fn next_outcome(
    sync: &mut SessionSynchronizer,
) -> retro_party_client::EventOutcome {
    tokio::time::timeout(Duration::from_secs(2), sync.next_update())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream closed")
}

/// Install a tracing subscriber once, honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
