//! Session synchronizer: the single owner of the client's view of one game.
//!
//! [`SessionSynchronizer`] holds the latest authoritative [`GameState`], the
//! caller's hand and the caller's own [`PlayerSummary`]. It merges three
//! sources into that view:
//!
//! - snapshots seeded from create/join responses,
//! - snapshots fetched over the [`GameApi`] (rehydration and refresh),
//! - pushes arriving on the [`RealtimeChannel`].
//!
//! Every merge is a synchronous replace-or-patch step, so requests and pushes
//! only interleave at `.await` points. After every install or patch the
//! synchronizer steers the [`Navigator`] to the screen of the current phase.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::GameApi;
use crate::protocol::{
    Card, CurrentRound, FinalScore, GamePhase, GameState, PlayerId, PlayerRole, PlayerSummary,
    ServerEvent,
};
use crate::realtime::{EventStream, RealtimeChannel, RealtimeConfig};
use crate::routes::{game_url, Navigator};
use crate::session::{Session, SessionStorage, SessionStore};
use crate::transport::Connector;

/// What applying one realtime event did to the held view.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// The held game state was replaced wholesale.
    Replaced,
    /// The hand was replaced.
    HandReplaced,
    /// One player's connection flag was patched.
    Patched,
    /// The game finished; the scores are passed through untouched.
    Finished(Vec<FinalScore>),
    /// The event could not apply (no session, no state, another game's
    /// state, or unknown player).
    Dropped,
    /// A versioned snapshot older than the held one was discarded.
    Stale,
}

/// Owner of the client-side view of one game session.
pub struct SessionSynchronizer {
    api: Arc<dyn GameApi>,
    sessions: SessionStore,
    channel: RealtimeChannel,
    navigator: Arc<dyn Navigator>,
    events: EventStream<ServerEvent>,
    game_state: Option<GameState>,
    state_version: Option<u64>,
    my_cards: Vec<Card>,
    my_player: Option<PlayerSummary>,
    is_initialised: bool,
}

impl SessionSynchronizer {
    pub fn new(
        api: Arc<dyn GameApi>,
        storage: impl SessionStorage + 'static,
        connector: impl Connector,
        navigator: Arc<dyn Navigator>,
        realtime_config: RealtimeConfig,
    ) -> Self {
        let channel = RealtimeChannel::new(connector, realtime_config);
        let events = channel.subscribe();
        Self {
            api,
            sessions: SessionStore::new(storage),
            channel,
            navigator,
            events,
            game_state: None,
            state_version: None,
            my_cards: Vec::new(),
            my_player: None,
            is_initialised: false,
        }
    }

    /// Wire an [`HttpGameApi`](crate::http::HttpGameApi) and a
    /// [`WebSocketConnector`](crate::transports::WebSocketConnector) from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RetroClientError::Http`](crate::RetroClientError::Http) if
    /// the HTTP client cannot be built.
    #[cfg(all(feature = "http-reqwest", feature = "transport-websocket"))]
    pub fn from_config(
        config: &crate::config::ClientConfig,
        storage: impl SessionStorage + 'static,
        navigator: Arc<dyn Navigator>,
    ) -> crate::error::Result<Self> {
        let api = crate::http::HttpGameApi::from_config(config)?;
        let connector = crate::transports::WebSocketConnector::new(config.realtime_url.clone());
        Ok(Self::new(
            Arc::new(api),
            storage,
            connector,
            navigator,
            config.realtime(),
        ))
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Shared handle to the request/response channel.
    pub fn api(&self) -> Arc<dyn GameApi> {
        Arc::clone(&self.api)
    }

    pub fn navigator(&self) -> Arc<dyn Navigator> {
        Arc::clone(&self.navigator)
    }

    /// The stored session, if any.
    pub fn session(&self) -> Option<Session> {
        self.sessions.get()
    }

    /// The realtime channel, for screens that subscribe to one event kind.
    pub fn channel(&self) -> &RealtimeChannel {
        &self.channel
    }

    pub fn game_state(&self) -> Option<&GameState> {
        self.game_state.as_ref()
    }

    /// Version of the held snapshot, when the server supplied one.
    pub fn state_version(&self) -> Option<u64> {
        self.state_version
    }

    pub fn my_cards(&self) -> &[Card] {
        &self.my_cards
    }

    pub fn my_player(&self) -> Option<&PlayerSummary> {
        self.my_player.as_ref()
    }

    pub fn is_initialised(&self) -> bool {
        self.is_initialised
    }

    // ── Derived facts ───────────────────────────────────────────────

    pub fn current_phase(&self) -> Option<GamePhase> {
        self.game_state.as_ref().map(|state| state.phase)
    }

    pub fn game_code(&self) -> Option<&str> {
        self.game_state.as_ref().map(|state| state.code.as_str())
    }

    pub fn current_round(&self) -> Option<&CurrentRound> {
        self.game_state.as_ref()?.current_round.as_ref()
    }

    /// `true` iff a round is running and the caller is its judge.
    pub fn is_judge(&self) -> bool {
        match (
            self.current_round().and_then(|round| round.judge_id),
            self.my_player.as_ref(),
        ) {
            (Some(judge), Some(me)) => judge == me.id,
            _ => false,
        }
    }

    pub fn is_creator(&self) -> bool {
        match (&self.game_state, &self.my_player) {
            (Some(state), Some(me)) => state.creator_id == me.id,
            _ => false,
        }
    }

    pub fn is_spectator(&self) -> bool {
        self.my_player
            .as_ref()
            .is_some_and(|me| me.role == PlayerRole::Spectator)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Rehydrate from the stored session.
    ///
    /// Returns `false` when there is no session, or when the server rejects
    /// it; in the latter case the session is cleared.
    pub async fn init_from_session(&mut self) -> bool {
        let Some(session) = self.sessions.get() else {
            debug!("no stored session to rehydrate");
            return false;
        };

        match self
            .api
            .reconnect(&session.game_code, &session.session_token)
            .await
        {
            Ok(response) => {
                self.install_state(response.game, response.version);
                self.my_cards = response.my_cards;
                self.derive_my_player(Some(session.player_id));
                self.is_initialised = true;
                debug!(game_code = %session.game_code, "session rehydrated");
                self.channel
                    .connect(&session.game_code, &session.session_token);
                self.follow_phase();
                true
            }
            Err(e) => {
                warn!(game_code = %session.game_code, "session rehydration failed: {e}");
                self.sessions.clear();
                false
            }
        }
    }

    /// Install the snapshot from a successful create/join without a request.
    pub fn seed_from_response(
        &mut self,
        game_code: &str,
        session_token: &str,
        player_id: PlayerId,
        game_state: GameState,
        cards: Vec<Card>,
    ) {
        self.sessions
            .save(&Session::new(game_code, session_token, player_id));
        self.install_state(game_state, None);
        self.my_cards = cards;
        self.derive_my_player(Some(player_id));
        self.is_initialised = true;
        debug!(game_code, player_id, "session seeded");
        self.channel.connect(game_code, session_token);
        self.follow_phase();
    }

    /// Re-fetch the authoritative snapshot. Failures are ignored.
    pub async fn refresh_state(&mut self) {
        let Some(session) = self.sessions.get() else {
            return;
        };

        match self
            .api
            .get_game_state(&session.game_code, &session.session_token)
            .await
        {
            Ok(response) => {
                if self.is_stale(response.version) {
                    debug!(
                        held = ?self.state_version,
                        incoming = ?response.version,
                        "ignoring refresh older than the held state"
                    );
                    return;
                }
                self.install_state(response.game, response.version);
                self.my_cards = response.my_cards;
                self.derive_my_player(None);
                self.follow_phase();
            }
            Err(e) => debug!("state refresh failed: {e}"),
        }
    }

    /// Leave the room and forget everything about the game.
    ///
    /// Events buffered before the reset are discarded.
    pub async fn reset(&mut self) {
        match self.sessions.get() {
            Some(session) => {
                let code = self
                    .game_code()
                    .map_or_else(|| session.game_code.clone(), str::to_owned);
                self.channel
                    .disconnect(&code, &session.session_token)
                    .await;
            }
            None => self.channel.close().await,
        }

        self.sessions.clear();
        self.game_state = None;
        self.state_version = None;
        self.my_cards.clear();
        self.my_player = None;
        self.is_initialised = false;
        self.events = self.channel.subscribe();
        debug!("session reset");
    }

    // ── Realtime events ─────────────────────────────────────────────

    /// Merge one realtime event into the held view.
    ///
    /// Applying the same event twice leaves the view as applying it once.
    pub fn apply_event(&mut self, event: &ServerEvent) -> EventOutcome {
        if !self.sessions.has_session() {
            debug!(kind = event.kind(), "no session, dropping event");
            return EventOutcome::Dropped;
        }

        match event {
            ServerEvent::GameStateUpdated(update) => {
                if !self.sessions.get().is_some_and(|s| s.matches_code(&update.game.code)) {
                    warn!(code = %update.game.code, "game state for another game, dropping");
                    return EventOutcome::Dropped;
                }
                if self.is_stale(update.version) {
                    warn!(
                        held = ?self.state_version,
                        incoming = ?update.version,
                        "discarding stale game state"
                    );
                    return EventOutcome::Stale;
                }
                self.install_state(update.game.clone(), update.version);
                self.derive_my_player(None);
                self.follow_phase();
                EventOutcome::Replaced
            }
            ServerEvent::YourCardsUpdated(update) => {
                self.my_cards = update.cards.clone();
                EventOutcome::HandReplaced
            }
            ServerEvent::GameFinished(finished) => {
                EventOutcome::Finished(finished.final_scores.clone())
            }
            ServerEvent::PlayerConnectionChanged(change) => {
                let Some(player) = self
                    .game_state
                    .as_mut()
                    .and_then(|state| state.players.iter_mut().find(|p| p.id == change.player_id))
                else {
                    debug!(player_id = change.player_id, "connection change for unknown player");
                    return EventOutcome::Dropped;
                };
                player.is_connected = change.is_connected;
                self.derive_my_player(None);
                self.follow_phase();
                EventOutcome::Patched
            }
        }
    }

    /// Wait for the next realtime event and apply it.
    ///
    /// Returns `None` when nothing is buffered and the realtime channel is
    /// not running: before the first seed or rehydration, and after
    /// [`reset`](Self::reset).
    pub async fn next_update(&mut self) -> Option<EventOutcome> {
        let event = match self.events.try_recv() {
            Some(event) => event,
            None if !self.channel.is_running() => return None,
            None => self.events.recv().await?,
        };
        Some(self.apply_event(&event))
    }

    /// Apply every event that is already buffered, without waiting.
    pub fn drain_pending(&mut self) -> Vec<EventOutcome> {
        let mut outcomes = Vec::new();
        while let Some(event) = self.events.try_recv() {
            outcomes.push(self.apply_event(&event));
        }
        outcomes
    }

    // ── Internals ───────────────────────────────────────────────────

    fn is_stale(&self, incoming: Option<u64>) -> bool {
        matches!((self.state_version, incoming), (Some(held), Some(v)) if v < held)
    }

    fn install_state(&mut self, game: GameState, version: Option<u64>) {
        if !game.round_is_consistent() {
            warn!(phase = %game.phase, "round presence does not match phase");
        }
        self.game_state = Some(game);
        self.state_version = version;
    }

    /// Look the caller up in the held state by `player_id`, falling back to
    /// the stored session's id.
    fn derive_my_player(&mut self, player_id: Option<PlayerId>) {
        let Some(id) = player_id.or_else(|| self.sessions.get().map(|s| s.player_id)) else {
            return;
        };
        self.my_player = self
            .game_state
            .as_ref()
            .and_then(|state| state.player(id))
            .cloned();
    }

    /// Move the navigator to the current phase's screen unless it is there.
    fn follow_phase(&self) {
        let Some(state) = &self.game_state else {
            return;
        };
        let segment = state.phase.route_segment();
        let current = self.navigator.current_url();
        let path = current.split(['?', '#']).next().unwrap_or_default();
        if path.trim_end_matches('/').ends_with(&format!("/{segment}")) {
            return;
        }
        let target = game_url(&state.code, state.phase);
        debug!(from = %current, to = %target, "phase changed, navigating");
        self.navigator.navigate(&target);
    }
}

impl std::fmt::Debug for SessionSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSynchronizer")
            .field("game_code", &self.game_code())
            .field("phase", &self.current_phase())
            .field("version", &self.state_version)
            .field("cards", &self.my_cards.len())
            .field("is_initialised", &self.is_initialised)
            .field("channel", &self.channel)
            .finish()
    }
}
