//! Wire-compatible protocol types for the Retro Party game server.
//!
//! Covers three surfaces:
//!
//! - the shared game model (`GameState`, `PlayerSummary`, `CurrentRound`, `Card`)
//! - request/response payloads of the HTTP API
//! - realtime events pushed by the server ([`ServerEvent`]) and the room
//!   control messages sent by the client ([`ClientMessage`])
//!
//! Every type serializes to the same JSON the server emits. Fields that only
//! exist in some rule variants (`vote_status`, `winner_ids`, …) default to
//! empty so payloads from either variant decode.

use serde::{Deserialize, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Unique identifier for players (stable for the game's lifetime).
pub type PlayerId = i64;

/// Unique identifier for rounds.
pub type RoundId = i64;

/// Unique identifier for cards.
pub type CardId = i64;

/// Unique identifier for round submissions.
pub type SubmissionId = i64;

// ── Enums ───────────────────────────────────────────────────────────

/// Coarse game-lifecycle stage. Ordered: a game only ever moves forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Lobby,
    CardCreation,
    Playing,
    FinalRound,
    Finished,
}

impl GamePhase {
    /// All phases in lifecycle order.
    pub const ALL: [GamePhase; 5] = [
        GamePhase::Lobby,
        GamePhase::CardCreation,
        GamePhase::Playing,
        GamePhase::FinalRound,
        GamePhase::Finished,
    ];

    /// Whether a game in this phase carries a `current_round`.
    pub fn has_round(self) -> bool {
        matches!(self, GamePhase::Playing | GamePhase::FinalRound)
    }

    /// The wire name of the phase (`"card_creation"`, …).
    pub fn as_str(self) -> &'static str {
        match self {
            GamePhase::Lobby => "lobby",
            GamePhase::CardCreation => "card_creation",
            GamePhase::Playing => "playing",
            GamePhase::FinalRound => "final_round",
            GamePhase::Finished => "finished",
        }
    }
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finer stage within a `playing` / `final_round` round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Players are submitting cards.
    Submitting,
    /// Submissions are revealed and the judge is picking.
    Revealed,
    /// Submissions are revealed and players are voting.
    Voting,
    /// A winner has been decided.
    Complete,
}

/// Category of a retro card.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Start,
    Stop,
    Continue,
}

impl CardType {
    /// All card categories.
    pub const ALL: [CardType; 3] = [CardType::Start, CardType::Stop, CardType::Continue];

    pub fn as_str(self) -> &'static str {
        match self {
            CardType::Start => "start",
            CardType::Stop => "stop",
            CardType::Continue => "continue",
        }
    }
}

impl std::fmt::Display for CardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a participant plays or only watches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlayerRole {
    #[default]
    Player,
    Spectator,
}

// ── Game model ──────────────────────────────────────────────────────

/// A card in the local player's hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub card_type: CardType,
    pub text: String,
}

/// A card authored during the card-creation phase, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCard {
    pub card_type: CardType,
    pub text: String,
}

impl NewCard {
    pub fn new(card_type: CardType, text: impl Into<String>) -> Self {
        Self {
            card_type,
            text: text.into(),
        }
    }
}

/// Public view of one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub id: PlayerId,
    pub display_name: String,
    pub role: PlayerRole,
    pub join_order: u32,
    pub score: i64,
    pub is_connected: bool,
    pub is_ready: bool,
    pub card_count: u32,
}

/// Whether one player has submitted a card this round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionStatus {
    pub player_id: PlayerId,
    pub display_name: String,
    pub has_submitted: bool,
}

/// Whether one player has voted this round (voting variant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteStatus {
    pub player_id: PlayerId,
    pub display_name: String,
    pub has_voted: bool,
}

/// A submission after reveal. Never carries its author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedSubmission {
    pub submission_id: SubmissionId,
    pub card_id: CardId,
    pub card_type: CardType,
    pub card_text: String,
}

/// The round in progress during `playing` / `final_round`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentRound {
    pub id: RoundId,
    pub round_number: u32,
    /// `None` under the voting variant.
    pub judge_id: Option<PlayerId>,
    pub adjective: String,
    pub phase: RoundPhase,
    #[serde(default)]
    pub is_final_round: bool,
    #[serde(default)]
    pub submission_status: Vec<SubmissionStatus>,
    #[serde(default)]
    pub vote_status: Vec<VoteStatus>,
    pub revealed_submissions: Option<Vec<RevealedSubmission>>,
    /// Single winner (judge variant).
    pub winner_id: Option<PlayerId>,
    /// Single winning card (judge variant).
    pub winning_card_id: Option<CardId>,
    /// Tied winners (voting variant).
    #[serde(default)]
    pub winner_ids: Vec<PlayerId>,
    /// Tied winning cards (voting variant).
    #[serde(default)]
    pub winning_card_ids: Vec<CardId>,
}

/// Server-owned snapshot of a game, mirrored wholesale by every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub code: String,
    pub phase: GamePhase,
    pub creator_id: PlayerId,
    pub players: Vec<PlayerSummary>,
    pub current_round: Option<CurrentRound>,
}

impl GameState {
    /// Look up a participant by id.
    pub fn player(&self, id: PlayerId) -> Option<&PlayerSummary> {
        self.players.iter().find(|p| p.id == id)
    }

    /// `current_round` is present exactly when the phase has rounds.
    pub fn round_is_consistent(&self) -> bool {
        self.phase.has_round() == self.current_round.is_some()
    }
}

/// One line of the final scoreboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalScore {
    pub player_id: PlayerId,
    pub display_name: String,
    pub score: i64,
}

// ── HTTP payloads ───────────────────────────────────────────────────

/// Body of `POST /api/games`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameRequest {
    pub display_name: String,
    pub role: PlayerRole,
}

/// Response of `POST /api/games`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGameResponse {
    pub game_code: String,
    pub session_token: String,
    pub player_id: PlayerId,
    pub player: PlayerSummary,
}

/// Body of `POST /api/games/{code}/join`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGameRequest {
    pub display_name: String,
}

/// Response of `POST /api/games/{code}/join`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGameResponse {
    pub session_token: String,
    pub player_id: PlayerId,
    pub player: PlayerSummary,
}

/// Response of the state and reconnect endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStateResponse {
    pub game: GameState,
    #[serde(default)]
    pub my_cards: Vec<Card>,
    /// Monotonic state version, when the server provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// Body of `POST /api/games/{code}/cards`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitCardsRequest {
    pub cards: Vec<NewCard>,
}

/// Body of `POST /api/games/{code}/rounds/{round}/submit` and `/vote`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardChoice {
    pub card_id: CardId,
}

/// Body of `POST /api/games/{code}/rounds/{round}/pick-winner`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinnerChoice {
    pub submission_id: SubmissionId,
}

/// Acknowledgement of start / begin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseAck {
    pub phase: GamePhase,
}

/// Acknowledgement of mark-ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyAck {
    pub ready: bool,
}

/// Acknowledgement of card submission (both the initial set and per round).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedAck {
    pub submitted: bool,
}

/// Acknowledgement of the judge's pick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickWinnerAck {
    pub winner_player_id: PlayerId,
    pub final_round_triggered: bool,
}

/// Acknowledgement of a vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteAck {
    pub voted: bool,
    pub game_finished: bool,
}

/// Acknowledgement of advance-round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceAck {
    pub round_number: u32,
}

/// Acknowledgement of finish/delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedAck {
    pub deleted: bool,
}

/// Error body returned with non-success statuses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

// ── Realtime events ─────────────────────────────────────────────────

/// Full game state replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStateUpdated {
    pub game: GameState,
    /// Monotonic state version, when the server provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// Local hand replace (sent only to the owning client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YourCardsUpdated {
    pub cards: Vec<Card>,
}

/// The game has finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameFinished {
    pub final_scores: Vec<FinalScore>,
}

/// Incremental connection-status patch for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerConnectionChanged {
    pub player_id: PlayerId,
    pub is_connected: bool,
}

/// Events pushed from the server to room members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    GameStateUpdated(GameStateUpdated),
    YourCardsUpdated(YourCardsUpdated),
    GameFinished(GameFinished),
    PlayerConnectionChanged(PlayerConnectionChanged),
}

impl ServerEvent {
    /// Wire name of the event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::GameStateUpdated(_) => "game_state_updated",
            ServerEvent::YourCardsUpdated(_) => "your_cards_updated",
            ServerEvent::GameFinished(_) => "game_finished",
            ServerEvent::PlayerConnectionChanged(_) => "player_connection_changed",
        }
    }
}

/// Game code and token identifying one room membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCredentials {
    pub game_code: String,
    pub session_token: String,
}

impl RoomCredentials {
    pub fn new(game_code: impl Into<String>, session_token: impl Into<String>) -> Self {
        Self {
            game_code: game_code.into(),
            session_token: session_token.into(),
        }
    }
}

/// Control messages sent from client to server over the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join (or re-join) the game room.
    JoinGameRoom(RoomCredentials),
    /// Leave the game room.
    LeaveGameRoom(RoomCredentials),
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lobby_json() -> serde_json::Value {
        json!({
            "code": "AB12CD",
            "phase": "lobby",
            "creator_id": 1,
            "players": [{
                "id": 1,
                "display_name": "Ann",
                "role": "player",
                "join_order": 0,
                "score": 0,
                "is_connected": true,
                "is_ready": false,
                "card_count": 0
            }],
            "current_round": null
        })
    }

    #[test]
    fn decodes_game_state_updated_event() {
        let raw = json!({ "type": "game_state_updated", "game": lobby_json() });
        let event: ServerEvent = serde_json::from_value(raw).unwrap();
        let ServerEvent::GameStateUpdated(update) = event else {
            panic!("expected game_state_updated");
        };
        assert_eq!(update.game.code, "AB12CD");
        assert_eq!(update.game.phase, GamePhase::Lobby);
        assert_eq!(update.version, None);
        assert!(update.game.round_is_consistent());
    }

    #[test]
    fn decodes_connection_changed_event() {
        let raw = r#"{"type":"player_connection_changed","player_id":7,"is_connected":false}"#;
        let event: ServerEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(
            event,
            ServerEvent::PlayerConnectionChanged(PlayerConnectionChanged {
                player_id: 7,
                is_connected: false,
            })
        );
        assert_eq!(event.kind(), "player_connection_changed");
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let raw = r#"{"type":"chat_message","text":"hi"}"#;
        assert!(serde_json::from_str::<ServerEvent>(raw).is_err());
    }

    #[test]
    fn judge_variant_round_fills_voting_fields_with_defaults() {
        let raw = json!({
            "id": 3,
            "round_number": 2,
            "judge_id": 1,
            "adjective": "Bold",
            "phase": "revealed",
            "submission_status": [
                { "player_id": 2, "display_name": "Bo", "has_submitted": true }
            ],
            "revealed_submissions": [
                { "submission_id": 9, "card_id": 44, "card_type": "stop", "card_text": "Meetings" }
            ],
            "winner_id": null,
            "winning_card_id": null
        });
        let round: CurrentRound = serde_json::from_value(raw).unwrap();
        assert_eq!(round.judge_id, Some(1));
        assert!(!round.is_final_round);
        assert!(round.vote_status.is_empty());
        assert!(round.winner_ids.is_empty());
        assert_eq!(round.revealed_submissions.unwrap()[0].card_type, CardType::Stop);
    }

    #[test]
    fn join_room_uses_adjacent_tagging() {
        let msg = ClientMessage::JoinGameRoom(RoomCredentials::new("AB12CD", "t1"));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "join_game_room",
                "data": { "game_code": "AB12CD", "session_token": "t1" }
            })
        );
    }

    #[test]
    fn state_response_tolerates_missing_cards_and_extra_type_field() {
        let raw = json!({ "type": "game_state", "game": lobby_json() });
        let response: GameStateResponse = serde_json::from_value(raw).unwrap();
        assert!(response.my_cards.is_empty());
        assert_eq!(response.version, None);
    }

    #[test]
    fn phases_are_ordered_and_only_rounds_phases_have_rounds() {
        assert!(GamePhase::Lobby < GamePhase::CardCreation);
        assert!(GamePhase::FinalRound < GamePhase::Finished);
        let with_round: Vec<_> = GamePhase::ALL.into_iter().filter(|p| p.has_round()).collect();
        assert_eq!(with_round, vec![GamePhase::Playing, GamePhase::FinalRound]);
        assert_eq!(GamePhase::CardCreation.to_string(), "card_creation");
    }

    #[test]
    fn inconsistent_round_is_detected() {
        let mut state: GameState = serde_json::from_value(lobby_json()).unwrap();
        state.phase = GamePhase::Playing;
        assert!(!state.round_is_consistent());
    }
}
