//! Per-screen action controllers.
//!
//! Each controller owns one [`ActionTracker`], so at most one request per
//! screen is outstanding. Controllers never write game state themselves:
//! successful actions are reflected back through realtime pushes, and the
//! controllers only read the [`SessionSynchronizer`] to reconcile their
//! optimistic markers with the server's status arrays.
//!
//! Failures come back as [`ActionResult::Failed`] carrying a [`Notice`] with
//! the server's message or a fixed fallback text.

use std::cmp::Reverse;

use crate::error::{Result, RetroClientError};
use crate::protocol::{
    AdvanceAck, CardId, CardType, DeletedAck, GamePhase, NewCard, PhaseAck, PickWinnerAck,
    PlayerRole, PlayerSummary, SubmissionId, VoteAck,
};
use crate::reconcile::{self, ActionResult, ActionTracker, Notice, Scope};
use crate::routes::ENTRY_ROUTE;
use crate::synchronizer::SessionSynchronizer;

/// Longest accepted display name, in characters.
pub const MAX_DISPLAY_NAME_CHARS: usize = 50;

/// Length of a game code, in characters.
pub const GAME_CODE_LEN: usize = 6;

/// Longest accepted card text, in characters.
pub const MAX_CARD_TEXT_CHARS: usize = 500;

/// Cards each player authors per [`CardType`].
pub const CARDS_PER_TYPE: usize = 2;

// ── Input validation ────────────────────────────────────────────────

/// Trimmed display name, 1 to 50 characters.
pub fn validate_display_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RetroClientError::InvalidInput(
            "Display name is required".into(),
        ));
    }
    if name.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(RetroClientError::InvalidInput(format!(
            "Display name must be at most {MAX_DISPLAY_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

/// Upper-cased game code of exactly six characters.
pub fn normalize_game_code(code: &str) -> Result<String> {
    let code = code.trim().to_uppercase();
    if code.chars().count() != GAME_CODE_LEN {
        return Err(RetroClientError::InvalidInput(format!(
            "Game code must be {GAME_CODE_LEN} characters"
        )));
    }
    Ok(code)
}

/// Exactly two non-empty cards of each type, none longer than 500 characters.
pub fn validate_card_set(cards: &[NewCard]) -> Result<()> {
    for card in cards {
        let text = card.text.trim();
        if text.is_empty() {
            return Err(RetroClientError::InvalidInput(
                "Card text is required".into(),
            ));
        }
        if text.chars().count() > MAX_CARD_TEXT_CHARS {
            return Err(RetroClientError::InvalidInput(format!(
                "Card text must be at most {MAX_CARD_TEXT_CHARS} characters"
            )));
        }
    }
    for card_type in CardType::ALL {
        let count = cards.iter().filter(|c| c.card_type == card_type).count();
        if count != CARDS_PER_TYPE {
            return Err(RetroClientError::InvalidInput(format!(
                "Expected {CARDS_PER_TYPE} {card_type} cards, got {count}"
            )));
        }
    }
    Ok(())
}

fn rejected<T>(err: RetroClientError, fallback: &str) -> ActionResult<T> {
    ActionResult::Failed(Notice::from_error(&err, fallback))
}

// ── Landing ─────────────────────────────────────────────────────────

/// Create or join a game from the entry screen.
#[derive(Debug, Default)]
pub struct LandingActions {
    tracker: ActionTracker,
}

impl LandingActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a game, fetch its state and seed the synchronizer.
    pub async fn create_game(
        &mut self,
        sync: &mut SessionSynchronizer,
        display_name: &str,
        role: PlayerRole,
    ) -> ActionResult<()> {
        const FALLBACK: &str = "Failed to create game.";
        let name = match validate_display_name(display_name) {
            Ok(name) => name,
            Err(e) => return rejected(e, FALLBACK),
        };

        let api = sync.api();
        let result = self
            .tracker
            .perform(None, FALLBACK, async move {
                let created = api.create_game(&name, role).await?;
                let state = api
                    .get_game_state(&created.game_code, &created.session_token)
                    .await?;
                Ok((created, state))
            })
            .await;

        result.map(|(created, state)| {
            sync.seed_from_response(
                &created.game_code,
                &created.session_token,
                created.player_id,
                state.game,
                state.my_cards,
            );
        })
    }

    /// Join the game `code`, fetch its state and seed the synchronizer.
    pub async fn join_game(
        &mut self,
        sync: &mut SessionSynchronizer,
        code: &str,
        display_name: &str,
    ) -> ActionResult<()> {
        const FALLBACK: &str = "Failed to join game.";
        let (code, name) = match normalize_game_code(code)
            .and_then(|code| Ok((code, validate_display_name(display_name)?)))
        {
            Ok(valid) => valid,
            Err(e) => return rejected(e, FALLBACK),
        };

        let api = sync.api();
        let request_code = code.clone();
        let result = self
            .tracker
            .perform(None, FALLBACK, async move {
                let joined = api.join_game(&request_code, &name).await?;
                let state = api
                    .get_game_state(&request_code, &joined.session_token)
                    .await?;
                Ok((joined, state))
            })
            .await;

        result.map(|(joined, state)| {
            sync.seed_from_response(
                &code,
                &joined.session_token,
                joined.player_id,
                state.game,
                state.my_cards,
            );
        })
    }
}

// ── Lobby ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct LobbyActions {
    tracker: ActionTracker,
}

impl LobbyActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// lobby → card_creation. Only the creator can start.
    pub async fn start_game(&mut self, sync: &SessionSynchronizer) -> ActionResult<PhaseAck> {
        let Some(session) = sync.session().filter(|_| sync.is_creator()) else {
            return ActionResult::Skipped;
        };
        let api = sync.api();
        self.tracker
            .perform(None, "Failed to start game.", async move {
                api.start_game(&session.game_code, &session.session_token)
                    .await
            })
            .await
    }
}

// ── Card creation ───────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct CardCreationActions {
    tracker: ActionTracker,
}

impl CardCreationActions {
    const SCOPE: Scope = Scope::Phase(GamePhase::CardCreation);

    pub fn new() -> Self {
        Self::default()
    }

    /// Submit the full card set, then mark the caller ready.
    pub async fn submit_cards(
        &mut self,
        sync: &SessionSynchronizer,
        cards: Vec<NewCard>,
    ) -> ActionResult<()> {
        const FALLBACK: &str = "Failed to submit cards.";
        if let Err(e) = validate_card_set(&cards) {
            return rejected(e, FALLBACK);
        }
        if self.has_submitted(sync) {
            return ActionResult::Skipped;
        }
        let Some(session) = sync.session() else {
            return ActionResult::Skipped;
        };

        let cards: Vec<NewCard> = cards
            .into_iter()
            .map(|card| NewCard::new(card.card_type, card.text.trim()))
            .collect();
        let api = sync.api();
        self.tracker
            .perform(Some(Self::SCOPE), FALLBACK, async move {
                api.submit_cards(&session.game_code, &session.session_token, &cards)
                    .await?;
                api.mark_ready(&session.game_code, &session.session_token)
                    .await?;
                Ok(())
            })
            .await
    }

    /// card_creation → playing. Only the creator can begin.
    pub async fn begin_game(&mut self, sync: &SessionSynchronizer) -> ActionResult<PhaseAck> {
        let Some(session) = sync.session().filter(|_| sync.is_creator()) else {
            return ActionResult::Skipped;
        };
        let api = sync.api();
        self.tracker
            .perform(None, "Failed to begin game.", async move {
                api.begin_game(&session.game_code, &session.session_token)
                    .await
            })
            .await
    }

    /// Submitted locally, or reported ready by the server.
    pub fn has_submitted(&self, sync: &SessionSynchronizer) -> bool {
        let ready = sync.my_player().is_some_and(|me| me.is_ready);
        reconcile::reconcile(self.tracker.marker(), Self::SCOPE, ready)
    }

    /// Every participant with the player role is ready. Spectators don't count.
    pub fn all_players_ready(sync: &SessionSynchronizer) -> bool {
        sync.game_state().is_some_and(|state| {
            state
                .players
                .iter()
                .filter(|p| p.role == PlayerRole::Player)
                .all(|p| p.is_ready)
        })
    }

    pub fn is_busy(&self) -> bool {
        self.tracker.is_in_flight()
    }
}

// ── Playing ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PlayingActions {
    tracker: ActionTracker,
}

impl PlayingActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Play `card_id` into the current round.
    pub async fn play_card(
        &mut self,
        sync: &SessionSynchronizer,
        card_id: CardId,
    ) -> ActionResult<()> {
        if self.has_submitted_this_round(sync) {
            return ActionResult::Skipped;
        }
        let (Some(session), Some(round_id)) = (sync.session(), sync.current_round().map(|r| r.id))
        else {
            return ActionResult::Skipped;
        };
        let api = sync.api();
        self.tracker
            .perform(
                Some(Scope::Round(round_id)),
                "Failed to play card.",
                async move {
                    api.submit_card(&session.game_code, round_id, card_id, &session.session_token)
                        .await
                        .map(|_| ())
                },
            )
            .await
    }

    /// Played locally this round, or listed as submitted by the server.
    pub fn has_submitted_this_round(&self, sync: &SessionSynchronizer) -> bool {
        let (Some(round), Some(me)) = (sync.current_round(), sync.my_player()) else {
            return false;
        };
        self.tracker
            .reconciled(Scope::Round(round.id), reconcile::has_submitted(round, me.id))
            .is_complete()
    }

    /// Judge variant: pick the winning submission.
    pub async fn pick_winner(
        &mut self,
        sync: &SessionSynchronizer,
        submission_id: SubmissionId,
    ) -> ActionResult<PickWinnerAck> {
        if !sync.is_judge() {
            return ActionResult::Skipped;
        }
        let (Some(session), Some(round_id)) = (sync.session(), sync.current_round().map(|r| r.id))
        else {
            return ActionResult::Skipped;
        };
        let api = sync.api();
        self.tracker
            .perform(None, "Failed to pick winner.", async move {
                api.pick_winner(
                    &session.game_code,
                    round_id,
                    submission_id,
                    &session.session_token,
                )
                .await
            })
            .await
    }

    /// Move on to the next round. Only the creator can advance.
    pub async fn advance_round(&mut self, sync: &SessionSynchronizer) -> ActionResult<AdvanceAck> {
        let Some(session) = sync.session().filter(|_| sync.is_creator()) else {
            return ActionResult::Skipped;
        };
        let api = sync.api();
        self.tracker
            .perform(None, "Failed to advance round.", async move {
                api.advance_round(&session.game_code, &session.session_token)
                    .await
            })
            .await
    }

    /// Display name of the current round's winner, once picked.
    pub fn winner_name(sync: &SessionSynchronizer) -> Option<String> {
        let winner = sync.current_round()?.winner_id?;
        sync.game_state()?
            .player(winner)
            .map(|p| p.display_name.clone())
    }

    pub fn is_busy(&self) -> bool {
        self.tracker.is_in_flight()
    }
}

// ── Final round ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FinalRoundActions {
    tracker: ActionTracker,
    voted_card: Option<CardId>,
}

impl FinalRoundActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Vote for the revealed card `card_id`.
    pub async fn vote(&mut self, sync: &SessionSynchronizer, card_id: CardId) -> ActionResult<VoteAck> {
        if self.has_voted(sync) {
            return ActionResult::Skipped;
        }
        let (Some(session), Some(round_id)) = (sync.session(), sync.current_round().map(|r| r.id))
        else {
            return ActionResult::Skipped;
        };
        let api = sync.api();
        let result = self
            .tracker
            .perform(Some(Scope::Round(round_id)), "Failed to vote.", async move {
                api.vote(&session.game_code, round_id, card_id, &session.session_token)
                    .await
            })
            .await;
        if result.is_completed() {
            self.voted_card = Some(card_id);
        }
        result
    }

    /// Voted locally this round, or listed as voted by the server.
    pub fn has_voted(&self, sync: &SessionSynchronizer) -> bool {
        let (Some(round), Some(me)) = (sync.current_round(), sync.my_player()) else {
            return false;
        };
        self.tracker
            .reconciled(Scope::Round(round.id), reconcile::has_voted(round, me.id))
            .is_complete()
    }

    /// The card this client voted for, if the vote went through here.
    pub fn voted_card_id(&self) -> Option<CardId> {
        self.voted_card
    }

    pub fn is_busy(&self) -> bool {
        self.tracker.is_in_flight()
    }
}

// ── Finished ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FinishedActions {
    tracker: ActionTracker,
}

impl FinishedActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete the game, then leave it. Only the creator can finish.
    pub async fn finish_game(&mut self, sync: &mut SessionSynchronizer) -> ActionResult<DeletedAck> {
        let Some(session) = sync.session().filter(|_| sync.is_creator()) else {
            return ActionResult::Skipped;
        };
        let api = sync.api();
        let result = self
            .tracker
            .perform(None, "Failed to finish game.", async move {
                api.finish_game(&session.game_code, &session.session_token)
                    .await
            })
            .await;
        if result.is_completed() {
            Self::leave(sync).await;
        }
        result
    }

    /// Forget the game and return to the entry route.
    pub async fn leave(sync: &mut SessionSynchronizer) {
        sync.reset().await;
        sync.navigator().navigate(ENTRY_ROUTE);
    }

    /// Players (not spectators) by score, highest first.
    pub fn standings(sync: &SessionSynchronizer) -> Vec<PlayerSummary> {
        let mut players: Vec<PlayerSummary> = sync
            .game_state()
            .map(|state| {
                state
                    .players
                    .iter()
                    .filter(|p| p.role == PlayerRole::Player)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        players.sort_by_key(|p| Reverse(p.score));
        players
    }

    pub fn is_busy(&self) -> bool {
        self.tracker.is_in_flight()
    }
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

    fn full_set() -> Vec<NewCard> {
        vec![
            NewCard::new(CardType::Start, "pairing"),
            NewCard::new(CardType::Start, "demos"),
            NewCard::new(CardType::Stop, "late standups"),
            NewCard::new(CardType::Stop, "scope creep"),
            NewCard::new(CardType::Continue, "code review"),
            NewCard::new(CardType::Continue, "retros"),
        ]
    }

    #[test]
    fn display_name_is_trimmed_and_bounded() {
        assert_eq!(validate_display_name("  Ada ").unwrap(), "Ada");
        assert!(validate_display_name("   ").is_err());
        assert!(validate_display_name(&"x".repeat(50)).is_ok());
        assert!(validate_display_name(&"x".repeat(51)).is_err());
    }

    #[test]
    fn game_code_is_upper_cased_and_exactly_six() {
        assert_eq!(normalize_game_code("ab12cd").unwrap(), "AB12CD");
        assert_eq!(normalize_game_code(" ab12cd ").unwrap(), "AB12CD");
        assert!(normalize_game_code("AB12C").is_err());
        assert!(normalize_game_code("AB12CDE").is_err());
    }

    #[test]
    fn card_set_accepts_two_of_each() {
        assert!(validate_card_set(&full_set()).is_ok());
    }

    #[test]
    fn card_set_rejects_wrong_counts() {
        let mut cards = full_set();
        cards.pop();
        let err = validate_card_set(&cards).unwrap_err();
        assert_eq!(err.server_message(), Some("Expected 2 continue cards, got 1"));

        let mut cards = full_set();
        cards.push(NewCard::new(CardType::Start, "extra"));
        assert!(validate_card_set(&cards).is_err());
    }

    #[test]
    fn card_set_rejects_blank_or_long_text() {
        let mut cards = full_set();
        cards[0].text = "  ".into();
        assert!(validate_card_set(&cards).is_err());

        let mut cards = full_set();
        cards[0].text = "y".repeat(501);
        assert!(validate_card_set(&cards).is_err());

        let mut cards = full_set();
        cards[0].text = "y".repeat(500);
        assert!(validate_card_set(&cards).is_ok());
    }
}
