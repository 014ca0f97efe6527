//! Request/response channel to the game server.
//!
//! [`GameApi`] is the seam between the synchronizer and whatever carries the
//! game's HTTP calls. The crate ships [`HttpGameApi`](crate::http::HttpGameApi)
//! behind the `http-reqwest` feature; tests and embedders can supply their own.
//!
//! Every call except create/join is authenticated by the session token. All
//! side effects are reflected back to every client through realtime pushes;
//! the small acknowledgement payloads are informative only.

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{
    AdvanceAck, CardId, CreateGameResponse, DeletedAck, GameStateResponse, JoinGameResponse,
    NewCard, PhaseAck, PickWinnerAck, PlayerRole, ReadyAck, RoundId, SubmissionId, SubmittedAck,
    VoteAck,
};

/// The game server's request/response operations.
#[async_trait]
pub trait GameApi: Send + Sync {
    /// Create a game; the caller becomes its creator.
    async fn create_game(&self, display_name: &str, role: PlayerRole)
        -> Result<CreateGameResponse>;

    /// Join an existing game by code.
    async fn join_game(&self, code: &str, display_name: &str) -> Result<JoinGameResponse>;

    /// Current state and the caller's hand.
    async fn get_game_state(&self, code: &str, token: &str) -> Result<GameStateResponse>;

    /// Like [`get_game_state`](GameApi::get_game_state), additionally
    /// re-establishing room membership on the server.
    async fn reconnect(&self, code: &str, token: &str) -> Result<GameStateResponse>;

    /// lobby → card_creation. Creator only.
    async fn start_game(&self, code: &str, token: &str) -> Result<PhaseAck>;

    /// Submit the full card set authored during card creation.
    async fn submit_cards(&self, code: &str, token: &str, cards: &[NewCard])
        -> Result<SubmittedAck>;

    async fn mark_ready(&self, code: &str, token: &str) -> Result<ReadyAck>;

    /// card_creation → playing. Creator only.
    async fn begin_game(&self, code: &str, token: &str) -> Result<PhaseAck>;

    /// Play one card from the hand into the current round.
    async fn submit_card(
        &self,
        code: &str,
        round_id: RoundId,
        card_id: CardId,
        token: &str,
    ) -> Result<SubmittedAck>;

    /// Judge variant: pick the winning submission.
    async fn pick_winner(
        &self,
        code: &str,
        round_id: RoundId,
        submission_id: SubmissionId,
        token: &str,
    ) -> Result<PickWinnerAck>;

    /// Voting variant: vote for a revealed card.
    async fn vote(
        &self,
        code: &str,
        round_id: RoundId,
        card_id: CardId,
        token: &str,
    ) -> Result<VoteAck>;

    /// Move on to the next round. Creator only.
    async fn advance_round(&self, code: &str, token: &str) -> Result<AdvanceAck>;

    /// Finish and delete the game. Creator only.
    async fn finish_game(&self, code: &str, token: &str) -> Result<DeletedAck>;
}
