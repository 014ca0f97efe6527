//! Optimistic action bookkeeping.
//!
//! A screen that issues an action (play a card, vote, pick a winner, …)
//! records an optimistic marker once the request succeeds, scoped to the
//! round or phase it belongs to. Whether the action is done is then the
//! logical OR of that marker and the server's own status arrays, so neither a
//! push that overtakes the response nor a reload that loses the marker can
//! make a finished action look unfinished.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, RetroClientError};
use crate::protocol::{CurrentRound, GamePhase, PlayerId, RoundId};

/// How long a failure notice stays on screen.
pub const NOTICE_DURATION: Duration = Duration::from_secs(4);

/// What an optimistic marker belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Round(RoundId),
    Phase(GamePhase),
}

/// `true` if the marker is set for `scope` or the server already reports the
/// action as done.
pub fn reconcile(marker: Option<Scope>, scope: Scope, server_truth: bool) -> bool {
    marker == Some(scope) || server_truth
}

/// Both sources of truth for one action, for screens that show them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub local_intent: bool,
    pub server_truth: bool,
}

impl Reconciled {
    pub fn is_complete(&self) -> bool {
        self.local_intent || self.server_truth
    }
}

/// Whether `player` has a submission in `round` according to the server.
pub fn has_submitted(round: &CurrentRound, player: PlayerId) -> bool {
    round
        .submission_status
        .iter()
        .any(|s| s.player_id == player && s.has_submitted)
}

/// Whether `player` has voted in `round` according to the server.
pub fn has_voted(round: &CurrentRound, player: PlayerId) -> bool {
    round
        .vote_status
        .iter()
        .any(|v| v.player_id == player && v.has_voted)
}

/// A transient, dismissible failure message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub duration: Duration,
}

impl Notice {
    /// The server's message when it sent one, else `fallback`.
    pub fn from_error(err: &RetroClientError, fallback: &str) -> Self {
        let message = err
            .server_message()
            .map_or_else(|| fallback.to_string(), str::to_string);
        Self {
            message,
            duration: NOTICE_DURATION,
        }
    }
}

/// Outcome of one user-initiated action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult<T> {
    Completed(T),
    /// Another request from the same screen is still outstanding.
    Busy,
    /// Nothing to do: no session, no round, or already done.
    Skipped,
    Failed(Notice),
}

impl<T> ActionResult<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, ActionResult::Completed(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ActionResult<U> {
        match self {
            ActionResult::Completed(value) => ActionResult::Completed(f(value)),
            ActionResult::Busy => ActionResult::Busy,
            ActionResult::Skipped => ActionResult::Skipped,
            ActionResult::Failed(notice) => ActionResult::Failed(notice),
        }
    }

    /// The notice to show, if the action failed.
    pub fn notice(&self) -> Option<&Notice> {
        match self {
            ActionResult::Failed(notice) => Some(notice),
            _ => None,
        }
    }
}

/// Proof that a request slot was taken; hand it back to
/// [`ActionTracker::complete`] or [`ActionTracker::abandon`].
#[derive(Debug)]
#[must_use = "an unreturned ticket keeps the tracker busy"]
pub struct ActionTicket {
    _private: (),
}

struct InFlightGuard<'a>(&'a mut bool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

/// Optimistic marker plus in-flight flag for one screen.
#[derive(Debug, Default)]
pub struct ActionTracker {
    in_flight: bool,
    marker: Option<Scope>,
}

impl ActionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn marker(&self) -> Option<Scope> {
        self.marker
    }

    /// Marker OR server truth for `scope`.
    pub fn reconciled(&self, scope: Scope, server_truth: bool) -> Reconciled {
        Reconciled {
            local_intent: self.marker == Some(scope),
            server_truth,
        }
    }

    /// Take the request slot. `None` while another request is outstanding.
    pub fn try_begin(&mut self) -> Option<ActionTicket> {
        if self.in_flight {
            debug!("action already in flight");
            return None;
        }
        self.in_flight = true;
        Some(ActionTicket { _private: () })
    }

    /// Release the slot and turn `result` into an [`ActionResult`].
    ///
    /// The marker is set to `scope` only when the request succeeded; a
    /// failure leaves it untouched so the user can retry.
    pub fn complete<T>(
        &mut self,
        ticket: ActionTicket,
        scope: Option<Scope>,
        result: Result<T>,
        fallback: &str,
    ) -> ActionResult<T> {
        let ActionTicket { .. } = ticket;
        self.in_flight = false;
        match result {
            Ok(value) => {
                if scope.is_some() {
                    self.marker = scope;
                }
                ActionResult::Completed(value)
            }
            Err(e) => {
                debug!("action failed: {e}");
                ActionResult::Failed(Notice::from_error(&e, fallback))
            }
        }
    }

    /// Release the slot without an outcome.
    pub fn abandon(&mut self, ticket: ActionTicket) {
        let ActionTicket { .. } = ticket;
        self.in_flight = false;
    }

    /// Run `request` under the in-flight guard.
    pub async fn perform<T, F>(
        &mut self,
        scope: Option<Scope>,
        fallback: &str,
        request: F,
    ) -> ActionResult<T>
    where
        F: Future<Output = Result<T>>,
    {
        let Some(ticket) = self.try_begin() else {
            return ActionResult::Busy;
        };
        // Releases the slot if this future is dropped mid-request.
        let guard = InFlightGuard(&mut self.in_flight);
        let result = request.await;
        drop(guard);
        self.complete(ticket, scope, result, fallback)
    }

    /// Forget the marker, e.g. when a screen is left.
    pub fn clear(&mut self) {
        self.marker = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::protocol::{RoundPhase, SubmissionStatus, VoteStatus};

    fn round(submitted: bool, voted: bool) -> CurrentRound {
        CurrentRound {
            id: 7,
            round_number: 1,
            judge_id: None,
            adjective: "bold".into(),
            phase: RoundPhase::Submitting,
            is_final_round: false,
            submission_status: vec![SubmissionStatus {
                player_id: 2,
                display_name: "Bo".into(),
                has_submitted: submitted,
            }],
            vote_status: vec![VoteStatus {
                player_id: 2,
                display_name: "Bo".into(),
                has_voted: voted,
            }],
            revealed_submissions: None,
            winner_id: None,
            winning_card_id: None,
            winner_ids: vec![],
            winning_card_ids: vec![],
        }
    }

    #[test]
    fn reconcile_is_or_of_scoped_marker_and_server() {
        let scope = Scope::Round(7);
        assert!(!reconcile(None, scope, false));
        assert!(reconcile(Some(scope), scope, false));
        assert!(reconcile(None, scope, true));
        assert!(!reconcile(Some(Scope::Round(6)), scope, false));
        assert!(reconcile(Some(Scope::Round(6)), scope, true));
    }

    #[test]
    fn server_status_helpers_match_player() {
        assert!(has_submitted(&round(true, false), 2));
        assert!(!has_submitted(&round(true, false), 3));
        assert!(!has_submitted(&round(false, false), 2));
        assert!(has_voted(&round(false, true), 2));
        assert!(!has_voted(&round(false, false), 2));
    }

    #[test]
    fn second_begin_is_rejected_while_in_flight() {
        let mut tracker = ActionTracker::new();
        let ticket = tracker.try_begin().unwrap();
        assert!(tracker.try_begin().is_none());
        tracker.abandon(ticket);
        assert!(tracker.try_begin().is_some());
    }

    #[test]
    fn success_sets_marker_and_failure_does_not() {
        let mut tracker = ActionTracker::new();
        let ticket = tracker.try_begin().unwrap();
        let result = tracker.complete(
            ticket,
            Some(Scope::Round(1)),
            Err::<(), _>(RetroClientError::Timeout),
            "Failed to play card.",
        );
        assert_eq!(
            result.notice().map(|n| n.message.as_str()),
            Some("Failed to play card.")
        );
        assert_eq!(tracker.marker(), None);
        assert!(!tracker.is_in_flight());

        let ticket = tracker.try_begin().unwrap();
        let result = tracker.complete(ticket, Some(Scope::Round(1)), Ok(5), "unused");
        assert_eq!(result, ActionResult::Completed(5));
        assert_eq!(tracker.marker(), Some(Scope::Round(1)));
        assert!(tracker.reconciled(Scope::Round(1), false).is_complete());
        assert!(!tracker.reconciled(Scope::Round(2), false).is_complete());
    }

    #[test]
    fn notice_prefers_server_message() {
        let err = RetroClientError::Api {
            status: 409,
            message: Some("Round already complete".into()),
        };
        let notice = Notice::from_error(&err, "Failed to vote.");
        assert_eq!(notice.message, "Round already complete");
        assert_eq!(notice.duration, Duration::from_secs(4));

        let err = RetroClientError::Api {
            status: 500,
            message: None,
        };
        assert_eq!(Notice::from_error(&err, "Failed to vote.").message, "Failed to vote.");
    }

    #[tokio::test]
    async fn perform_runs_request_and_releases_slot() {
        let mut tracker = ActionTracker::new();
        let result = tracker
            .perform(Some(Scope::Phase(GamePhase::CardCreation)), "x", async {
                Ok::<_, RetroClientError>("done")
            })
            .await;
        assert_eq!(result, ActionResult::Completed("done"));
        assert!(!tracker.is_in_flight());
        assert_eq!(tracker.marker(), Some(Scope::Phase(GamePhase::CardCreation)));
    }

    #[tokio::test]
    async fn perform_reports_busy_while_ticket_is_out() {
        let mut tracker = ActionTracker::new();
        let ticket = tracker.try_begin().unwrap();
        let result = tracker
            .perform(None, "x", async { Ok::<_, RetroClientError>(()) })
            .await;
        assert_eq!(result, ActionResult::Busy);
        tracker.abandon(ticket);
    }

    #[test]
    fn dropping_a_pending_perform_releases_slot() {
        let mut tracker = ActionTracker::new();
        {
            let mut pending = tokio_test::task::spawn(tracker.perform(
                Some(Scope::Round(1)),
                "x",
                std::future::pending::<Result<()>>(),
            ));
            tokio_test::assert_pending!(pending.poll());
        }
        assert!(!tracker.is_in_flight());
        assert_eq!(tracker.marker(), None);
    }
}
