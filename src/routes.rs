//! Phase-gated navigation.
//!
//! Each game phase owns one screen under `/game/{code}/{segment}`. The guards
//! here never drive a phase transition themselves; they only correct the
//! divergence between the location and the authoritative phase:
//!
//! - [`entry_guard`] requires a session for the room in the URL and performs
//!   the cold-start rehydration.
//! - [`phase_guard`] redirects a screen that does not match the current phase.
//! - [`guard_route`] composes both for a full path.

use crate::protocol::GamePhase;
use crate::synchronizer::SessionSynchronizer;

/// Where users land without a session.
pub const ENTRY_ROUTE: &str = "/";

/// The location/router surface the synchronizer navigates through.
pub trait Navigator: Send + Sync {
    /// The current location, e.g. `/game/AB12CD/lobby`.
    fn current_url(&self) -> String;

    /// Move to `url`.
    fn navigate(&self, url: &str);
}

impl GamePhase {
    /// The route segment of the screen that shows this phase.
    pub fn route_segment(self) -> &'static str {
        match self {
            GamePhase::Lobby => "lobby",
            GamePhase::CardCreation => "card-creation",
            GamePhase::Playing => "playing",
            GamePhase::FinalRound => "final-round",
            GamePhase::Finished => "finished",
        }
    }

    /// Inverse of [`route_segment`](GamePhase::route_segment).
    pub fn from_route_segment(segment: &str) -> Option<GamePhase> {
        GamePhase::ALL
            .into_iter()
            .find(|phase| phase.route_segment() == segment)
    }
}

/// `/game/{code}/{segment}` for `phase`.
pub fn game_url(code: &str, phase: GamePhase) -> String {
    format!("/game/{code}/{}", phase.route_segment())
}

/// Result of running a guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Allow,
    Redirect(String),
}

impl GuardOutcome {
    fn to_entry() -> Self {
        GuardOutcome::Redirect(ENTRY_ROUTE.to_string())
    }
}

/// A parsed application path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The landing screen.
    Entry,
    /// `/game/{code}` or `/game/{code}/{segment}`.
    Game {
        code: String,
        segment: Option<String>,
    },
    Unknown,
}

impl Route {
    /// Parse a path, ignoring any query string or fragment.
    pub fn parse(path: &str) -> Route {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        match parts.as_slice() {
            [] => Route::Entry,
            ["game", code] => Route::Game {
                code: (*code).to_string(),
                segment: None,
            },
            ["game", code, segment] => Route::Game {
                code: (*code).to_string(),
                segment: Some((*segment).to_string()),
            },
            _ => Route::Unknown,
        }
    }
}

/// Phase check as a pure function.
///
/// With no phase or no code yet the screen is allowed through and must cope
/// with missing data itself.
pub fn check_phase(
    required: GamePhase,
    current: Option<GamePhase>,
    code: Option<&str>,
) -> GuardOutcome {
    match (current, code) {
        (Some(current), Some(code)) if current != required => {
            GuardOutcome::Redirect(game_url(code, current))
        }
        _ => GuardOutcome::Allow,
    }
}

/// Guard for a screen that shows `required`.
///
/// Redirect targets use the URL's code when present, else the held one.
pub fn phase_guard(
    required: GamePhase,
    sync: &SessionSynchronizer,
    url_code: Option<&str>,
) -> GuardOutcome {
    let code = url_code.or_else(|| sync.game_code());
    check_phase(required, sync.current_phase(), code)
}

/// Guard for every `/game/{code}/…` route.
///
/// Redirects to the entry route when there is no session, when the URL names
/// a different game than the session, or when cold-start rehydration fails.
/// This is the only place rehydration is triggered.
pub async fn entry_guard(sync: &mut SessionSynchronizer, url_code: Option<&str>) -> GuardOutcome {
    let Some(session) = sync.session() else {
        tracing::debug!("no session, redirecting to entry");
        return GuardOutcome::to_entry();
    };

    if let Some(code) = url_code {
        if !session.matches_code(code) {
            tracing::debug!(
                url_code = code,
                session_code = %session.game_code,
                "URL names another game, redirecting to entry"
            );
            return GuardOutcome::to_entry();
        }
    }

    if !sync.is_initialised() && !sync.init_from_session().await {
        return GuardOutcome::to_entry();
    }

    GuardOutcome::Allow
}

/// Run every guard that applies to `path`.
pub async fn guard_route(sync: &mut SessionSynchronizer, path: &str) -> GuardOutcome {
    match Route::parse(path) {
        Route::Entry => GuardOutcome::Allow,
        Route::Unknown => GuardOutcome::to_entry(),
        Route::Game { code, segment: None } => {
            GuardOutcome::Redirect(game_url(&code, GamePhase::Lobby))
        }
        Route::Game {
            code,
            segment: Some(segment),
        } => {
            let Some(required) = GamePhase::from_route_segment(&segment) else {
                return GuardOutcome::to_entry();
            };
            match entry_guard(sync, Some(&code)).await {
                GuardOutcome::Allow => phase_guard(required, sync, Some(&code)),
                redirect => redirect,
            }
        }
    }
}
