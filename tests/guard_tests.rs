#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

mod common;

use common::*;
use retro_party_client::routes::{entry_guard, guard_route, phase_guard, GuardOutcome};
use retro_party_client::{GamePhase, RetroClientError, Session, SessionStore};

fn redirect(to: &str) -> GuardOutcome {
    GuardOutcome::Redirect(to.to_string())
}

#[tokio::test]
async fn game_routes_without_session_go_to_entry() {
    let mut h = harness();
    assert_eq!(
        guard_route(&mut h.sync, "/game/AB12CD/lobby").await,
        redirect("/")
    );
    assert!(h.api.calls().is_empty());
}

#[tokio::test]
async fn entry_route_is_always_allowed() {
    let mut h = harness();
    assert_eq!(guard_route(&mut h.sync, "/").await, GuardOutcome::Allow);
}

#[tokio::test]
async fn unknown_paths_and_segments_go_to_entry() {
    let mut h = harness();
    let _server = h.seeded(GamePhase::Lobby);
    assert_eq!(guard_route(&mut h.sync, "/admin").await, redirect("/"));
    assert_eq!(
        guard_route(&mut h.sync, "/game/AB12CD/scoreboard").await,
        redirect("/")
    );
}

#[tokio::test]
async fn bare_game_route_goes_to_lobby() {
    let mut h = harness();
    assert_eq!(
        guard_route(&mut h.sync, "/game/AB12CD").await,
        redirect("/game/AB12CD/lobby")
    );
}

#[tokio::test]
async fn url_for_another_game_goes_to_entry() {
    let mut h = harness();
    let _server = h.seeded(GamePhase::Lobby);
    assert_eq!(
        entry_guard(&mut h.sync, Some("ZZ99ZZ")).await,
        redirect("/")
    );
    assert_eq!(
        entry_guard(&mut h.sync, Some("ab12cd")).await,
        GuardOutcome::Allow
    );
}

#[tokio::test]
async fn cold_start_rehydrates_then_checks_phase() {
    let mut h = harness_at("/game/AB12CD/lobby");
    SessionStore::new(h.storage.clone()).save(&Session::new(CODE, TOKEN, ME));
    h.api.respond(
        "reconnect",
        state_response(&game(GamePhase::Playing), &hand(), None),
    );
    let _server = h.connector.accept();

    let outcome = guard_route(&mut h.sync, "/game/AB12CD/lobby").await;

    assert_eq!(outcome, redirect("/game/AB12CD/playing"));
    assert!(h.sync.is_initialised());
    assert_eq!(h.api.call_count("reconnect"), 1);

    // Initialised: no second rehydration.
    assert_eq!(
        guard_route(&mut h.sync, "/game/AB12CD/playing").await,
        GuardOutcome::Allow
    );
    assert_eq!(h.api.call_count("reconnect"), 1);
}

#[tokio::test]
async fn failed_cold_start_goes_to_entry_and_clears_session() {
    let mut h = harness();
    SessionStore::new(h.storage.clone()).save(&Session::new(CODE, TOKEN, ME));
    h.api.fail(
        "reconnect",
        RetroClientError::Api {
            status: 401,
            message: None,
        },
    );

    assert_eq!(
        guard_route(&mut h.sync, "/game/AB12CD/playing").await,
        redirect("/")
    );
    assert_eq!(h.sync.session(), None);
}

#[tokio::test]
async fn phase_guard_prefers_url_code() {
    let mut h = harness();
    let _server = h.seeded(GamePhase::CardCreation);

    assert_eq!(
        phase_guard(GamePhase::Lobby, &h.sync, Some("ab12cd")),
        redirect("/game/ab12cd/card-creation")
    );
    assert_eq!(
        phase_guard(GamePhase::Lobby, &h.sync, None),
        redirect("/game/AB12CD/card-creation")
    );
    assert_eq!(
        phase_guard(GamePhase::CardCreation, &h.sync, None),
        GuardOutcome::Allow
    );
}

#[tokio::test]
async fn every_phase_screen_is_reachable_only_in_its_phase() {
    for current in GamePhase::ALL {
        let mut h = harness();
        let _server = h.seeded(current);
        for required in GamePhase::ALL {
            let path = format!("/game/AB12CD/{}", required.route_segment());
            let outcome = guard_route(&mut h.sync, &path).await;
            if required == current {
                assert_eq!(outcome, GuardOutcome::Allow, "{path} in {current}");
            } else {
                assert_eq!(
                    outcome,
                    redirect(&format!("/game/AB12CD/{}", current.route_segment())),
                    "{path} in {current}"
                );
            }
        }
    }
}
