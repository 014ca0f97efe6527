#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]

mod common;

use std::time::Duration;

use common::*;
use retro_party_client::protocol::{GameFinished, PlayerConnectionChanged};
use retro_party_client::{GamePhase, RealtimeChannel, ServerEvent};

fn connection_changed(player_id: i64, is_connected: bool) -> ServerEvent {
    ServerEvent::PlayerConnectionChanged(PlayerConnectionChanged {
        player_id,
        is_connected,
    })
}

#[tokio::test]
async fn connect_joins_room_once_transport_is_up() {
    init_tracing();
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut channel = RealtimeChannel::new(connector.clone(), fast_config());

    channel.connect(CODE, TOKEN);

    eventually("room join", || server.received() == vec![join(CODE, TOKEN)]).await;
    eventually("connected flag", || channel.is_connected()).await;
    assert!(channel.is_running());
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn second_connect_only_rejoins() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut channel = RealtimeChannel::new(connector.clone(), fast_config());

    channel.connect(CODE, TOKEN);
    eventually("first join", || server.received().len() == 1).await;

    channel.connect(CODE, TOKEN);
    eventually("second join", || server.received().len() == 2).await;

    assert_eq!(server.received(), vec![join(CODE, TOKEN), join(CODE, TOKEN)]);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn joining_another_game_leaves_the_previous_room_first() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut channel = RealtimeChannel::new(connector.clone(), fast_config());

    channel.connect(CODE, TOKEN);
    eventually("first join", || server.received().len() == 1).await;

    channel.connect("ZZ99ZZ", "t9");
    eventually("switch", || server.received().len() == 3).await;

    assert_eq!(
        server.received(),
        vec![join(CODE, TOKEN), leave(CODE, TOKEN), join("ZZ99ZZ", "t9")]
    );
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn credentials_given_while_connecting_are_used_for_the_join() {
    let connector = MockConnector::new();
    let mut channel = RealtimeChannel::new(connector.clone(), fast_config());

    channel.connect(CODE, "old");
    eventually("connect attempt", || connector.attempts() == 1).await;
    channel.connect(CODE, TOKEN);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let server = connector.accept();
    eventually("join", || !server.received().is_empty()).await;
    assert_eq!(server.received(), vec![join(CODE, TOKEN)]);
    assert_eq!(connector.attempts(), 1);
}

#[tokio::test]
async fn subscribers_survive_reconnect_and_room_is_rejoined() {
    let connector = MockConnector::new();
    let first = connector.accept();
    let mut channel = RealtimeChannel::new(connector.clone(), fast_config());
    let mut changes = channel.on_player_connection_changed();

    channel.connect(CODE, TOKEN);
    eventually("first join", || !first.received().is_empty()).await;

    first.push(&connection_changed(2, false));
    let change = changes.recv().await.unwrap();
    assert!(!change.is_connected);

    let second = connector.accept();
    first.hang_up();
    eventually("rejoin after reconnect", || {
        second.received() == vec![join(CODE, TOKEN)]
    })
    .await;

    second.push(&connection_changed(2, true));
    let change = tokio::time::timeout(Duration::from_secs(2), changes.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(change.is_connected);
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test]
async fn receive_error_triggers_reconnect() {
    let connector = MockConnector::new();
    let first = connector.accept();
    let mut channel = RealtimeChannel::new(connector.clone(), fast_config());
    channel.connect(CODE, TOKEN);
    eventually("first join", || !first.received().is_empty()).await;

    let second = connector.accept();
    first.fail();
    eventually("rejoin", || !second.received().is_empty()).await;
    assert!(channel.is_running());
}

#[tokio::test]
async fn refused_connections_are_retried_with_backoff() {
    let connector = MockConnector::new();
    connector.refuse();
    connector.refuse();
    let server = connector.accept();
    let mut channel = RealtimeChannel::new(connector.clone(), fast_config());

    channel.connect(CODE, TOKEN);

    eventually("join after retries", || !server.received().is_empty()).await;
    assert_eq!(connector.attempts(), 3);
}

#[tokio::test]
async fn disconnect_leaves_room_then_closes() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut channel = RealtimeChannel::new(connector.clone(), fast_config());
    let mut events = channel.subscribe();

    channel.connect(CODE, TOKEN);
    eventually("join", || !server.received().is_empty()).await;

    channel.disconnect(CODE, TOKEN).await;

    assert_eq!(server.received(), vec![join(CODE, TOKEN), leave(CODE, TOKEN)]);
    assert!(server.is_closed());
    assert!(!channel.is_running());
    assert!(!channel.is_connected());

    server.push(&connection_changed(2, false));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn disconnect_without_connect_is_a_no_op() {
    let connector = MockConnector::new();
    let mut channel = RealtimeChannel::new(connector.clone(), fast_config());
    channel.disconnect(CODE, TOKEN).await;
    assert!(!channel.is_running());
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test]
async fn connect_after_disconnect_opens_a_new_link() {
    let connector = MockConnector::new();
    let first = connector.accept();
    let mut channel = RealtimeChannel::new(connector.clone(), fast_config());
    channel.connect(CODE, TOKEN);
    eventually("first join", || !first.received().is_empty()).await;
    channel.disconnect(CODE, TOKEN).await;

    let second = connector.accept();
    channel.connect(CODE, TOKEN);
    eventually("second join", || !second.received().is_empty()).await;
    assert_eq!(connector.attempts(), 2);
}

#[tokio::test]
async fn dropping_one_subscriber_leaves_others_and_the_channel_alone() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut channel = RealtimeChannel::new(connector.clone(), fast_config());
    let dropped = channel.on_game_finished();
    let mut kept = channel.on_game_finished();

    channel.connect(CODE, TOKEN);
    eventually("join", || !server.received().is_empty()).await;
    drop(dropped);

    server.push(&ServerEvent::GameFinished(GameFinished {
        final_scores: vec![],
    }));
    assert_eq!(kept.recv().await, Some(vec![]));
    assert!(channel.is_connected());
}

#[tokio::test]
async fn undecodable_frames_are_skipped() {
    let connector = MockConnector::new();
    let server = connector.accept();
    let mut channel = RealtimeChannel::new(connector.clone(), fast_config());
    let mut updates = channel.on_game_state_updated();

    channel.connect(CODE, TOKEN);
    eventually("join", || !server.received().is_empty()).await;

    server.push_raw("{\"type\":\"mystery\"}");
    server.push_raw("not json at all");
    server.push(&updated(game(GamePhase::Playing), Some(3)));

    let update = updates.recv().await.unwrap();
    assert_eq!(update.game.phase, GamePhase::Playing);
    assert_eq!(update.version, Some(3));
    assert!(channel.is_connected());
}
