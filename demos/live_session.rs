//! # Live Session Example
//!
//! Demonstrates a complete Retro Party client lifecycle against a real server:
//!
//! 1. Read [`ClientConfig`] from `RETRO_*` environment variables
//! 2. Create a game, or join one when `RETRO_JOIN_CODE` is set
//! 3. Follow realtime pushes and phase-driven navigation
//! 4. Leave the room on Ctrl+C or when the game finishes
//!
//! ## Running
//!
//! ```sh
//! # Start the game server on localhost:5000, then:
//! cargo run --example live_session
//!
//! # Join an existing game under another name:
//! RETRO_JOIN_CODE=AB12CD RETRO_NAME=Bo cargo run --example live_session
//! ```

use std::sync::{Arc, Mutex};

use retro_party_client::actions::{FinishedActions, LandingActions};
use retro_party_client::protocol::PlayerRole;
use retro_party_client::{
    ActionResult, ClientConfig, EventOutcome, MemoryStorage, Navigator, SessionSynchronizer,
};

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

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let config = ClientConfig::from_env();
    tracing::info!(api = %config.api_base_url, realtime = %config.realtime_url, "configured");

    let mut sync = SessionSynchronizer::from_config(
        &config,
        MemoryStorage::new(),
        Arc::new(LogNavigator::default()),
    )?;

    // ── Create or join ──────────────────────────────────────────────
    let name = std::env::var("RETRO_NAME").unwrap_or_else(|_| "RustPlayer".to_string());
    let mut landing = LandingActions::new();
    let result = match std::env::var("RETRO_JOIN_CODE") {
        Ok(code) => landing.join_game(&mut sync, &code, &name).await,
        Err(_) => {
            landing
                .create_game(&mut sync, &name, PlayerRole::Player)
                .await
        }
    };
    match result {
        ActionResult::Completed(()) => {
            tracing::info!(code = ?sync.game_code(), "in game");
        }
        other => {
            let message = other
                .notice()
                .map_or("nothing to do", |n| n.message.as_str());
            return Err(message.to_string().into());
        }
    }

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            outcome = sync.next_update() => {
                let Some(outcome) = outcome else {
                    tracing::info!("realtime channel closed, exiting");
                    break;
                };
                match outcome {
                    EventOutcome::Finished(scores) => {
                        for score in &scores {
                            tracing::info!("{}: {}", score.display_name, score.score);
                        }
                        break;
                    }
                    other => {
                        tracing::info!(
                            phase = ?sync.current_phase(),
                            connected = sync.channel().is_connected(),
                            "{other:?}"
                        );
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, leaving");
                break;
            }
        }
    }

    FinishedActions::leave(&mut sync).await;
    tracing::info!("left the game");
    Ok(())
}
