//! # Retro Party Client
//!
//! Session synchronization core for the Retro Party card game.
//!
//! The crate keeps one client's view of a game consistent with the server by
//! merging three sources: snapshots from create/join responses, snapshots
//! fetched over HTTP, and pushes from a reconnecting realtime channel.
//!
//! ## Features
//!
//! - **Session persistence**: [`SessionStore`] over any tab-scoped [`SessionStorage`]
//! - **Reconnecting realtime channel**: [`RealtimeChannel`] with subscriptions that survive reconnects
//! - **Single owner of state**: [`SessionSynchronizer`] applies pushes idempotently and follows phase changes
//! - **Phase-gated routing**: [`routes::guard_route`] keeps the location on the current phase's screen
//! - **Optimistic actions**: [`reconcile::ActionTracker`] and the per-screen controllers in [`actions`]
//! - **Transport-agnostic**: implement [`Transport`]/[`Connector`] and [`GameApi`] for any backend;
//!   the default features ship a WebSocket transport and a `reqwest` HTTP client
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use retro_party_client::{ClientConfig, MemoryStorage, SessionSynchronizer};
//!
//! let config = ClientConfig::from_env();
//! let mut sync = SessionSynchronizer::from_config(&config, MemoryStorage::new(), navigator)?;
//!
//! if sync.init_from_session().await {
//!     while let Some(outcome) = sync.next_update().await {
//!         println!("{outcome:?} -> {:?}", sync.current_phase());
//!     }
//! }
//! ```

pub mod actions;
pub mod api;
pub mod config;
pub mod error;
#[cfg(feature = "http-reqwest")]
pub mod http;
pub mod protocol;
pub mod realtime;
pub mod reconcile;
pub mod routes;
pub mod session;
pub mod synchronizer;
pub mod transport;
#[cfg(feature = "transport-websocket")]
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use api::GameApi;
pub use config::ClientConfig;
pub use error::RetroClientError;
#[cfg(feature = "http-reqwest")]
pub use http::HttpGameApi;
pub use protocol::{ClientMessage, GamePhase, GameState, ServerEvent};
pub use realtime::{EventStream, RealtimeChannel, RealtimeConfig};
pub use reconcile::{ActionResult, Notice};
pub use routes::{GuardOutcome, Navigator};
pub use session::{MemoryStorage, Session, SessionStorage, SessionStore};
pub use synchronizer::{EventOutcome, SessionSynchronizer};
pub use transport::{Connector, Transport};
#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
