//! Seams between the realtime channel and the wire.
//!
//! A [`Transport`] is one open link carrying JSON text frames in both
//! directions. It is disposable: when it fails, the
//! [`RealtimeChannel`](crate::realtime::RealtimeChannel) throws it away and
//! asks its [`Connector`] for a new one, then re-joins the room on it.
//! Subscribers never see the swap.
//!
//! # Plugging in another wire
//!
//! An in-process link over tokio channels, handy for driving the client from
//! a scripted server:
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use retro_party_client::error::RetroClientError;
//! use retro_party_client::transport::{Connector, Transport};
//! use tokio::sync::mpsc;
//!
//! struct ChannelLink {
//!     outbound: mpsc::UnboundedSender<String>,
//!     inbound: mpsc::UnboundedReceiver<String>,
//! }
//!
//! #[async_trait]
//! impl Transport for ChannelLink {
//!     async fn send(&mut self, frame: String) -> Result<(), RetroClientError> {
//!         self.outbound
//!             .send(frame)
//!             .map_err(|_| RetroClientError::TransportClosed)
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, RetroClientError>> {
//!         self.inbound.recv().await.map(Ok)
//!     }
//!
//!     async fn close(&mut self) -> Result<(), RetroClientError> {
//!         self.inbound.close();
//!         Ok(())
//!     }
//! }
//!
//! struct RefusingConnector;
//!
//! #[async_trait]
//! impl Connector for RefusingConnector {
//!     async fn connect(&self) -> Result<Box<dyn Transport>, RetroClientError> {
//!         Err(RetroClientError::NotConnected)
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::RetroClientError;

/// One open realtime link. Frames are whole JSON documents.
///
/// # Cancel Safety
///
/// The channel loop races [`recv`](Transport::recv) against commands and
/// shutdown in `tokio::select!`, so a `recv` dropped before completion must
/// not swallow a frame.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Write one frame.
    ///
    /// # Errors
    ///
    /// [`RetroClientError::TransportSend`] or
    /// [`RetroClientError::TransportClosed`]; the channel treats either as a
    /// lost link.
    async fn send(&mut self, frame: String) -> Result<(), RetroClientError>;

    /// Read the next frame.
    ///
    /// `None` means the peer ended the link; `Some(Err(_))` means it broke.
    /// Both make the channel reconnect.
    async fn recv(&mut self) -> Option<Result<String, RetroClientError>>;

    /// End the link. Called once after the farewell frame, if any.
    ///
    /// # Errors
    ///
    /// Failures are logged and ignored; resources must be released anyway.
    async fn close(&mut self) -> Result<(), RetroClientError>;
}

/// Factory for [`Transport`]s, invoked on first connect and after every loss.
///
/// Endpoint, headers and TLS settings live in the implementor.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Dial a fresh link.
    ///
    /// # Errors
    ///
    /// Any error is logged and retried after the backoff delay.
    async fn connect(&self) -> Result<Box<dyn Transport>, RetroClientError>;
}
