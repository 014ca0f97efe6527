//! Realtime links over WebSocket, via `tokio-tungstenite`.
//!
//! [`WebSocketConnector`] is what the synchronizer is normally built with: it
//! holds the realtime endpoint and dials a new [`WebSocketTransport`] each
//! time the channel (re)connects. `ws://` and `wss://` both work.
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), retro_party_client::RetroClientError> {
//! use std::time::Duration;
//! use retro_party_client::{Connector, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new("ws://localhost:5000/ws")
//!     .with_connect_timeout(Duration::from_secs(5));
//! let mut link = connector.connect().await?;
//! link.send(r#"{"type":"join_game_room","data":{"game_code":"AB12CD","session_token":"t"}}"#.into())
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, protocol::Message};
use tracing::{debug, warn};

use crate::error::RetroClientError;
use crate::transport::{Connector, Transport};

/// The stream type produced by `connect_async`.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// What one inbound WebSocket message means for the channel.
enum Inbound {
    Frame(String),
    Ignore,
    Ended,
}

fn classify(message: Message) -> Inbound {
    match message {
        Message::Text(text) => Inbound::Frame(text.to_string()),
        Message::Close(frame) => {
            debug!(?frame, "server closed the realtime socket");
            Inbound::Ended
        }
        // tungstenite answers pings on its own.
        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Inbound::Ignore,
        Message::Binary(bytes) => {
            warn!(len = bytes.len(), "binary frame on a text protocol, ignoring");
            Inbound::Ignore
        }
    }
}

/// Keep the I/O error kind when there is one, so callers can tell refused
/// from unreachable.
fn handshake_error(err: tungstenite::Error) -> RetroClientError {
    let kind = match &err {
        tungstenite::Error::Io(io) => io.kind(),
        _ => std::io::ErrorKind::Other,
    };
    RetroClientError::Io(std::io::Error::new(kind, err))
}

/// One open WebSocket to the realtime endpoint.
///
/// `recv` only awaits `StreamExt::next`, which is cancel-safe.
#[derive(Debug)]
pub struct WebSocketTransport {
    socket: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Dial `url` and complete the WebSocket handshake.
    ///
    /// # Errors
    ///
    /// [`RetroClientError::Io`] for a bad URL, a refused connection or a
    /// failed handshake.
    pub async fn connect(url: &str) -> Result<Self, RetroClientError> {
        debug!(url, "dialing realtime endpoint");
        let (socket, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(handshake_error)?;
        debug!(url, "realtime socket open");
        Ok(Self::from_stream(socket))
    }

    /// Adopt a socket that is already open.
    pub fn from_stream(socket: WsStream) -> Self {
        Self {
            socket,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: String) -> Result<(), RetroClientError> {
        if self.closed {
            return Err(RetroClientError::TransportClosed);
        }
        self.socket
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| RetroClientError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, RetroClientError>> {
        while let Some(next) = self.socket.next().await {
            let message = match next {
                Ok(message) => message,
                Err(e) => return Some(Err(RetroClientError::TransportReceive(e.to_string()))),
            };
            match classify(message) {
                Inbound::Frame(text) => return Some(Ok(text)),
                Inbound::Ended => return None,
                Inbound::Ignore => {}
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), RetroClientError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        self.socket
            .close(None)
            .await
            .map_err(|e| RetroClientError::TransportSend(e.to_string()))
    }
}

/// Dials the same realtime URL on every (re)connect.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: None,
        }
    }

    /// Give up on an attempt after `timeout`; the channel then backs off and
    /// retries.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, RetroClientError> {
        let dial = WebSocketTransport::connect(&self.url);
        let transport = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, dial)
                .await
                .map_err(|_| RetroClientError::Timeout)??,
            None => dial.await?,
        };
        Ok(Box::new(transport))
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
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::WebSocketStream;

    /// Accept one socket on a random port and hand it to `server`.
    async fn serve_once<F, Fut>(server: F) -> String
    where
        F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            server(tokio_tungstenite::accept_async(tcp).await.unwrap()).await;
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn malformed_url_is_an_io_error() {
        let err = WebSocketTransport::connect("AB12CD").await.unwrap_err();
        assert!(matches!(err, RetroClientError::Io(_)));
    }

    #[tokio::test]
    async fn refused_connection_keeps_io_kind() {
        let err = WebSocketConnector::new("ws://127.0.0.1:1")
            .connect()
            .await
            .err()
            .unwrap();
        let RetroClientError::Io(io) = err else {
            panic!("expected an I/O error, got {err:?}");
        };
        assert_eq!(io.kind(), std::io::ErrorKind::ConnectionRefused);
    }

    #[tokio::test]
    async fn stalled_handshake_times_out() {
        // Accepts TCP but never answers the upgrade request.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let (_tcp, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let err = WebSocketConnector::new(format!("ws://{addr}"))
            .with_connect_timeout(Duration::from_millis(50))
            .connect()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RetroClientError::Timeout));
    }

    #[tokio::test]
    async fn join_frame_reaches_server_and_push_comes_back() {
        let url = serve_once(|mut ws| async move {
            let Some(Ok(Message::Text(join))) = ws.next().await else {
                return;
            };
            assert!(join.contains("join_game_room"));
            ws.send(Message::Ping(vec![1].into())).await.unwrap();
            ws.send(Message::Binary(vec![0xFF].into())).await.unwrap();
            ws.send(Message::Text(
                r#"{"type":"player_connection_changed","player_id":2,"is_connected":true}"#.into(),
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut link = WebSocketConnector::new(url).connect().await.unwrap();
        link.send(r#"{"type":"join_game_room"}"#.to_string())
            .await
            .unwrap();
        let push = link.recv().await.unwrap().unwrap();
        assert!(push.contains("player_connection_changed"));
        assert!(link.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_sends() {
        let url = serve_once(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut link = WebSocketTransport::connect(&url).await.unwrap();
        link.close().await.unwrap();
        link.close().await.unwrap();
        assert!(matches!(
            link.send("leave".into()).await,
            Err(RetroClientError::TransportClosed)
        ));
    }
}
