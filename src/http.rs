//! [`GameApi`] over HTTP using `reqwest`.
//!
//! The session token travels in the `X-Session-Token` header. Every request is
//! bounded by the configured timeout; an expired request surfaces as
//! [`RetroClientError::Timeout`]. Non-success statuses decode the optional
//! `{"message": …}` body into [`RetroClientError::Api`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::api::GameApi;
use crate::config::ClientConfig;
use crate::error::{Result, RetroClientError};
use crate::protocol::{
    AdvanceAck, ApiErrorBody, CardChoice, CardId, CreateGameRequest, CreateGameResponse,
    DeletedAck, GameStateResponse, JoinGameRequest, JoinGameResponse, NewCard, PhaseAck,
    PickWinnerAck, PlayerRole, ReadyAck, RoundId, SubmissionId, SubmitCardsRequest, SubmittedAck,
    VoteAck, WinnerChoice,
};

/// Header carrying the session token.
pub const SESSION_TOKEN_HEADER: &str = "X-Session-Token";

/// HTTP implementation of [`GameApi`].
#[derive(Debug, Clone)]
pub struct HttpGameApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGameApi {
    /// Build a client for `base_url` with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RetroClientError::Http`] if the underlying client cannot be
    /// built (e.g. TLS backend initialisation failure).
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RetroClientError::Http(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Build from a [`ClientConfig`].
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(config.api_base_url.clone(), config.request_timeout)
    }

    /// Wrap a preconfigured `reqwest` client.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let url = format!("{}/api/games{path}", self.base_url);
        let builder = self.client.request(method, url);
        match token {
            Some(token) => builder.header(SESSION_TOKEN_HEADER, token),
            None => builder,
        }
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> Result<T> {
        debug!(path, "POST");
        let response = self
            .request(Method::POST, path, token)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;
        decode(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, token: &str) -> Result<T> {
        debug!(path, "GET");
        let response = self
            .request(Method::GET, path, Some(token))
            .send()
            .await
            .map_err(map_transport_error)?;
        decode(response).await
    }
}

fn map_transport_error(e: reqwest::Error) -> RetroClientError {
    if e.is_timeout() {
        RetroClientError::Timeout
    } else {
        RetroClientError::Http(e.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.bytes().await.map_err(map_transport_error)?;
    if !status.is_success() {
        let message = serde_json::from_slice::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.message);
        return Err(RetroClientError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(serde_json::from_slice(&body)?)
}

/// Empty JSON object body for action endpoints.
#[derive(Serialize)]
struct Empty {}

#[async_trait]
impl GameApi for HttpGameApi {
    async fn create_game(
        &self,
        display_name: &str,
        role: PlayerRole,
    ) -> Result<CreateGameResponse> {
        let body = CreateGameRequest {
            display_name: display_name.to_string(),
            role,
        };
        self.post("", None, &body).await
    }

    async fn join_game(&self, code: &str, display_name: &str) -> Result<JoinGameResponse> {
        let body = JoinGameRequest {
            display_name: display_name.to_string(),
        };
        self.post(&format!("/{code}/join"), None, &body).await
    }

    async fn get_game_state(&self, code: &str, token: &str) -> Result<GameStateResponse> {
        self.get(&format!("/{code}"), token).await
    }

    async fn reconnect(&self, code: &str, token: &str) -> Result<GameStateResponse> {
        self.post(&format!("/{code}/reconnect"), Some(token), &Empty {})
            .await
    }

    async fn start_game(&self, code: &str, token: &str) -> Result<PhaseAck> {
        self.post(&format!("/{code}/start"), Some(token), &Empty {})
            .await
    }

    async fn submit_cards(
        &self,
        code: &str,
        token: &str,
        cards: &[NewCard],
    ) -> Result<SubmittedAck> {
        let body = SubmitCardsRequest {
            cards: cards.to_vec(),
        };
        self.post(&format!("/{code}/cards"), Some(token), &body).await
    }

    async fn mark_ready(&self, code: &str, token: &str) -> Result<ReadyAck> {
        self.post(&format!("/{code}/ready"), Some(token), &Empty {})
            .await
    }

    async fn begin_game(&self, code: &str, token: &str) -> Result<PhaseAck> {
        self.post(&format!("/{code}/begin"), Some(token), &Empty {})
            .await
    }

    async fn submit_card(
        &self,
        code: &str,
        round_id: RoundId,
        card_id: CardId,
        token: &str,
    ) -> Result<SubmittedAck> {
        self.post(
            &format!("/{code}/rounds/{round_id}/submit"),
            Some(token),
            &CardChoice { card_id },
        )
        .await
    }

    async fn pick_winner(
        &self,
        code: &str,
        round_id: RoundId,
        submission_id: SubmissionId,
        token: &str,
    ) -> Result<PickWinnerAck> {
        self.post(
            &format!("/{code}/rounds/{round_id}/pick-winner"),
            Some(token),
            &WinnerChoice { submission_id },
        )
        .await
    }

    async fn vote(
        &self,
        code: &str,
        round_id: RoundId,
        card_id: CardId,
        token: &str,
    ) -> Result<VoteAck> {
        self.post(
            &format!("/{code}/rounds/{round_id}/vote"),
            Some(token),
            &CardChoice { card_id },
        )
        .await
    }

    async fn advance_round(&self, code: &str, token: &str) -> Result<AdvanceAck> {
        self.post(&format!("/{code}/advance"), Some(token), &Empty {})
            .await
    }

    async fn finish_game(&self, code: &str, token: &str) -> Result<DeletedAck> {
        self.post(&format!("/{code}/finish"), Some(token), &Empty {})
            .await
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
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve exactly one HTTP exchange with a canned response and hand back
    /// the raw request text.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::sync::oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request);
                if let Some(head_end) = text.find("\r\n\r\n") {
                    let content_length = text[..head_end]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= head_end + 4 + content_length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = seen_tx.send(String::from_utf8_lossy(&request).into_owned());
        });

        (format!("http://{addr}"), seen_rx)
    }

    #[tokio::test]
    async fn action_sends_session_token_header() {
        let (base, seen) = serve_once("200 OK", r#"{"phase":"card_creation"}"#).await;
        let api = HttpGameApi::new(base, Duration::from_secs(5)).unwrap();

        let ack = api.start_game("AB12CD", "t1").await.unwrap();
        assert_eq!(ack.phase, crate::protocol::GamePhase::CardCreation);

        let request = seen.await.unwrap().to_ascii_lowercase();
        assert!(request.starts_with("post /api/games/ab12cd/start"));
        assert!(request.contains("x-session-token: t1"));
    }

    #[tokio::test]
    async fn error_status_carries_server_message() {
        let (base, _seen) = serve_once("409 Conflict", r#"{"message":"Not your turn"}"#).await;
        let api = HttpGameApi::new(base, Duration::from_secs(5)).unwrap();

        let err = api.submit_card("AB12CD", 3, 44, "t1").await.unwrap_err();
        match err {
            RetroClientError::Api { status, message } => {
                assert_eq!(status, 409);
                assert_eq!(message.as_deref(), Some("Not your turn"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_status_without_json_body_has_no_message() {
        let (base, _seen) = serve_once("500 Internal Server Error", "oops").await;
        let api = HttpGameApi::new(base, Duration::from_secs(5)).unwrap();

        let err = api.mark_ready("AB12CD", "t1").await.unwrap_err();
        assert!(matches!(
            err,
            RetroClientError::Api {
                status: 500,
                message: None
            }
        ));
    }

    #[tokio::test]
    async fn hung_request_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and never answer.
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let api = HttpGameApi::new(format!("http://{addr}"), Duration::from_millis(100)).unwrap();
        let err = api.reconnect("AB12CD", "t1").await.unwrap_err();
        assert!(matches!(err, RetroClientError::Timeout));
    }

    #[tokio::test]
    async fn unreachable_server_is_an_http_error() {
        let api = HttpGameApi::new("http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let err = api.get_game_state("AB12CD", "t1").await.unwrap_err();
        assert!(matches!(err, RetroClientError::Http(_)));
    }
}
