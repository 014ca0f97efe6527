//! Reconnecting realtime channel with a connection-independent event stream.
//!
//! [`RealtimeChannel`] owns a persistent broadcast dispatcher. A background
//! loop task feeds decoded [`ServerEvent`]s into it from whatever transport is
//! currently open; when the transport drops, the loop asks its [`Connector`]
//! for a new one (with exponential backoff) and re-joins the room. Callers
//! subscribe to the dispatcher through [`EventStream`]s, so a subscription
//! taken before a reconnect keeps receiving events after it.
//!
//! ```rust,ignore
//! let mut channel = RealtimeChannel::new(connector, RealtimeConfig::default());
//! let mut updates = channel.on_game_state_updated();
//! channel.connect("AB12CD", "token");
//!
//! while let Some(update) = updates.recv().await {
//!     println!("phase is now {}", update.game.phase);
//! }
//! ```
//!
//! Transport failures never surface as errors: the stream simply yields no
//! events until the link is back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::config::{
    DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_MAX_RECONNECT_DELAY, DEFAULT_RECONNECT_DELAY,
    DEFAULT_SHUTDOWN_TIMEOUT,
};
use crate::error::RetroClientError;
use crate::protocol::{
    Card, ClientMessage, FinalScore, GameStateUpdated, PlayerConnectionChanged, RoomCredentials,
    ServerEvent,
};
use crate::transport::{Connector, Transport};

// ── Configuration ───────────────────────────────────────────────────

/// Timing and buffering knobs of a [`RealtimeChannel`].
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// First reconnect delay; doubles after each consecutive failure.
    pub reconnect_delay: Duration,
    /// Upper bound of the reconnect delay.
    pub max_reconnect_delay: Duration,
    /// Events buffered per subscriber before the slowest one starts lagging.
    pub event_channel_capacity: usize,
    /// Time [`RealtimeChannel::disconnect`] waits for the loop before aborting it.
    pub shutdown_timeout: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_delay: DEFAULT_MAX_RECONNECT_DELAY,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

// ── Event streams ───────────────────────────────────────────────────

/// A subscription to one kind of realtime event.
///
/// Every stream is an independent receiver on the channel's dispatcher:
/// dropping it affects neither other streams nor the channel. A stream that
/// falls more than `event_channel_capacity` events behind skips the oldest
/// ones and logs a warning.
pub struct EventStream<T> {
    rx: broadcast::Receiver<ServerEvent>,
    select: fn(ServerEvent) -> Option<T>,
}

impl<T> EventStream<T> {
    fn new(rx: broadcast::Receiver<ServerEvent>, select: fn(ServerEvent) -> Option<T>) -> Self {
        Self { rx, select }
    }

    /// Wait for the next matching event.
    ///
    /// Returns `None` once the owning [`RealtimeChannel`] has been dropped.
    /// Cancel-safe.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if let Some(item) = (self.select)(event) {
                        return Some(item);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next matching event that is already buffered, without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    if let Some(item) = (self.select)(event) {
                        return Some(item);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged, skipping ahead");
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => return None,
            }
        }
    }
}

impl<T> std::fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("buffered", &self.rx.len())
            .finish()
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the channel handle and the loop task.
struct LinkState {
    connected: AtomicBool,
}

enum Command {
    Join(RoomCredentials),
}

/// One running loop task and the handles needed to steer it.
struct ChannelLink {
    cmd_tx: mpsc::UnboundedSender<Command>,
    task: Option<tokio::task::JoinHandle<()>>,
    /// Carries the farewell message to send before closing.
    shutdown_tx: Option<oneshot::Sender<Option<ClientMessage>>>,
}

impl ChannelLink {
    fn is_alive(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for ChannelLink {
    fn drop(&mut self) {
        // No executor to drive a graceful close from `Drop`; abort instead.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Channel handle ──────────────────────────────────────────────────

/// Reconnecting realtime channel to one game room.
pub struct RealtimeChannel {
    connector: Arc<dyn Connector>,
    config: RealtimeConfig,
    dispatcher: broadcast::Sender<ServerEvent>,
    state: Arc<LinkState>,
    link: Option<ChannelLink>,
}

impl RealtimeChannel {
    pub fn new(connector: impl Connector, config: RealtimeConfig) -> Self {
        Self::with_shared_connector(Arc::new(connector), config)
    }

    pub fn with_shared_connector(connector: Arc<dyn Connector>, config: RealtimeConfig) -> Self {
        // tokio panics on a zero-capacity broadcast channel.
        let capacity = config.event_channel_capacity.max(1);
        let (dispatcher, _) = broadcast::channel(capacity);
        Self {
            connector,
            config,
            dispatcher,
            state: Arc::new(LinkState {
                connected: AtomicBool::new(false),
            }),
            link: None,
        }
    }

    /// Open the channel and join the room of `game_code`.
    ///
    /// Idempotent: when the loop is already running this only re-sends the
    /// room join (and remembers the credentials for later re-joins); it never
    /// opens a second connection. If the running loop is joined to another
    /// game, that room is left first. Must be called within a tokio runtime.
    pub fn connect(&mut self, game_code: &str, session_token: &str) {
        let room = RoomCredentials::new(game_code, session_token);

        if let Some(link) = self.link.as_ref().filter(|link| link.is_alive()) {
            debug!(game_code, "realtime channel already running, re-sending room join");
            if link.cmd_tx.send(Command::Join(room.clone())).is_ok() {
                return;
            }
        }

        // Either nothing is running or the previous loop has exited.
        self.link = None;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        debug!(game_code, "starting realtime channel");
        let task = tokio::spawn(channel_loop(
            Arc::clone(&self.connector),
            cmd_rx,
            self.dispatcher.clone(),
            Arc::clone(&self.state),
            shutdown_rx,
            room,
            self.config.clone(),
        ));

        self.link = Some(ChannelLink {
            cmd_tx,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
        });
    }

    /// Leave the room and tear the channel down.
    ///
    /// Sends `leave_game_room`, closes the transport and stops the loop. The
    /// loop gets `shutdown_timeout` to finish; after that it is aborted. No
    /// event received afterwards is dispatched.
    pub async fn disconnect(&mut self, game_code: &str, session_token: &str) {
        let farewell = ClientMessage::LeaveGameRoom(RoomCredentials::new(game_code, session_token));
        self.stop(Some(farewell)).await;
    }

    /// Tear the channel down without leaving the room.
    pub async fn close(&mut self) {
        self.stop(None).await;
    }

    async fn stop(&mut self, farewell: Option<ClientMessage>) {
        let Some(mut link) = self.link.take() else {
            debug!("stop requested, but the realtime channel is not running");
            return;
        };

        if let Some(tx) = link.shutdown_tx.take() {
            let _ = tx.send(farewell);
        }

        if let Some(mut task) = link.task.take() {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("realtime loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("realtime loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("realtime loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
    }

    // ── Subscriptions ───────────────────────────────────────────────

    /// Every event, in arrival order.
    pub fn subscribe(&self) -> EventStream<ServerEvent> {
        EventStream::new(self.dispatcher.subscribe(), Some)
    }

    pub fn on_game_state_updated(&self) -> EventStream<GameStateUpdated> {
        EventStream::new(self.dispatcher.subscribe(), |event| match event {
            ServerEvent::GameStateUpdated(update) => Some(update),
            _ => None,
        })
    }

    pub fn on_your_cards_updated(&self) -> EventStream<Vec<Card>> {
        EventStream::new(self.dispatcher.subscribe(), |event| match event {
            ServerEvent::YourCardsUpdated(update) => Some(update.cards),
            _ => None,
        })
    }

    pub fn on_game_finished(&self) -> EventStream<Vec<FinalScore>> {
        EventStream::new(self.dispatcher.subscribe(), |event| match event {
            ServerEvent::GameFinished(finished) => Some(finished.final_scores),
            _ => None,
        })
    }

    pub fn on_player_connection_changed(&self) -> EventStream<PlayerConnectionChanged> {
        EventStream::new(self.dispatcher.subscribe(), |event| match event {
            ServerEvent::PlayerConnectionChanged(change) => Some(change),
            _ => None,
        })
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` while a transport is open and joined.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Returns `true` while the loop task is alive (connected or reconnecting).
    pub fn is_running(&self) -> bool {
        self.link.as_ref().is_some_and(ChannelLink::is_alive)
    }
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("connected", &self.is_connected())
            .field("running", &self.is_running())
            .field("subscribers", &self.dispatcher.receiver_count())
            .finish()
    }
}

// ── Channel loop ────────────────────────────────────────────────────

/// Why one transport's pump ended.
enum LinkEnd {
    /// Shutdown was requested; the loop must exit.
    Shutdown,
    /// The transport failed or was closed by the server; reconnect.
    Lost,
}

/// Exponential reconnect delay, reset after every successful connect.
struct Backoff {
    initial: Duration,
    max: Duration,
    next: Duration,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            next: initial,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.next = self.initial;
    }
}

/// Background loop: connect, join, pump events, reconnect on loss.
///
/// Exits when shutdown is requested or the channel handle is dropped.
async fn channel_loop(
    connector: Arc<dyn Connector>,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    dispatcher: broadcast::Sender<ServerEvent>,
    state: Arc<LinkState>,
    mut shutdown_rx: oneshot::Receiver<Option<ClientMessage>>,
    mut room: RoomCredentials,
    config: RealtimeConfig,
) {
    debug!("realtime loop started");
    let mut backoff = Backoff::new(config.reconnect_delay, config.max_reconnect_delay);

    loop {
        let mut transport = match open(&*connector, &mut cmd_rx, &mut shutdown_rx, &mut room).await {
            Opened::Transport(transport) => transport,
            Opened::Failed(e) => {
                let delay = backoff.next_delay();
                warn!(?delay, "realtime connection error: {e}");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => continue,
                    _ = &mut shutdown_rx => break,
                }
            }
            Opened::Stop => break,
        };

        backoff.reset();
        state.connected.store(true, Ordering::Release);
        debug!(game_code = %room.game_code, "realtime transport connected, joining room");

        let join = ClientMessage::JoinGameRoom(room.clone());
        let end = match send_message(transport.as_mut(), &join).await {
            Ok(()) => {
                pump(
                    transport.as_mut(),
                    &mut cmd_rx,
                    &mut shutdown_rx,
                    &dispatcher,
                    &mut room,
                )
                .await
            }
            Err(e) => {
                error!("failed to send room join: {e}");
                LinkEnd::Lost
            }
        };

        state.connected.store(false, Ordering::Release);

        match end {
            LinkEnd::Shutdown => break,
            LinkEnd::Lost => {
                let delay = backoff.next_delay();
                warn!(?delay, "realtime transport lost, reconnecting");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = &mut shutdown_rx => {
                        debug!("shutdown requested while reconnecting");
                        break;
                    }
                }
            }
        }
    }

    state.connected.store(false, Ordering::Release);
    debug!("realtime loop exited");
}

enum Opened {
    Transport(Box<dyn Transport>),
    Failed(RetroClientError),
    Stop,
}

/// Run one connection attempt to completion.
///
/// Join commands arriving meanwhile only replace the credentials; the room is
/// joined once the transport is up.
async fn open(
    connector: &dyn Connector,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    shutdown_rx: &mut oneshot::Receiver<Option<ClientMessage>>,
    room: &mut RoomCredentials,
) -> Opened {
    let connecting = connector.connect();
    tokio::pin!(connecting);
    loop {
        tokio::select! {
            result = &mut connecting => {
                return match result {
                    Ok(transport) => Opened::Transport(transport),
                    Err(e) => Opened::Failed(e),
                };
            }
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Join(next)) => *room = next,
                None => return Opened::Stop,
            },
            _ = &mut *shutdown_rx => return Opened::Stop,
        }
    }
}

/// Multiplex commands, shutdown and inbound frames on one open transport.
async fn pump(
    transport: &mut dyn Transport,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    shutdown_rx: &mut oneshot::Receiver<Option<ClientMessage>>,
    dispatcher: &broadcast::Sender<ServerEvent>,
    room: &mut RoomCredentials,
) -> LinkEnd {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Join(next)) => {
                    if !room.game_code.eq_ignore_ascii_case(&next.game_code) {
                        debug!(from = %room.game_code, to = %next.game_code, "switching rooms");
                        let leave = ClientMessage::LeaveGameRoom(room.clone());
                        if let Err(e) = send_message(transport, &leave).await {
                            error!("failed to leave previous room: {e}");
                            *room = next;
                            return LinkEnd::Lost;
                        }
                    }
                    *room = next;
                    let join = ClientMessage::JoinGameRoom(room.clone());
                    if let Err(e) = send_message(transport, &join).await {
                        error!("failed to send room join: {e}");
                        return LinkEnd::Lost;
                    }
                }
                None => {
                    debug!("command channel closed, shutting down realtime loop");
                    let _ = transport.close().await;
                    return LinkEnd::Shutdown;
                }
            },

            farewell = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                if let Ok(Some(message)) = farewell {
                    if let Err(e) = send_message(transport, &message).await {
                        debug!("failed to send farewell: {e}");
                    }
                }
                let _ = transport.close().await;
                return LinkEnd::Shutdown;
            },

            incoming = transport.recv() => match incoming {
                Some(Ok(text)) => dispatch(dispatcher, &text),
                Some(Err(e)) => {
                    error!("realtime receive error: {e}");
                    return LinkEnd::Lost;
                }
                None => {
                    debug!("realtime transport closed by server");
                    return LinkEnd::Lost;
                }
            },
        }
    }
}

async fn send_message(
    transport: &mut dyn Transport,
    message: &ClientMessage,
) -> Result<(), RetroClientError> {
    let json = serde_json::to_string(message)?;
    transport.send(json).await
}

/// Decode one frame and hand it to every subscriber.
fn dispatch(dispatcher: &broadcast::Sender<ServerEvent>, text: &str) {
    match serde_json::from_str::<ServerEvent>(text) {
        Ok(event) => {
            debug!(kind = event.kind(), "realtime event received");
            if dispatcher.send(event).is_err() {
                debug!("no subscribers, event dropped");
            }
        }
        Err(e) => {
            warn!("failed to decode server event: {e} (raw: {text})");
        }
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
    use crate::protocol::YourCardsUpdated;

    #[test]
    fn backoff_doubles_up_to_max_and_resets() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        assert_eq!(backoff.next_delay(), Duration::from_millis(350));
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn dispatch_filters_by_kind_and_skips_garbage() {
        let (dispatcher, _) = broadcast::channel(8);
        let mut cards = EventStream::new(dispatcher.subscribe(), |event| match event {
            ServerEvent::YourCardsUpdated(update) => Some(update.cards),
            _ => None,
        });
        let mut all = EventStream::new(dispatcher.subscribe(), Some);

        dispatch(&dispatcher, "not json");
        dispatch(
            &dispatcher,
            r#"{"type":"player_connection_changed","player_id":2,"is_connected":true}"#,
        );
        dispatch(&dispatcher, r#"{"type":"your_cards_updated","cards":[]}"#);

        assert_eq!(cards.try_recv(), Some(vec![]));
        assert_eq!(cards.try_recv(), None);
        assert!(matches!(
            all.try_recv(),
            Some(ServerEvent::PlayerConnectionChanged(_))
        ));
        assert!(matches!(all.try_recv(), Some(ServerEvent::YourCardsUpdated(_))));
    }

    #[test]
    fn lagging_stream_skips_ahead() {
        let (dispatcher, _) = broadcast::channel(2);
        let mut all = EventStream::new(dispatcher.subscribe(), Some);
        for _ in 0..5 {
            let _ = dispatcher.send(ServerEvent::YourCardsUpdated(YourCardsUpdated {
                cards: vec![],
            }));
        }
        let mut received = 0;
        while all.try_recv().is_some() {
            received += 1;
        }
        assert_eq!(received, 2);
    }

    #[tokio::test]
    async fn stream_waits_until_an_event_arrives() {
        let (dispatcher, _) = broadcast::channel(8);
        let mut all = EventStream::new(dispatcher.subscribe(), Some);

        let mut next = tokio_test::task::spawn(all.recv());
        tokio_test::assert_pending!(next.poll());

        let _ = dispatcher.send(ServerEvent::YourCardsUpdated(YourCardsUpdated {
            cards: vec![],
        }));
        assert!(next.is_woken());
        let event = tokio_test::assert_ready!(next.poll());
        assert!(matches!(event, Some(ServerEvent::YourCardsUpdated(_))));
    }

    #[tokio::test]
    async fn stream_ends_when_channel_is_dropped() {
        struct NeverConnector;

        #[async_trait::async_trait]
        impl Connector for NeverConnector {
            async fn connect(&self) -> Result<Box<dyn Transport>, RetroClientError> {
                std::future::pending().await
            }
        }

        let channel = RealtimeChannel::new(NeverConnector, RealtimeConfig::default());
        let mut stream = channel.on_game_finished();
        drop(channel);
        assert_eq!(stream.recv().await, None);
    }
}
