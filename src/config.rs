//! Client configuration.
//!
//! [`ClientConfig`] gathers the endpoints and timing knobs of both channels.
//! Build it with [`ClientConfig::new`] and the `with_*` methods, or read it
//! from the environment with [`ClientConfig::from_env`]:
//!
//! | Variable                   | Default                                 |
//! |----------------------------|-----------------------------------------|
//! | `RETRO_API_URL`            | `http://localhost:5000`                 |
//! | `RETRO_REALTIME_URL`       | API URL with `ws(s)://` scheme + `/ws`  |
//! | `RETRO_REQUEST_TIMEOUT_MS` | `10000`                                 |

use std::env;
use std::time::Duration;

use crate::realtime::RealtimeConfig;

/// Default base URL of the game API.
pub const DEFAULT_API_URL: &str = "http://localhost:5000";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default first delay before reconnecting the realtime channel.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Default upper bound of the reconnect backoff.
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default capacity of the realtime event dispatcher.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful realtime shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for the request/response and realtime channels.
///
/// # Example
///
/// ```
/// use retro_party_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new("https://retro.example.com")
///     .with_request_timeout(Duration::from_secs(3));
/// assert_eq!(config.realtime_url, "wss://retro.example.com/ws");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the HTTP API, without a trailing slash.
    pub api_base_url: String,
    /// URL of the realtime endpoint.
    pub realtime_url: String,
    /// Upper bound on every HTTP request.
    pub request_timeout: Duration,
    /// First delay before a reconnect attempt; doubles after each failure.
    pub reconnect_delay: Duration,
    /// Upper bound of the reconnect delay.
    pub max_reconnect_delay: Duration,
    /// Capacity of the event dispatcher. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time the realtime loop gets to close gracefully before it is aborted.
    pub shutdown_timeout: Duration,
}

impl ClientConfig {
    /// Configuration for the given API base URL with default values.
    ///
    /// The realtime URL is derived from the base URL.
    pub fn new(api_base_url: impl Into<String>) -> Self {
        let api_base_url = api_base_url.into().trim_end_matches('/').to_string();
        let realtime_url = derive_realtime_url(&api_base_url);
        Self {
            api_base_url,
            realtime_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_delay: DEFAULT_MAX_RECONNECT_DELAY,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Read the configuration from `RETRO_*` environment variables.
    ///
    /// Unset or unparsable values fall back to their defaults.
    pub fn from_env() -> Self {
        let api_url = env_optional("RETRO_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let mut config = Self::new(api_url);
        if let Some(url) = env_optional("RETRO_REALTIME_URL") {
            config.realtime_url = url;
        }
        if let Some(ms) = env_optional("RETRO_REQUEST_TIMEOUT_MS").and_then(|v| v.parse::<u64>().ok())
        {
            config.request_timeout = Duration::from_millis(ms);
        }
        config
    }

    #[must_use]
    pub fn with_realtime_url(mut self, url: impl Into<String>) -> Self {
        self.realtime_url = url.into();
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the reconnect backoff bounds. `max` is raised to `initial` if lower.
    #[must_use]
    pub fn with_reconnect_delay(mut self, initial: Duration, max: Duration) -> Self {
        self.reconnect_delay = initial;
        self.max_reconnect_delay = max.max(initial);
        self
    }

    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// The realtime part of this configuration.
    pub fn realtime(&self) -> RealtimeConfig {
        RealtimeConfig {
            reconnect_delay: self.reconnect_delay,
            max_reconnect_delay: self.max_reconnect_delay,
            event_channel_capacity: self.event_channel_capacity.max(1),
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

fn env_optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn derive_realtime_url(api_base_url: &str) -> String {
    let rest = if let Some(rest) = api_base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_base_url.to_string()
    };
    format!("{rest}/ws")
}
