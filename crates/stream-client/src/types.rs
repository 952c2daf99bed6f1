//! Public types for the stream client.

use std::collections::BTreeMap;
use std::time::Duration;

use vaultdeck_protocol::constants::{
    RECONNECT_BACKOFF_FACTOR, RECONNECT_INITIAL_DELAY, RECONNECT_MAX_DELAY,
    RECONNECT_MAX_RETRIES, WS_CLOSE_AUTH_FAILED, WS_CLOSE_NORMAL, WS_MAX_MESSAGE_SIZE,
    WS_PING_PERIOD, WS_PONG_WAIT,
};

use crate::feed_url::Origin;

/// Routing/filter query parameters for a feed. Never contains the token.
pub type Params = BTreeMap<String, String>;

/// Lifecycle state of a feed connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected and not trying to. Initial and terminal state.
    Disconnected,
    /// WebSocket handshake in progress.
    Connecting,
    /// Handshake complete; frames are flowing.
    Connected,
    /// Connection lost, waiting for the backoff timer before retry `attempt`.
    Reconnecting { attempt: u32 },
}

/// Events emitted by a [`StreamClient`](crate::StreamClient).
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The connection moved to a new state.
    StateChanged(ConnectionState),
    /// A reconnect was scheduled after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
}

/// What to subscribe to.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    /// Endpoint path on the appliance, e.g. `/ws/logs`.
    pub endpoint: String,
    /// Routing/filter parameters. Empty values are omitted from the URL.
    pub params: Params,
    /// When false the client stays disconnected until enabled.
    pub enabled: bool,
}

impl Subscription {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Params::new(),
            enabled: true,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Configuration for automatic reconnection with exponential backoff.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (backoff cap).
    pub max_delay: Duration,
    /// Multiplier for each subsequent attempt.
    pub backoff_factor: f64,
    /// Attempts before giving up into `Disconnected`.
    pub max_retries: u32,
    /// Close codes that end the subscription without a retry.
    pub terminal_close_codes: Vec<u16>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: RECONNECT_INITIAL_DELAY,
            max_delay: RECONNECT_MAX_DELAY,
            backoff_factor: RECONNECT_BACKOFF_FACTOR,
            max_retries: RECONNECT_MAX_RETRIES,
            terminal_close_codes: vec![WS_CLOSE_NORMAL, WS_CLOSE_AUTH_FAILED],
        }
    }
}

impl ReconnectConfig {
    /// Delay to wait given how many retries already happened (0-based):
    /// `min(initial_delay * backoff_factor^retry_count, max_delay)`.
    pub fn delay_for_retry(&self, retry_count: u32) -> Duration {
        let exp = retry_count.min(63) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(exp);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Whether a close with this code must not be retried.
    pub fn is_terminal(&self, code: u16) -> bool {
        self.terminal_close_codes.contains(&code)
    }
}

/// Ping period and read deadline for idle feeds.
#[derive(Debug, Clone, Copy)]
pub struct Keepalive {
    pub ping_period: Duration,
    pub pong_wait: Duration,
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            ping_period: WS_PING_PERIOD,
            pong_wait: WS_PONG_WAIT,
        }
    }
}

/// Client-wide settings shared by every subscription.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Scheme and host feed URLs are built against.
    pub origin: Origin,
    pub reconnect: ReconnectConfig,
    /// `None` disables pings and the read deadline.
    pub keepalive: Option<Keepalive>,
    /// Inbound frames larger than this are dropped.
    pub max_message_size: usize,
}

impl ClientConfig {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            reconnect: ReconnectConfig::default(),
            keepalive: Some(Keepalive::default()),
            max_message_size: WS_MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.reconnect.max_retries = max_retries;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_config_defaults() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_millis(1000));
        assert_eq!(config.max_delay, Duration::from_millis(30_000));
        assert!((config.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.max_retries, 10);
        assert!(config.is_terminal(1000));
        assert!(config.is_terminal(4001));
        assert!(!config.is_terminal(1006));
    }

    #[test]
    fn delay_doubles_then_caps() {
        let config = ReconnectConfig::default();
        let delays: Vec<u64> = (0..10)
            .map(|n| config.delay_for_retry(n).as_millis() as u64)
            .collect();
        assert_eq!(
            delays,
            [1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000, 30000, 30000]
        );
    }

    #[test]
    fn delay_survives_huge_retry_counts() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_retry(u32::MAX), config.max_delay);
    }

    #[test]
    fn subscription_builder() {
        let sub = Subscription::new("/ws/logs")
            .param("level", "error")
            .enabled(false);
        assert_eq!(sub.endpoint, "/ws/logs");
        assert_eq!(sub.params.get("level").map(String::as_str), Some("error"));
        assert!(!sub.enabled);
    }
}
