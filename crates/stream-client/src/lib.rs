//! Reconnecting duplex stream client for VaultDeck live feeds.
//!
//! One [`StreamClient`] owns one WebSocket subscription (log tail, metrics,
//! terminal). It injects the feed token, dispatches parsed frames to the
//! latest handler, and reconnects with capped exponential backoff.

pub mod connection;
pub mod credentials;
pub mod feed_url;
mod pumps;
pub(crate) mod reconnection;
pub mod socket;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{MessageHandler, StreamClient};
pub use credentials::{CredentialError, TokenStore, default_credentials_path};
pub use feed_url::{Origin, build_feed_url};
pub use socket::{Connector, TungsteniteConnector, WsError, WsSink, WsStream};
pub use types::{
    ClientConfig, ConnectionEvent, ConnectionState, Keepalive, Params, ReconnectConfig,
    Subscription,
};
