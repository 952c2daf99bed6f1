//! Same-origin reverse proxy between the console and the appliance API.
//!
//! Requests under the mount prefix are checked against the path policy,
//! the access-key cookie is turned into a header, and the backend response
//! is relayed back, as an event stream when the caller asked for one.

mod body;
mod config;
mod error;
mod headers;
mod intent;
mod path;
mod proxy;
mod relay;
mod router;

pub use config::ProxyConfig;
pub use error::ProxyError;
pub use proxy::{ProxyState, forward};
pub use router::router;
