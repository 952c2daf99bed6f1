use std::time::Duration;

// ---------------------------------------------------------------------------
// Live feed sockets
// ---------------------------------------------------------------------------

/// Close code sent by either side on an orderly shutdown.
pub const WS_CLOSE_NORMAL: u16 = 1000;

/// Close code the appliance uses when the feed token is missing or rejected.
pub const WS_CLOSE_AUTH_FAILED: u16 = 4001;

/// Query parameter carrying the feed token.
pub const WS_TOKEN_PARAM: &str = "token";

/// Delay before the first reconnect attempt.
pub const RECONNECT_INITIAL_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound for the reconnect delay.
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_millis(30_000);

/// Multiplier applied to the delay after each failed attempt.
pub const RECONNECT_BACKOFF_FACTOR: f64 = 2.0;

/// Reconnect attempts before the client gives up.
pub const RECONNECT_MAX_RETRIES: u32 = 10;

/// How often the client pings an idle feed.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(20);

/// Read deadline: if nothing arrives within this window the socket is
/// treated as dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// Maximum inbound frame size (4 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Feed endpoints
// ---------------------------------------------------------------------------

/// Live log tail.
pub const ENDPOINT_LOGS: &str = "/ws/logs";

/// Live system metrics.
pub const ENDPOINT_METRICS: &str = "/ws/metrics";

/// Interactive terminal session.
pub const ENDPOINT_TERMINAL: &str = "/ws/terminal";

/// Log lines kept by a log tail before the oldest are evicted.
pub const LOG_TAIL_CAPACITY: usize = 1000;

// ---------------------------------------------------------------------------
// Console gateway
// ---------------------------------------------------------------------------

/// Path prefix under which the gateway forwards requests to the backend.
pub const PROXY_MOUNT_PREFIX: &str = "/api/p";

/// Backend paths the gateway is allowed to reach.
pub const PROXY_ALLOWED_PREFIXES: &[&str] = &["/v1/", "/vault/"];

/// Backend paths that may answer with an event stream.
pub const PROXY_STREAMING_PATHS: &[&str] = &["/v1/chat/completions"];

/// Same-origin cookie holding the appliance access key.
pub const ACCESS_KEY_COOKIE: &str = "vault_access_key";

/// Header the access key is forwarded in.
pub const ACCESS_KEY_HEADER: &str = "x-vault-access-key";

/// Wall-clock budget for one proxied request.
pub const PROXY_TIMEOUT: Duration = Duration::from_secs(300);

/// Largest inbound body the gateway will forward (100 MB).
pub const PROXY_MAX_BODY_BYTES: usize = 100 * 1024 * 1024;
