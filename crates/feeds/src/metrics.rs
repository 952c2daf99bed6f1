//! Live system metrics.
//!
//! Only the newest snapshot matters, so state lives in a `watch` channel
//! and every frame replaces it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use vaultdeck_protocol::constants::ENDPOINT_METRICS;
use vaultdeck_protocol::{MetricsFeedMessage, MetricsSnapshot};
use vaultdeck_stream_client::{
    ClientConfig, Connector, Params, StreamClient, Subscription, TokenStore, TungsteniteConnector,
};

/// A snapshot older than this is considered stale.
pub const STALE_THRESHOLD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct MetricsState {
    latest: Option<MetricsSnapshot>,
    received_at: Option<Instant>,
    info: Option<String>,
}

impl MetricsState {
    pub fn apply(&mut self, msg: MetricsFeedMessage) {
        match msg {
            MetricsFeedMessage::Metrics(snapshot) => {
                self.latest = Some(snapshot);
                self.received_at = Some(Instant::now());
            }
            MetricsFeedMessage::Info { message } => self.info = Some(message),
        }
    }

    pub fn latest(&self) -> Option<&MetricsSnapshot> {
        self.latest.as_ref()
    }

    pub fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }

    /// True once a snapshot has arrived and nothing newer came within
    /// [`STALE_THRESHOLD`].
    pub fn is_stale(&self) -> bool {
        self.received_at
            .is_some_and(|t| t.elapsed() > STALE_THRESHOLD)
    }
}

pub struct MetricsTail {
    client: StreamClient<MetricsFeedMessage>,
    state: watch::Receiver<MetricsState>,
}

impl MetricsTail {
    pub fn open(config: ClientConfig, tokens: Arc<TokenStore>, params: Params) -> Self {
        let connector = Arc::new(TungsteniteConnector::new(config.max_message_size));
        Self::with_connector(config, connector, tokens, params)
    }

    pub fn with_connector(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        tokens: Arc<TokenStore>,
        params: Params,
    ) -> Self {
        let (state_tx, state) = watch::channel(MetricsState::default());
        let handler = move |msg: MetricsFeedMessage| {
            state_tx.send_modify(|s| s.apply(msg));
        };

        let mut subscription = Subscription::new(ENDPOINT_METRICS);
        subscription.params = params;
        let client = StreamClient::with_connector(config, connector, tokens, subscription, handler);

        Self { client, state }
    }

    pub fn latest(&self) -> Option<MetricsSnapshot> {
        self.state.borrow().latest().cloned()
    }

    /// Receiver notified on every snapshot or notice.
    pub fn watch(&self) -> watch::Receiver<MetricsState> {
        self.state.clone()
    }

    pub fn client(&self) -> &StreamClient<MetricsFeedMessage> {
        &self.client
    }

    pub async fn close(&mut self) {
        self.client.close().await;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use futures_util::SinkExt;
    use tokio_tungstenite::tungstenite::Message;
    use vaultdeck_protocol::{CpuMetrics, MemoryMetrics};

    use super::*;
    use crate::test_server;

    fn snapshot(cpu: f64) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            cpu: Some(CpuMetrics {
                usage_percent: cpu,
                cores: 16,
                temp_celsius: None,
            }),
            memory: Some(MemoryMetrics {
                used_bytes: 8,
                total_bytes: 16,
            }),
            gpus: Vec::new(),
        }
    }

    #[test]
    fn replaces_latest_snapshot() {
        let mut state = MetricsState::default();
        assert!(state.latest().is_none());
        assert!(!state.is_stale());

        state.apply(MetricsFeedMessage::Metrics(snapshot(10.0)));
        state.apply(MetricsFeedMessage::Metrics(snapshot(55.0)));
        state.apply(MetricsFeedMessage::Info {
            message: "no GPU".into(),
        });

        let cpu = state.latest().and_then(|s| s.cpu.as_ref()).unwrap();
        assert_eq!(cpu.usage_percent, 55.0);
        assert_eq!(state.info(), Some("no GPU"));
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_goes_stale() {
        let mut state = MetricsState::default();
        state.apply(MetricsFeedMessage::Metrics(snapshot(1.0)));
        assert!(!state.is_stale());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(state.is_stale());
    }

    #[tokio::test]
    async fn follows_a_live_feed() {
        let mut server = test_server::serve().await;
        let tokens = Arc::new(TokenStore::in_memory(Some("tok".into())));
        let mut tail = MetricsTail::open(server.config(), tokens, Params::new());
        let mut watch = tail.watch();

        let (path, mut ws) = server.accept().await;
        assert_eq!(path, "/ws/metrics?token=tok");

        let json =
            serde_json::to_string(&MetricsFeedMessage::Metrics(snapshot(42.0))).unwrap();
        ws.send(Message::Text(json.into())).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), watch.changed())
            .await
            .unwrap()
            .unwrap();
        let latest = tail.latest().unwrap();
        assert_eq!(latest.cpu.unwrap().usage_percent, 42.0);

        tail.close().await;
    }
}
