//! Live log tail.
//!
//! Log lines go into a ring buffer (newest first). `info` frames are
//! notices about the feed itself and are kept apart from the lines.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::debug;

use vaultdeck_protocol::constants::{ENDPOINT_LOGS, LOG_TAIL_CAPACITY};
use vaultdeck_protocol::{LogEntry, LogFeedMessage, LogLevel};
use vaultdeck_stream_client::{
    ClientConfig, Connector, Params, StreamClient, Subscription, TokenStore, TungsteniteConnector,
};

use crate::buffer::RingBuffer;

/// Server-side filters, sent as routing parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    /// Minimum level.
    pub level: Option<LogLevel>,
    /// Only lines from this source.
    pub source: Option<String>,
}

impl LogFilter {
    pub fn to_params(&self) -> Params {
        let mut params = Params::new();
        if let Some(level) = self.level {
            params.insert("level".into(), level.as_str().into());
        }
        if let Some(source) = &self.source {
            params.insert("source".into(), source.clone());
        }
        params
    }
}

/// Buffered tail state. Synchronous; fed by the connection's handler.
#[derive(Debug, Clone)]
pub struct LogTailState {
    entries: RingBuffer<LogEntry>,
    info: Option<String>,
}

impl LogTailState {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RingBuffer::new(capacity),
            info: None,
        }
    }

    pub fn apply(&mut self, msg: LogFeedMessage) {
        match msg {
            LogFeedMessage::Log(entry) => self.entries.push(entry),
            LogFeedMessage::Info { message } => self.info = Some(message),
        }
    }

    /// Buffered lines, newest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.to_vec()
    }

    /// Latest feed notice, if any.
    pub fn info(&self) -> Option<&str> {
        self.info.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.info = None;
    }
}

/// A log feed subscription with its buffer.
pub struct LogTail {
    client: StreamClient<LogFeedMessage>,
    state: Arc<Mutex<LogTailState>>,
    updates: broadcast::Sender<LogFeedMessage>,
}

impl LogTail {
    /// Opens the log feed. `capacity` of `None` uses the default (1000).
    pub fn open(
        config: ClientConfig,
        tokens: Arc<TokenStore>,
        filter: &LogFilter,
        capacity: Option<usize>,
    ) -> Self {
        let connector = Arc::new(TungsteniteConnector::new(config.max_message_size));
        Self::with_connector(config, connector, tokens, filter, capacity)
    }

    pub fn with_connector(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        tokens: Arc<TokenStore>,
        filter: &LogFilter,
        capacity: Option<usize>,
    ) -> Self {
        let state = Arc::new(Mutex::new(LogTailState::new(
            capacity.unwrap_or(LOG_TAIL_CAPACITY),
        )));
        let (updates, _) = broadcast::channel(256);

        let handler = {
            let state = state.clone();
            let updates = updates.clone();
            move |msg: LogFeedMessage| {
                if let LogFeedMessage::Info { message } = &msg {
                    debug!(%message, "log feed notice");
                }
                state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .apply(msg.clone());
                let _ = updates.send(msg);
            }
        };

        let mut subscription = Subscription::new(ENDPOINT_LOGS);
        subscription.params = filter.to_params();
        let client = StreamClient::with_connector(config, connector, tokens, subscription, handler);

        Self {
            client,
            state,
            updates,
        }
    }

    /// Buffered lines, newest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().entries()
    }

    pub fn info(&self) -> Option<String> {
        self.lock().info().map(str::to_string)
    }

    /// Every message as it arrives, lines and notices alike.
    pub fn subscribe(&self) -> broadcast::Receiver<LogFeedMessage> {
        self.updates.subscribe()
    }

    /// Changes the filters. When they differ from the current ones the feed
    /// restarts and the buffer is emptied between the old and new socket.
    /// An unchanged filter keeps the buffer.
    pub fn set_filter(&self, filter: &LogFilter) {
        let state = self.state.clone();
        self.client.set_params_with(filter.to_params(), move || {
            state.lock().unwrap_or_else(PoisonError::into_inner).clear();
        });
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// The underlying connection, for state, reconnect and disconnect.
    pub fn client(&self) -> &StreamClient<LogFeedMessage> {
        &self.client
    }

    pub async fn close(&mut self) {
        self.client.close().await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LogTailState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
