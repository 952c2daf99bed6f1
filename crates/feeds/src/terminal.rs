//! Interactive terminal / REPL bridge.
//!
//! Output frames are decoded and pushed, in order, onto a channel the
//! caller drains. Keystrokes go out as binary frames and resizes as JSON
//! control frames; both are dropped while the session is not connected.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use vaultdeck_protocol::constants::ENDPOINT_TERMINAL;
use vaultdeck_protocol::{TerminalControl, TerminalFrame};
use vaultdeck_stream_client::{
    ClientConfig, Connector, Params, StreamClient, Subscription, TokenStore, TungsteniteConnector,
};

/// What the remote side produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    Output(Bytes),
    Exit(i32),
    Info(String),
}

pub struct TerminalSession {
    client: StreamClient<TerminalFrame>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<TerminalEvent>>>,
}

impl TerminalSession {
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
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handler = move |frame: TerminalFrame| {
            let event = match frame {
                TerminalFrame::Output { .. } => match frame.output_bytes() {
                    Some(bytes) => TerminalEvent::Output(Bytes::from(bytes)),
                    None => {
                        debug!("dropping terminal output with invalid base64");
                        return;
                    }
                },
                TerminalFrame::Exit { code } => TerminalEvent::Exit(code),
                TerminalFrame::Info { message } => TerminalEvent::Info(message),
            };
            let _ = events_tx.send(event);
        };

        let mut subscription = Subscription::new(ENDPOINT_TERMINAL);
        subscription.params = params;
        let client = StreamClient::with_connector(config, connector, tokens, subscription, handler);

        Self {
            client,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Takes the output receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TerminalEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Sends input bytes. Returns false if the session is not connected.
    pub fn write(&self, input: impl Into<Bytes>) -> bool {
        self.client.send(input)
    }

    pub fn resize(&self, cols: u16, rows: u16) -> bool {
        self.client.send_json(&TerminalControl::Resize { cols, rows })
    }

    pub fn client(&self) -> &StreamClient<TerminalFrame> {
        &self.client
    }

    pub async fn close(&mut self) {
        self.client.close().await;
    }
}
