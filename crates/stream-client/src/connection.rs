//! Reconnecting feed connection.
//!
//! A [`StreamClient`] is a handle to one supervisor task. The supervisor
//! exclusively owns the socket, the in-flight handshake and the retry
//! timer, so at most one socket is ever alive per client. The handle talks
//! to it through a command channel and observes it through a state
//! `watch` and an event channel.

use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::credentials::TokenStore;
use crate::feed_url::build_feed_url;
use crate::reconnection::{Backoff, RetryDecision, Termination};
use crate::socket::{
    Connector, FeedSocket, SocketEvent, TungsteniteConnector, WsError, WsSink, WsStream,
};
use crate::types::{ClientConfig, ConnectionEvent, ConnectionState, Params, Subscription};

/// Callback receiving every parsed inbound message.
pub type MessageHandler<M> = Arc<dyn Fn(M) + Send + Sync>;

type HandlerCell<M> = Arc<RwLock<MessageHandler<M>>>;
type WriterSlot = Arc<std::sync::Mutex<Option<mpsc::Sender<tungstenite::Message>>>>;
type DialFuture = BoxFuture<'static, Result<(WsSink, WsStream), WsError>>;
type ResetHook = Box<dyn FnOnce() + Send>;

enum Command {
    Reconnect,
    Disconnect,
    SetParams(Params, Option<ResetHook>),
    SetEndpoint(String),
    SetEnabled(bool),
}

/// Handle to a live feed subscription.
///
/// Messages are parsed as JSON into `M` (text and binary frames alike) and
/// handed to the current handler in arrival order. Frames that fail to
/// parse are dropped. Public operations never fail; progress is visible
/// through [`state`](Self::state) and [`take_events`](Self::take_events).
pub struct StreamClient<M> {
    commands: mpsc::UnboundedSender<Command>,
    handler: HandlerCell<M>,
    writer: WriterSlot,
    state_rx: watch::Receiver<ConnectionState>,
    events_rx: Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<M> StreamClient<M>
where
    M: DeserializeOwned + Send + 'static,
{
    /// Opens a subscription over real WebSockets.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open<F>(
        config: ClientConfig,
        tokens: Arc<TokenStore>,
        subscription: Subscription,
        on_message: F,
    ) -> Self
    where
        F: Fn(M) + Send + Sync + 'static,
    {
        let connector = Arc::new(TungsteniteConnector::new(config.max_message_size));
        Self::with_connector(config, connector, tokens, subscription, on_message)
    }

    /// Opens a subscription over a caller-supplied transport.
    pub fn with_connector<F>(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        tokens: Arc<TokenStore>,
        subscription: Subscription,
        on_message: F,
    ) -> Self
    where
        F: Fn(M) + Send + Sync + 'static,
    {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let handler: HandlerCell<M> = Arc::new(RwLock::new(Arc::new(on_message)));
        let writer: WriterSlot = Arc::new(std::sync::Mutex::new(None));
        let cancel = CancellationToken::new();

        let supervisor = Supervisor {
            config,
            connector,
            tokens,
            subscription,
            handler: handler.clone(),
            writer: writer.clone(),
            state_tx,
            events_tx,
            backoff: Backoff::default(),
            socket: None,
            dial: None,
            retry: None,
        };
        let task = tokio::spawn(supervisor.run(commands_rx, cancel.clone()));

        Self {
            commands,
            handler,
            writer,
            state_rx,
            events_rx: Mutex::new(Some(events_rx)),
            cancel,
            task: Some(task),
        }
    }

    /// Sends a binary frame if connected. Returns whether it was queued.
    pub fn send(&self, data: impl Into<Bytes>) -> bool {
        self.send_frame(tungstenite::Message::Binary(data.into()))
    }

    /// Sends a text frame if connected.
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send_frame(tungstenite::Message::Text(text.into().into()))
    }

    /// Serializes `value` and sends it as a text frame if connected.
    pub fn send_json<T: Serialize>(&self, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send_text(json),
            Err(e) => {
                debug!("failed to encode outbound feed message: {e}");
                false
            }
        }
    }

    fn send_frame(&self, frame: tungstenite::Message) -> bool {
        let slot = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        }
    }

    /// Resets the retry counter and starts a fresh connection attempt,
    /// superseding any pending retry.
    pub fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }

    /// Tears down the socket and timer and stops retrying until the next
    /// [`reconnect`](Self::reconnect).
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Replaces the message handler without touching the connection.
    pub fn set_handler<F>(&self, on_message: F)
    where
        F: Fn(M) + Send + Sync + 'static,
    {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(on_message);
    }

    /// Changes the routing parameters. A change restarts the subscription.
    pub fn set_params(&self, params: Params) {
        let _ = self.commands.send(Command::SetParams(params, None));
    }

    /// Like [`set_params`](Self::set_params), but runs `on_change` when the
    /// parameters actually differ. It runs after the old socket is gone and
    /// before the new one connects, so no message from the old subscription
    /// reaches the handler after it.
    pub fn set_params_with<F>(&self, params: Params, on_change: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let _ = self
            .commands
            .send(Command::SetParams(params, Some(Box::new(on_change))));
    }

    /// Changes the endpoint. A change restarts the subscription.
    pub fn set_endpoint(&self, endpoint: impl Into<String>) {
        let _ = self.commands.send(Command::SetEndpoint(endpoint.into()));
    }

    /// Enables or disables the subscription.
    pub fn set_enabled(&self, enabled: bool) {
        let _ = self.commands.send(Command::SetEnabled(enabled));
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Stops the supervisor and waits until the socket is closed. After this
    /// returns the handler is never called again. Safe to call repeatedly.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<M> Drop for StreamClient<M> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Supervisor<M> {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    tokens: Arc<TokenStore>,
    subscription: Subscription,
    handler: HandlerCell<M>,
    writer: WriterSlot,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: mpsc::Sender<ConnectionEvent>,
    backoff: Backoff,
    socket: Option<FeedSocket>,
    dial: Option<DialFuture>,
    retry: Option<Pin<Box<Sleep>>>,
}

impl<M> Supervisor<M>
where
    M: DeserializeOwned + Send + 'static,
{
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        cancel: CancellationToken,
    ) {
        if self.subscription.enabled {
            self.connect().await;
        }

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.on_command(cmd).await,
                    None => break,
                },

                result = poll_dial(&mut self.dial) => self.on_dial(result),

                event = poll_socket(&mut self.socket) => self.on_socket_event(event).await,

                () = poll_retry(&mut self.retry) => {
                    self.retry = None;
                    self.connect().await;
                }
            }
        }

        self.teardown().await;
        self.set_state(ConnectionState::Disconnected);
        debug!(endpoint = %self.subscription.endpoint, "feed connection closed");
    }

    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Reconnect => {
                self.backoff.reset();
                self.connect().await;
            }
            Command::Disconnect => {
                info!(endpoint = %self.subscription.endpoint, "feed disconnected by caller");
                self.backoff.exhaust(&self.config.reconnect);
                self.teardown().await;
                self.set_state(ConnectionState::Disconnected);
            }
            Command::SetParams(params, on_change) => {
                if params != self.subscription.params {
                    self.subscription.params = params;
                    self.teardown().await;
                    if let Some(on_change) = on_change {
                        on_change();
                    }
                    self.resubscribe().await;
                }
            }
            Command::SetEndpoint(endpoint) => {
                if endpoint != self.subscription.endpoint {
                    self.subscription.endpoint = endpoint;
                    self.resubscribe().await;
                }
            }
            Command::SetEnabled(enabled) => {
                if enabled != self.subscription.enabled {
                    self.subscription.enabled = enabled;
                    self.resubscribe().await;
                }
            }
        }
    }

    async fn resubscribe(&mut self) {
        self.teardown().await;
        self.set_state(ConnectionState::Disconnected);
        self.backoff.reset();
        if self.subscription.enabled {
            self.connect().await;
        }
    }

    /// Starts a connect attempt after tearing down whatever came before.
    async fn connect(&mut self) {
        self.teardown().await;

        if !self.subscription.enabled {
            self.set_state(ConnectionState::Disconnected);
            return;
        }
        let Some(token) = self.tokens.token() else {
            warn!(endpoint = %self.subscription.endpoint, "no feed token, staying disconnected");
            self.set_state(ConnectionState::Disconnected);
            return;
        };
        let url = match build_feed_url(
            &self.config.origin,
            &self.subscription.endpoint,
            &self.subscription.params,
            &token,
        ) {
            Ok(url) => url,
            Err(e) => {
                warn!(endpoint = %self.subscription.endpoint, "invalid feed URL: {e}");
                self.set_state(ConnectionState::Disconnected);
                return;
            }
        };

        debug!(endpoint = %self.subscription.endpoint, "connecting to feed");
        self.set_state(ConnectionState::Connecting);
        self.dial = Some(self.connector.connect(url));
    }

    fn on_dial(&mut self, result: Result<(WsSink, WsStream), WsError>) {
        match result {
            Ok((sink, stream)) => {
                let socket = FeedSocket::spawn(
                    sink,
                    stream,
                    self.config.keepalive,
                    self.config.max_message_size,
                );
                *self.writer.lock().unwrap_or_else(PoisonError::into_inner) = Some(socket.writer());
                self.socket = Some(socket);
                self.backoff.reset();
                info!(endpoint = %self.subscription.endpoint, "feed connected");
                self.set_state(ConnectionState::Connected);
            }
            Err(WsError::Unauthorized(status)) => {
                warn!(endpoint = %self.subscription.endpoint, status, "feed rejected credentials");
                self.on_termination(Termination::Unauthorized);
            }
            Err(e) => {
                debug!(endpoint = %self.subscription.endpoint, "feed connect failed: {e}");
                self.on_termination(Termination::Lost);
            }
        }
    }

    async fn on_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Frame(frame) => self.dispatch(frame),
            SocketEvent::Closed(code) => {
                self.teardown().await;
                let termination = match code {
                    Some(code) => Termination::Closed(code),
                    None => Termination::Lost,
                };
                info!(endpoint = %self.subscription.endpoint, ?code, "feed closed");
                self.on_termination(termination);
            }
        }
    }

    fn on_termination(&mut self, termination: Termination) {
        match self
            .backoff
            .on_termination(&self.config.reconnect, termination)
        {
            RetryDecision::Stop => {
                self.set_state(ConnectionState::Disconnected);
            }
            RetryDecision::Retry { attempt, delay } => {
                info!(
                    endpoint = %self.subscription.endpoint,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "reconnecting to feed"
                );
                self.retry = Some(Box::pin(tokio::time::sleep(delay)));
                self.set_state(ConnectionState::Reconnecting { attempt });
                self.emit(ConnectionEvent::Reconnecting { attempt, delay });
            }
        }
    }

    fn dispatch(&self, frame: tungstenite::Message) {
        let parsed: Result<M, serde_json::Error> = match &frame {
            tungstenite::Message::Text(text) => serde_json::from_str(text.as_str()),
            tungstenite::Message::Binary(data) => serde_json::from_slice(data),
            _ => return,
        };
        match parsed {
            Ok(msg) => {
                let handler = self
                    .handler
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                handler(msg);
            }
            Err(e) => {
                debug!(endpoint = %self.subscription.endpoint, "dropping malformed feed message: {e}");
            }
        }
    }

    /// Drops the retry timer and handshake, then closes the socket. The
    /// socket's event channel is detached before the transport closes.
    async fn teardown(&mut self) {
        self.retry = None;
        self.dial = None;
        *self.writer.lock().unwrap_or_else(PoisonError::into_inner) = None;
        if let Some(socket) = self.socket.take() {
            socket.shutdown().await;
        }
    }

    fn set_state(&self, state: ConnectionState) {
        if *self.state_tx.borrow() == state {
            return;
        }
        trace!(endpoint = %self.subscription.endpoint, ?state, "feed state");
        self.state_tx.send_replace(state.clone());
        self.emit(ConnectionEvent::StateChanged(state));
    }

    fn emit(&self, event: ConnectionEvent) {
        if self.events_tx.try_send(event).is_err() {
            trace!("connection event dropped");
        }
    }
}

async fn poll_dial(dial: &mut Option<DialFuture>) -> Result<(WsSink, WsStream), WsError> {
    match dial {
        Some(fut) => {
            let result = fut.await;
            *dial = None;
            result
        }
        None => std::future::pending().await,
    }
}

async fn poll_socket(socket: &mut Option<FeedSocket>) -> SocketEvent {
    match socket {
        Some(socket) => socket.next_event().await,
        None => std::future::pending().await,
    }
}

async fn poll_retry(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
