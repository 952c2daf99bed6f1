//! One live feed socket and the transport that opens it.
//!
//! A [`FeedSocket`] owns the read/write/ping pumps for a single WebSocket.
//! Everything the read pump sees is forwarded as a [`SocketEvent`] on a
//! channel whose receiver lives inside the socket, so dropping or shutting
//! down the socket detaches it before the transport is closed.

use std::pin::Pin;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{Sink, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::types::Keepalive;

/// Errors opening a feed socket.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("feed rejected credentials (HTTP {0})")]
    Unauthorized(u16),

    #[error("invalid feed URL: {0}")]
    Url(#[from] url::ParseError),
}

impl WsError {
    /// Maps handshake failures, singling out rejected credentials.
    fn from_handshake(err: tungstenite::Error) -> Self {
        match &err {
            tungstenite::Error::Http(resp) if matches!(resp.status().as_u16(), 401 | 403) => {
                Self::Unauthorized(resp.status().as_u16())
            }
            _ => Self::Ws(err),
        }
    }
}

pub type WsSink = Pin<Box<dyn Sink<tungstenite::Message, Error = tungstenite::Error> + Send>>;
pub type WsStream =
    Pin<Box<dyn Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Send>>;

/// Opens the transport for a feed URL.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<(WsSink, WsStream), WsError>>;
}

/// Production connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    max_message_size: usize,
}

impl TungsteniteConnector {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Connector for TungsteniteConnector {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<(WsSink, WsStream), WsError>> {
        let max = self.max_message_size;
        Box::pin(async move {
            // The read pump drops frames over `max`; the transport itself
            // only refuses what is far beyond it.
            let hard_cap = max.saturating_mul(4);
            let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
            ws_config.max_message_size = Some(hard_cap);
            ws_config.max_frame_size = Some(hard_cap);
            let (ws_stream, _) =
                tokio_tungstenite::connect_async_with_config(url.as_str(), Some(ws_config), false)
                    .await
                    .map_err(WsError::from_handshake)?;
            let (write, read) = ws_stream.split();
            Ok((Box::pin(write) as WsSink, Box::pin(read) as WsStream))
        })
    }
}

/// What the read pump reports to the connection.
#[derive(Debug)]
pub(crate) enum SocketEvent {
    /// A text or binary data frame.
    Frame(tungstenite::Message),
    /// The socket ended. `Some(code)` when the peer sent a close frame.
    Closed(Option<u16>),
}

/// How long shutdown waits for the pumps before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A live feed socket.
pub(crate) struct FeedSocket {
    write_tx: mpsc::Sender<tungstenite::Message>,
    events_rx: mpsc::Receiver<SocketEvent>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl FeedSocket {
    /// Spawns the pumps for an open transport.
    pub(crate) fn spawn(
        sink: WsSink,
        stream: WsStream,
        keepalive: Option<Keepalive>,
        max_message_size: usize,
    ) -> Self {
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let (events_tx, events_rx) = mpsc::channel::<SocketEvent>(256);
        let cancel = CancellationToken::new();

        let mut handles = Vec::with_capacity(3);
        handles.push(tokio::spawn(crate::pumps::write::write_pump(
            sink,
            write_rx,
            cancel.clone(),
        )));
        handles.push(tokio::spawn(crate::pumps::read::read_pump(
            stream,
            events_tx,
            write_tx.clone(),
            keepalive.map(|k| k.pong_wait),
            max_message_size,
            cancel.clone(),
        )));
        if let Some(keepalive) = keepalive {
            handles.push(tokio::spawn(crate::pumps::ping::ping_pump(
                write_tx.clone(),
                keepalive.ping_period,
                cancel.clone(),
            )));
        }

        Self {
            write_tx,
            events_rx,
            cancel,
            handles,
        }
    }

    /// Sender for outbound frames.
    pub(crate) fn writer(&self) -> mpsc::Sender<tungstenite::Message> {
        self.write_tx.clone()
    }

    /// Next event from the read pump. A vanished pump reads as a close.
    pub(crate) async fn next_event(&mut self) -> SocketEvent {
        self.events_rx
            .recv()
            .await
            .unwrap_or(SocketEvent::Closed(None))
    }

    /// Detaches the event channel, then closes the transport and waits for
    /// the pumps to finish.
    pub(crate) async fn shutdown(mut self) {
        self.events_rx.close();
        self.cancel.cancel();
        let handles = std::mem::take(&mut self.handles);
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let join = futures_util::future::join_all(handles);
        if tokio::time::timeout(SHUTDOWN_GRACE, join).await.is_err() {
            debug!("feed socket pumps did not stop in time, aborting");
            aborts.iter().for_each(|h| h.abort());
        }
    }
}

impl Drop for FeedSocket {
    fn drop(&mut self) {
        self.cancel.cancel();
        for handle in &self.handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_error_display() {
        assert_eq!(
            WsError::Unauthorized(401).to_string(),
            "feed rejected credentials (HTTP 401)"
        );
        let err = WsError::Ws(tungstenite::Error::ConnectionClosed);
        assert!(err.to_string().starts_with("WebSocket error"));
    }

    #[tokio::test]
    async fn handshake_401_is_unauthorized() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf).await;
            let _ = stream
                .write_all(b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\n\r\n")
                .await;
        });

        let url = Url::parse(&format!("ws://127.0.0.1:{port}/ws/logs?token=bad")).unwrap();
        let result = TungsteniteConnector::new(1024).connect(url).await;
        assert!(matches!(result, Err(WsError::Unauthorized(401))));
    }

    #[tokio::test]
    async fn shutdown_stops_pumps_and_closes_sink() {
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel::<tungstenite::Message>();
        let sink = futures_util::sink::unfold(sink_tx, |tx, msg: tungstenite::Message| async move {
            let _ = tx.send(msg);
            Ok::<_, tungstenite::Error>(tx)
        });
        let stream = futures_util::stream::pending::<
            Result<tungstenite::Message, tungstenite::Error>,
        >();

        let socket = FeedSocket::spawn(Box::pin(sink), Box::pin(stream), None, 1024);
        socket.shutdown().await;

        let mut saw_close = false;
        while let Ok(msg) = sink_rx.try_recv() {
            saw_close |= matches!(msg, tungstenite::Message::Close(_));
        }
        assert!(saw_close);
    }
}
