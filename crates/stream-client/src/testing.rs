//! In-process transport for connection tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use url::Url;

use crate::socket::{Connector, WsError, WsSink, WsStream};

/// Scripted outcome of one dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dial {
    Accept,
    Fail,
    Unauthorized,
    /// Handshake never completes.
    Hang,
}

/// Server side of an accepted mock socket.
pub(crate) struct MockPeer {
    to_client: mpsc::UnboundedSender<Result<tungstenite::Message, tungstenite::Error>>,
    pub(crate) from_client: mpsc::UnboundedReceiver<tungstenite::Message>,
}

impl MockPeer {
    pub(crate) fn send_text(&self, text: &str) {
        let _ = self
            .to_client
            .send(Ok(tungstenite::Message::Text(text.to_string().into())));
    }

    pub(crate) fn close(&self, code: u16) {
        let _ = self
            .to_client
            .send(Ok(tungstenite::Message::Close(Some(CloseFrame {
                code: code.into(),
                reason: "".into(),
            }))));
    }

    /// Ends the client's stream without a close frame.
    pub(crate) fn drop_connection(self) {}
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub(crate) struct MockConnector {
    script: Arc<Mutex<VecDeque<Dial>>>,
    fallback: Dial,
    urls: Arc<Mutex<Vec<Url>>>,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    peers_tx: mpsc::UnboundedSender<MockPeer>,
}

impl MockConnector {
    /// Returns the connector and the queue of accepted peers.
    pub(crate) fn new(
        script: impl IntoIterator<Item = Dial>,
        fallback: Dial,
    ) -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        let connector = Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            fallback,
            urls: Arc::new(Mutex::new(Vec::new())),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
            peers_tx,
        };
        (connector, peers_rx)
    }

    pub(crate) fn attempts(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.to_string())
            .collect()
    }

    /// Sockets whose read half is still alive.
    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub(crate) fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn connect(&self, url: Url) -> BoxFuture<'static, Result<(WsSink, WsStream), WsError>> {
        self.urls.lock().unwrap().push(url);
        let dial = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);
        let live = self.live.clone();
        let max_live = self.max_live.clone();
        let peers_tx = self.peers_tx.clone();

        Box::pin(async move {
            match dial {
                Dial::Fail => Err(WsError::Ws(tungstenite::Error::ConnectionClosed)),
                Dial::Unauthorized => Err(WsError::Unauthorized(401)),
                Dial::Hang => std::future::pending().await,
                Dial::Accept => {
                    let (to_client, client_rx) = mpsc::unbounded_channel();
                    let (client_tx, from_client) = mpsc::unbounded_channel();

                    let n = live.fetch_add(1, Ordering::SeqCst) + 1;
                    max_live.fetch_max(n, Ordering::SeqCst);
                    let guard = LiveGuard(live);

                    let stream = futures_util::stream::unfold(
                        (client_rx, guard),
                        |(mut rx, guard)| async move {
                            rx.recv().await.map(|item| (item, (rx, guard)))
                        },
                    );
                    let sink = futures_util::sink::unfold(
                        client_tx,
                        |tx, msg: tungstenite::Message| async move {
                            let _ = tx.send(msg);
                            Ok::<_, tungstenite::Error>(tx)
                        },
                    );

                    let _ = peers_tx.send(MockPeer {
                        to_client,
                        from_client,
                    });
                    Ok((Box::pin(sink) as WsSink, Box::pin(stream) as WsStream))
                }
            }
        })
    }
}
