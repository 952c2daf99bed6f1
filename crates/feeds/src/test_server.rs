//! Loopback WebSocket server for feed tests.

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use vaultdeck_stream_client::{ClientConfig, Origin};

pub(crate) struct TestServer {
    port: u16,
    conns: mpsc::UnboundedReceiver<(String, WebSocketStream<TcpStream>)>,
}

impl TestServer {
    pub(crate) fn config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(Origin::new(false, format!("127.0.0.1:{}", self.port)));
        config.keepalive = None;
        config
    }

    /// Next accepted socket with the request path and query it was opened on.
    pub(crate) async fn accept(&mut self) -> (String, WebSocketStream<TcpStream>) {
        tokio::time::timeout(std::time::Duration::from_secs(5), self.conns.recv())
            .await
            .expect("no connection within 5s")
            .expect("server stopped")
    }
}

pub(crate) async fn serve() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, conns) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let mut path = String::new();
            let callback = |req: &Request, resp: Response| {
                path = req.uri().to_string();
                Ok::<_, ErrorResponse>(resp)
            };
            let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                continue;
            };
            if tx.send((path, ws)).is_err() {
                break;
            }
        }
    });

    TestServer { port, conns }
}
