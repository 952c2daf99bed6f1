//! Read pump: forwards inbound frames to the connection.

use std::pin::Pin;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::socket::SocketEvent;

/// Reads frames from the socket and forwards data frames and the final
/// close as [`SocketEvent`]s.
///
/// With a `pong_wait`, any inbound frame resets a read deadline; if nothing
/// arrives in time the socket is considered dead and reported closed.
pub(crate) async fn read_pump<S>(
    mut read: S,
    events_tx: mpsc::Sender<SocketEvent>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    pong_wait: Option<Duration>,
    max_message_size: usize,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let mut deadline: Option<Pin<Box<Sleep>>> = pong_wait.map(|w| Box::pin(tokio::time::sleep(w)));
    let mut close_code = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,

            () = expire(&mut deadline) => {
                warn!("feed read deadline expired, closing");
                break;
            }

            msg = read.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        debug!("feed read error: {e}");
                        break;
                    }
                    None => {
                        debug!("feed stream ended");
                        break;
                    }
                };

                if let (Some(wait), Some(sleep)) = (pong_wait, deadline.as_mut()) {
                    sleep.as_mut().reset(Instant::now() + wait);
                }

                match msg {
                    tungstenite::Message::Text(_) | tungstenite::Message::Binary(_) => {
                        if msg.len() > max_message_size {
                            warn!(len = msg.len(), "feed frame too large, dropping");
                            continue;
                        }
                        if events_tx.send(SocketEvent::Frame(msg)).await.is_err() {
                            // Connection detached.
                            return;
                        }
                    }
                    tungstenite::Message::Ping(data) => {
                        trace!("received ping, sending pong");
                        let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                    }
                    tungstenite::Message::Pong(_) => {
                        trace!("received pong");
                    }
                    tungstenite::Message::Close(frame) => {
                        close_code = frame.map(|f| u16::from(f.code));
                        debug!(code = ?close_code, "received close frame");
                        break;
                    }
                    tungstenite::Message::Frame(_) => {}
                }
            }
        }
    }

    let _ = events_tx.send(SocketEvent::Closed(close_code)).await;
}

async fn expire(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
