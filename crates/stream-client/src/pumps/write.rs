//! Write pump: the only task that touches the socket's sink.

use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

/// Frames taken off the queue per flush.
const BATCH: usize = 32;

/// Drains queued frames into `sink`, flushing once per batch.
///
/// Ends when cancelled or when every sender is gone, and says goodbye with
/// a normal close frame. A failed write ends the pump without one.
pub(crate) async fn write_pump<S>(
    mut sink: S,
    mut frames: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let mut batch = Vec::with_capacity(BATCH);
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => 0,
            n = frames.recv_many(&mut batch, BATCH) => n,
        };
        if received == 0 {
            break;
        }
        if let Err(e) = write_batch(&mut sink, &mut batch).await {
            warn!("feed write error: {e}");
            return;
        }
    }

    let goodbye = CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    };
    if let Err(e) = sink.send(Message::Close(Some(goodbye))).await {
        trace!("close frame not sent: {e}");
    }
}

async fn write_batch<S>(sink: &mut S, batch: &mut Vec<Message>) -> Result<(), tungstenite::Error>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    for frame in batch.drain(..) {
        sink.feed(frame).await?;
    }
    sink.flush().await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::sink;

    use super::*;

    fn channel_sink(
        tx: mpsc::UnboundedSender<Message>,
    ) -> impl Sink<Message, Error = tungstenite::Error> + Unpin {
        Box::pin(sink::unfold(tx, |tx, msg: Message| async move {
            let _ = tx.send(msg);
            Ok::<_, tungstenite::Error>(tx)
        }))
    }

    #[tokio::test]
    async fn forwards_frames_in_order_then_closes_normally() {
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let (write_tx, write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(write_pump(channel_sink(sink_tx), write_rx, cancel.clone()));

        write_tx
            .send(Message::Binary(b"ls\n".to_vec().into()))
            .await
            .unwrap();
        write_tx.send(Message::Text("{}".into())).await.unwrap();

        assert!(matches!(sink_rx.recv().await, Some(Message::Binary(_))));
        assert!(matches!(sink_rx.recv().await, Some(Message::Text(_))));

        cancel.cancel();
        handle.await.unwrap();
        match sink_rx.recv().await {
            Some(Message::Close(Some(frame))) => assert_eq!(frame.code, CloseCode::Normal),
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stops_when_writers_are_gone() {
        let (sink_tx, mut sink_rx) = mpsc::unbounded_channel();
        let (write_tx, write_rx) = mpsc::channel::<Message>(16);
        write_tx.send(Message::Text("last".into())).await.unwrap();
        drop(write_tx);

        write_pump(channel_sink(sink_tx), write_rx, CancellationToken::new()).await;
        assert!(matches!(sink_rx.recv().await, Some(Message::Text(_))));
        assert!(matches!(sink_rx.recv().await, Some(Message::Close(_))));
    }

    #[tokio::test]
    async fn failed_write_skips_close() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counted = attempts.clone();
        let broken = Box::pin(sink::unfold((), move |(), _msg: Message| {
            counted.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(tungstenite::Error::ConnectionClosed) }
        }));
        let (write_tx, write_rx) = mpsc::channel(16);
        write_tx.send(Message::Text("x".into())).await.unwrap();

        write_pump(broken, write_rx, CancellationToken::new()).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
