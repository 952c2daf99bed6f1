//! Keepalive pings for an idle feed.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Queues a ping every `period`, first one `period` after start.
///
/// A ping is skipped when the write queue is full: the peer is already
/// being sent data, which keeps the connection warm on its own.
pub(crate) async fn ping_pump(
    write_tx: mpsc::Sender<Message>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticks.tick() => match write_tx.try_send(Message::Ping(Default::default())) {
                Ok(()) => trace!("keepalive ping queued"),
                Err(TrySendError::Full(_)) => trace!("write queue busy, skipping ping"),
                Err(TrySendError::Closed(_)) => return,
            },
        }
    }
}
