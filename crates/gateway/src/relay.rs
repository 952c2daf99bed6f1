//! Cancellation and deadline plumbing for one proxied request.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::{FutureExt, Stream};
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

/// Why a request stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    /// The inbound side went away.
    Cancelled,
    /// The wall-clock budget ran out.
    Deadline,
}

/// Resolves when `cancel` fires or `deadline` passes, whichever is first.
/// The deadline fires `cancel` too, so everything sharing the token stops.
pub fn stop_signal(cancel: CancellationToken, deadline: Instant) -> BoxFuture<'static, Stop> {
    async move {
        tokio::select! {
            _ = cancel.cancelled() => Stop::Cancelled,
            _ = tokio::time::sleep_until(deadline) => {
                cancel.cancel();
                Stop::Deadline
            }
        }
    }
    .boxed()
}

/// Response body stream that stops early on the request's stop signal.
///
/// A deadline mid-body surfaces as a `TimedOut` error so the client sees a
/// truncated response rather than a clean end. Holds the request's drop guard, so dropping the body (the client went
/// away) cancels the request token.
pub struct Relay<S> {
    inner: S,
    stop: BoxFuture<'static, Stop>,
    done: bool,
    _guard: DropGuard,
}

impl<S> Relay<S> {
    pub fn new(inner: S, stop: BoxFuture<'static, Stop>, guard: DropGuard) -> Self {
        Self {
            inner,
            stop,
            done: false,
            _guard: guard,
        }
    }
}

impl<S, E> Stream for Relay<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        if let Poll::Ready(stop) = self.stop.as_mut().poll(cx) {
            self.done = true;
            return match stop {
                Stop::Deadline => {
                    warn!("proxy deadline reached mid-body, aborting response");
                    Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "proxy deadline reached",
                    ))))
                }
                Stop::Cancelled => {
                    debug!("proxy relay cancelled");
                    Poll::Ready(None)
                }
            };
        }
        match Pin::new(&mut self.inner).poll_next(cx) {
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(chunk.map_err(io::Error::other))),
            Poll::Pending => Poll::Pending,
        }
    }
}
