//! Retry bookkeeping for a single connection.
//!
//! [`Backoff`] holds the retry counter and turns each unexpected
//! termination into either a scheduled retry or a stop.

use std::time::Duration;

use crate::types::ReconnectConfig;

/// Why a socket (or a connect attempt) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Termination {
    /// The peer sent a close frame with this code.
    Closed(u16),
    /// The handshake was refused for bad credentials.
    Unauthorized,
    /// Transport error, dead socket, or stream end without a close frame.
    Lost,
}

/// Outcome of a termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    /// Go to `Disconnected`; no timer.
    Stop,
    /// Schedule retry number `attempt` after `delay`.
    Retry { attempt: u32, delay: Duration },
}

#[derive(Debug, Default)]
pub(crate) struct Backoff {
    retry_count: u32,
}

impl Backoff {
    /// Successful handshake or explicit reconnect.
    pub(crate) fn reset(&mut self) {
        self.retry_count = 0;
    }

    /// Explicit disconnect: no automatic retry until the next reset.
    pub(crate) fn exhaust(&mut self, config: &ReconnectConfig) {
        self.retry_count = config.max_retries;
    }

    pub(crate) fn on_termination(
        &mut self,
        config: &ReconnectConfig,
        termination: Termination,
    ) -> RetryDecision {
        match termination {
            Termination::Unauthorized => return RetryDecision::Stop,
            Termination::Closed(code) if config.is_terminal(code) => return RetryDecision::Stop,
            _ => {}
        }
        if self.retry_count >= config.max_retries {
            return RetryDecision::Stop;
        }
        let delay = config.delay_for_retry(self.retry_count);
        self.retry_count += 1;
        RetryDecision::Retry {
            attempt: self.retry_count,
            delay,
        }
    }
}
