//! Live feeds built on [`vaultdeck_stream_client::StreamClient`]: a
//! buffered log tail, a latest-value metrics view and a terminal bridge.

pub mod buffer;
pub mod logs;
pub mod metrics;
pub mod terminal;

#[cfg(test)]
mod test_server;

pub use buffer::RingBuffer;
pub use logs::{LogFilter, LogTail, LogTailState};
pub use metrics::{MetricsState, MetricsTail};
pub use terminal::{TerminalEvent, TerminalSession};
