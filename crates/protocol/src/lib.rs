//! Wire types shared by the VaultDeck live-feed client and the console gateway.

pub mod constants;
pub mod error_body;
pub mod logs;
pub mod metrics;
pub mod terminal;

pub use error_body::ErrorBody;
pub use logs::{LogEntry, LogFeedMessage, LogLevel};
pub use metrics::{CpuMetrics, GpuMetrics, MemoryMetrics, MetricsFeedMessage, MetricsSnapshot};
pub use terminal::{TerminalControl, TerminalFrame};
