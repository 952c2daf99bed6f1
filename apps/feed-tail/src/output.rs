//! Plain-text rendering of feed frames.

use vaultdeck_protocol::{LogEntry, MetricsSnapshot};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

pub fn log_line(entry: &LogEntry) -> String {
    let ts = entry.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ");
    let level = entry.level.as_str().to_ascii_uppercase();
    if entry.source.is_empty() {
        format!("{ts} {level:<5} {}", entry.message)
    } else {
        format!("{ts} {level:<5} [{}] {}", entry.source, entry.message)
    }
}

pub fn metrics_line(snap: &MetricsSnapshot) -> String {
    let mut parts = vec![snap.timestamp.format("%H:%M:%S").to_string()];
    if let Some(cpu) = &snap.cpu {
        parts.push(format!("cpu {:.1}%", cpu.usage_percent));
    }
    if let Some(mem) = &snap.memory {
        parts.push(format!(
            "mem {:.1}/{:.1} GiB",
            mem.used_bytes as f64 / GIB,
            mem.total_bytes as f64 / GIB
        ));
    }
    for gpu in &snap.gpus {
        parts.push(format!("gpu{} {:.0}%", gpu.index, gpu.utilization_percent));
    }
    parts.join("  ")
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use vaultdeck_protocol::{CpuMetrics, GpuMetrics, LogLevel, MemoryMetrics};

    use super::*;

    #[test]
    fn log_line_with_and_without_source() {
        let mut entry = LogEntry {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            level: LogLevel::Warn,
            source: "trainer".into(),
            message: "loss spiked".into(),
        };
        assert_eq!(
            log_line(&entry),
            "2026-03-01T12:00:00.000Z WARN  [trainer] loss spiked"
        );

        entry.source.clear();
        entry.level = LogLevel::Error;
        assert_eq!(log_line(&entry), "2026-03-01T12:00:00.000Z ERROR loss spiked");
    }

    #[test]
    fn metrics_line_skips_missing_sections() {
        let mut snap = MetricsSnapshot {
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 8, 5, 9).unwrap(),
            cpu: None,
            memory: None,
            gpus: vec![],
        };
        assert_eq!(metrics_line(&snap), "08:05:09");

        snap.cpu = Some(CpuMetrics {
            usage_percent: 41.46,
            cores: 16,
            temp_celsius: None,
        });
        snap.memory = Some(MemoryMetrics {
            used_bytes: 8 * 1024 * 1024 * 1024,
            total_bytes: 32 * 1024 * 1024 * 1024,
        });
        snap.gpus.push(GpuMetrics {
            index: 0,
            name: "A100".into(),
            utilization_percent: 97.0,
            memory_used_bytes: 0,
            memory_total_bytes: 0,
            temp_celsius: None,
        });
        assert_eq!(
            metrics_line(&snap),
            "08:05:09  cpu 41.5%  mem 8.0/32.0 GiB  gpu0 97%"
        );
    }
}
