//! Synthetic source for `--demo`: a deterministic workload with growing counters.
//! The workload is keyed by sample index, so counters keep growing across a resume.

use crate::error::SourceError;
use crate::source::MetricSource;
use crate::types::{
    ActivityMetrics, CpuMetrics, IoMetrics, MemoryMetrics, MetricsSnapshot, WaitMetrics,
};

const WAITS: [&str; 3] = ["PAGEIOLATCH_SH", "CXPACKET", "WRITELOG"];

#[derive(Debug, Default)]
pub struct DemoSource {
    calls: u64,
}

impl DemoSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot for the `n`th call; same `n`, same snapshot.
    pub fn snapshot_at(n: u64) -> MetricsSnapshot {
        // 0..=10 triangle wave for gauges
        let wave = (n % 20).abs_diff(10) as f64;
        MetricsSnapshot {
            cpu: CpuMetrics {
                total_cpus: 8,
                sql_server_cpu_time_ms: 1_000.0 * n as f64 + 250.0 * wave,
            },
            memory: MemoryMetrics {
                total_mb: 32_768,
                committed_mb: 20_480 + 64 * wave as u64,
                target_mb: 24_576,
                buffer_pool_mb: 16_384 + 128 * wave as u64,
            },
            activity: ActivityMetrics {
                batch_requests_per_sec: 200.0 + 15.0 * wave,
                compilations_per_sec: 10.0 + wave,
                user_connections: 40 + wave as u64,
            },
            io: IoMetrics {
                total_reads: 10_000 * (n + 1),
                total_writes: 4_000 * (n + 1),
                total_read_latency_ms: 35.0 * (n + 1) as f64,
                total_write_latency_ms: 12.5 * (n + 1) as f64,
                total_bytes_read: 8_192 * 10_000 * (n + 1),
                total_bytes_written: 8_192 * 4_000 * (n + 1),
            },
            waits: WaitMetrics {
                top_wait_type: WAITS[(n / 10 % 3) as usize].to_string(),
                top_wait_time_ms: 500.0 * (n + 1) as f64,
            },
        }
    }
}

impl MetricSource for DemoSource {
    async fn fetch(&mut self) -> Result<MetricsSnapshot, SourceError> {
        let snap = Self::snapshot_at(self.calls);
        self.calls += 1;
        Ok(snap)
    }

    fn resume_at(&mut self, next_index: u64) {
        self.calls = next_index;
    }

    fn describe(&self) -> String {
        "demo".to_string()
    }
}
