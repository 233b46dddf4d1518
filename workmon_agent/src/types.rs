//! Snapshot types returned by the metric source and persisted in checkpoints.
//! Keep this module minimal and stable: it defines the wire format.
//!
//! Numeric fields are stored exactly as the source reports them. Counters such as
//! `total_reads` are cumulative since server start; consumers diff them.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    pub total_cpus: u32,
    // cumulative
    pub sql_server_cpu_time_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub total_mb: u64,
    pub committed_mb: u64,
    pub target_mb: u64,
    pub buffer_pool_mb: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityMetrics {
    pub batch_requests_per_sec: f64,
    pub compilations_per_sec: f64,
    pub user_connections: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoMetrics {
    // cumulative totals; downstream analysis diffs to get rates
    pub total_reads: u64,
    pub total_writes: u64,
    pub total_read_latency_ms: f64,
    pub total_write_latency_ms: f64,
    pub total_bytes_read: u64,
    pub total_bytes_written: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitMetrics {
    pub top_wait_type: String,
    pub top_wait_time_ms: f64,
}

/// Payload of one successful acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    pub activity: ActivityMetrics,
    pub io: IoMetrics,
    pub waits: WaitMetrics,
}

impl MetricsSnapshot {
    /// Every numeric field as `("category.field", value)`, in wire order.
    pub fn numeric_fields(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("cpu.total_cpus", self.cpu.total_cpus as f64),
            ("cpu.sql_server_cpu_time_ms", self.cpu.sql_server_cpu_time_ms),
            ("memory.total_mb", self.memory.total_mb as f64),
            ("memory.committed_mb", self.memory.committed_mb as f64),
            ("memory.target_mb", self.memory.target_mb as f64),
            ("memory.buffer_pool_mb", self.memory.buffer_pool_mb as f64),
            (
                "activity.batch_requests_per_sec",
                self.activity.batch_requests_per_sec,
            ),
            (
                "activity.compilations_per_sec",
                self.activity.compilations_per_sec,
            ),
            (
                "activity.user_connections",
                self.activity.user_connections as f64,
            ),
            ("io.total_reads", self.io.total_reads as f64),
            ("io.total_writes", self.io.total_writes as f64),
            ("io.total_read_latency_ms", self.io.total_read_latency_ms),
            ("io.total_write_latency_ms", self.io.total_write_latency_ms),
            ("io.total_bytes_read", self.io.total_bytes_read as f64),
            ("io.total_bytes_written", self.io.total_bytes_written as f64),
            ("waits.top_wait_time_ms", self.waits.top_wait_time_ms),
        ]
    }
}
