//! Read-only status of a checkpoint: progress, success rate and per-field statistics.
//!
//! Everything is derived by re-scanning the sample sequence; stored counters
//! are not trusted.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::StatusError;
use crate::history::{push_capped, FieldAccumulator, FieldStats};
use crate::types::{Checkpoint, Sample};

pub const RECENT_SAMPLES: usize = 5;
/// A running session whose checkpoint is older than this is flagged stale.
pub const STALE_AFTER_SECS: i64 = 300;

const READ_ATTEMPTS: u32 = 5;
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub target: String,
    pub auth: String,
    pub status: String,
    pub duration_minutes: u64,
    pub interval_secs: u64,
    pub start_time: DateTime<Utc>,
    pub last_checkpoint_time: Option<DateTime<Utc>>,
    pub elapsed: chrono::Duration,
    pub since_checkpoint: Option<chrono::Duration>,
    pub taken: u64,
    pub planned: u64,
    pub remaining: u64,
    pub successes: u64,
    pub errors: u64,
    /// Percent of samples that succeeded; `None` until one exists.
    pub success_rate: Option<f64>,
    pub errors_by_kind: BTreeMap<String, u64>,
    pub fields: Vec<FieldStats>,
    pub recent: Vec<Sample>,
    pub stale: bool,
}

/// Read the latest checkpoint. A file briefly missing while the writer renames
/// over it is retried a few times before giving up.
pub async fn read_checkpoint(path: &Path) -> Result<Checkpoint, StatusError> {
    let mut attempt = 1;
    let data = loop {
        match tokio::fs::read(path).await {
            Ok(d) => break d,
            Err(e) if is_transient(&e) && attempt < READ_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(READ_RETRY_DELAY).await;
            }
            Err(source) => {
                return Err(StatusError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    };
    serde_json::from_slice(&data).map_err(|source| StatusError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
    )
}

pub fn compute_status(cp: &Checkpoint, now: DateTime<Utc>) -> StatusReport {
    let running = matches!(cp.status.as_str(), "RUNNING" | "INIT");
    let planned = cp.planned();
    let taken = cp.samples.len() as u64;

    let mut successes = 0u64;
    let mut errors_by_kind: BTreeMap<String, u64> = BTreeMap::new();
    let mut acc: BTreeMap<(String, String), FieldAccumulator> = BTreeMap::new();
    let mut recent = VecDeque::with_capacity(RECENT_SAMPLES);

    for sample in &cp.samples {
        push_capped(&mut recent, sample.clone(), RECENT_SAMPLES);
        let Some(snapshot) = sample.snapshot.as_ref().filter(|_| sample.is_success()) else {
            let kind = sample.error_kind.clone().unwrap_or_else(|| "unknown".into());
            *errors_by_kind.entry(kind).or_default() += 1;
            continue;
        };
        successes += 1;
        for (category, fields) in snapshot {
            for (field, value) in fields {
                let Some(v) = value.as_f64() else { continue };
                acc.entry((category.clone(), field.clone()))
                    .and_modify(|a| a.push(v, sample.timestamp))
                    .or_insert_with(|| FieldAccumulator::new(v, sample.timestamp));
            }
        }
    }
    let errors = taken - successes;

    // a finished session's clock stops at its last checkpoint
    let end = if running {
        now
    } else {
        cp.last_checkpoint_time.unwrap_or(now)
    };
    let since_checkpoint = cp.last_checkpoint_time.map(|t| now - t);
    let stale = running
        && since_checkpoint
            .map(|d| d.num_seconds() > STALE_AFTER_SECS)
            .unwrap_or(false);

    StatusReport {
        target: cp.session.target.clone(),
        auth: match &cp.session.auth.username {
            Some(user) => format!("{} ({user})", cp.session.auth.mode),
            None => cp.session.auth.mode.clone(),
        },
        status: cp.status.clone(),
        duration_minutes: cp.session.duration_minutes,
        interval_secs: cp.session.interval_secs,
        start_time: cp.start_time,
        last_checkpoint_time: cp.last_checkpoint_time,
        elapsed: end - cp.start_time,
        since_checkpoint,
        taken,
        planned,
        remaining: planned.saturating_sub(taken),
        successes,
        errors,
        success_rate: (taken > 0).then(|| successes as f64 * 100.0 / taken as f64),
        errors_by_kind,
        fields: acc.iter().map(|((c, f), a)| a.finish(c, f)).collect(),
        recent: recent.into_iter().collect(),
        stale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn ok(index: u64, at: i64, cpu_ms: f64, conns: u64) -> serde_json::Value {
        json!({
            "index": index,
            "timestamp": t(at),
            "outcome": "success",
            "snapshot": {
                "cpu": {"total_cpus": 8, "sql_server_cpu_time_ms": cpu_ms},
                "activity": {"user_connections": conns},
                "waits": {"top_wait_type": "CXPACKET", "top_wait_time_ms": 10.0}
            }
        })
    }

    fn err(index: u64, at: i64, kind: &str) -> serde_json::Value {
        json!({
            "index": index,
            "timestamp": t(at),
            "outcome": "error",
            "error_kind": kind,
            "message": "boom"
        })
    }

    fn checkpoint(status: &str, samples: Vec<serde_json::Value>, cp_at: i64) -> Checkpoint {
        serde_json::from_value(json!({
            "version": "0.1.0",
            "session": {
                "target": "ws://db01:9400/ws",
                "auth": {"mode": "credentialed", "username": "monitor"},
                "duration_minutes": 10,
                "interval_secs": 60
            },
            "status": status,
            "start_time": t(0),
            "last_checkpoint_time": t(cp_at),
            "planned_samples": 10,
            "total_samples": samples.len(),
            "error_count": 0,
            "samples": samples,
            "some_future_field": {"nested": true}
        }))
        .unwrap()
    }

    #[test]
    fn derives_counts_rates_and_peaks() {
        let cp = checkpoint(
            "RUNNING",
            vec![
                ok(0, 0, 100.0, 10),
                err(1, 60, "timeout"),
                ok(2, 120, 400.0, 30),
                ok(3, 180, 400.0, 20),
            ],
            180,
        );
        let r = compute_status(&cp, t(200));
        assert_eq!((r.taken, r.planned, r.remaining), (4, 10, 6));
        assert_eq!((r.successes, r.errors), (3, 1));
        assert_eq!(r.success_rate, Some(75.0));
        assert_eq!(r.errors_by_kind.get("timeout"), Some(&1));
        assert_eq!(r.elapsed.num_seconds(), 200);
        assert_eq!(r.since_checkpoint.unwrap().num_seconds(), 20);
        assert!(!r.stale);
        assert_eq!(r.auth, "credentialed (monitor)");

        let cpu = r
            .fields
            .iter()
            .find(|f| f.field == "sql_server_cpu_time_ms")
            .unwrap();
        assert_eq!(cpu.avg, 300.0);
        assert_eq!(cpu.peak, 400.0);
        assert_eq!(cpu.peak_at, t(120));
        // strings are not statistics
        assert!(r.fields.iter().all(|f| f.field != "top_wait_type"));
    }

    #[test]
    fn recent_window_holds_the_last_five() {
        let samples = (0..8).map(|i| ok(i, i as i64 * 60, 1.0, 1)).collect();
        let r = compute_status(&checkpoint("RUNNING", samples, 420), t(430));
        let idx: Vec<u64> = r.recent.iter().map(|s| s.index).collect();
        assert_eq!(idx, vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn stale_only_while_running() {
        let running = checkpoint("RUNNING", vec![ok(0, 0, 1.0, 1)], 0);
        assert!(!compute_status(&running, t(STALE_AFTER_SECS)).stale);
        assert!(compute_status(&running, t(STALE_AFTER_SECS + 1)).stale);

        let done = checkpoint("COMPLETED", vec![ok(0, 0, 1.0, 1)], 60);
        let r = compute_status(&done, t(86_400));
        assert!(!r.stale);
        assert_eq!(r.elapsed.num_seconds(), 60);
    }

    #[test]
    fn empty_checkpoint_has_no_rate() {
        let r = compute_status(&checkpoint("RUNNING", vec![], 0), t(5));
        assert_eq!(r.success_rate, None);
        assert!(r.fields.is_empty());
        assert_eq!(r.remaining, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_file_is_retried_then_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.json");
        let started = tokio::time::Instant::now();
        let err = read_checkpoint(&path).await.unwrap_err();
        assert!(matches!(err, StatusError::Io { .. }));
        assert_eq!(started.elapsed(), READ_RETRY_DELAY * (READ_ATTEMPTS - 1));
    }

    #[tokio::test(start_paused = true)]
    async fn file_reappearing_during_replace_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.json");
        let doc = serde_json::to_vec(&json!({
            "session": {"target": "demo", "duration_minutes": 1, "interval_secs": 60},
            "status": "RUNNING",
            "start_time": t(0),
        }))
        .unwrap();

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            std::fs::write(writer_path, doc).unwrap();
        });
        let cp = read_checkpoint(&path).await.unwrap();
        writer.await.unwrap();
        assert_eq!(cp.session.target, "demo");
        assert_eq!(cp.planned(), 1);
        assert!(cp.samples.is_empty());
    }
}
