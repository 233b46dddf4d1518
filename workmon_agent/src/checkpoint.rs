//! Durable checkpoint of a session and its sample sequence.
//!
//! Writes go to a temp file in the same directory which is fsynced and then
//! renamed over the canonical path, so a reader sees either the previous
//! checkpoint or the new one, never a torn file.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CheckpointError;
use crate::session::{MonitoringSession, Sample, SessionIdentity, SessionStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: String,
    pub session: SessionIdentity,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub last_checkpoint_time: Option<DateTime<Utc>>,
    pub planned_samples: u64,
    pub total_samples: u64,
    pub error_count: u64,
    pub samples: Vec<Sample>,
}

impl Checkpoint {
    pub fn from_session(session: &MonitoringSession) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            session: session.identity().clone(),
            status: session.status(),
            start_time: session.start_time(),
            last_checkpoint_time: session.last_checkpoint_time(),
            planned_samples: session.planned_sample_count(),
            total_samples: session.samples().len() as u64,
            error_count: session.error_count(),
            samples: session.samples().to_vec(),
        }
    }

    /// Structural checks run before a checkpoint may be resumed.
    pub fn validate(&self) -> Result<(), String> {
        let planned = self.session.planned_sample_count();
        if self.planned_samples != planned {
            return Err(format!(
                "planned_samples {} does not match session ({planned})",
                self.planned_samples
            ));
        }
        if self.samples.len() as u64 > planned {
            return Err(format!(
                "{} samples exceed the planned {planned}",
                self.samples.len()
            ));
        }
        if self.total_samples != self.samples.len() as u64 {
            return Err(format!(
                "total_samples {} but {} samples present",
                self.total_samples,
                self.samples.len()
            ));
        }
        let errors = self.samples.iter().filter(|s| s.is_error()).count() as u64;
        if self.error_count != errors {
            return Err(format!(
                "error_count {} but {errors} error samples present",
                self.error_count
            ));
        }
        let mut prev: Option<DateTime<Utc>> = None;
        for (pos, sample) in self.samples.iter().enumerate() {
            if sample.index != pos as u64 {
                return Err(format!("sample at position {pos} has index {}", sample.index));
            }
            match prev {
                None if sample.timestamp < self.start_time => {
                    return Err("first sample precedes start_time".to_string());
                }
                Some(p) if sample.timestamp <= p => {
                    return Err(format!("timestamp of sample {pos} is not after sample {}", pos - 1));
                }
                _ => {}
            }
            prev = Some(sample.timestamp);
        }
        Ok(())
    }

    /// Rebuild the in-memory session (back in INIT).
    pub fn into_session(self) -> MonitoringSession {
        MonitoringSession::rehydrate(
            self.session,
            self.start_time,
            self.last_checkpoint_time,
            self.samples,
        )
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<dir>/<output stem>_checkpoint.json`
    pub fn default_path_for(output: &Path) -> PathBuf {
        let stem = output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workload".to_string());
        output.with_file_name(format!("{stem}_checkpoint.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the session. Saving the same session twice yields identical bytes.
    pub fn save(&self, session: &MonitoringSession) -> Result<(), CheckpointError> {
        let checkpoint = Checkpoint::from_session(session);
        let data = serde_json::to_vec_pretty(&checkpoint)?;
        atomic_write(&self.path, &data).map_err(|source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(
            path = %self.path.display(),
            samples = checkpoint.total_samples,
            status = %checkpoint.status,
            "checkpoint saved"
        );
        Ok(())
    }

    /// `Ok(None)` when no checkpoint exists. Anything unreadable or
    /// inconsistent is `Corrupt` and left on disk untouched.
    pub fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let data = match fs::read(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let checkpoint: Checkpoint =
            serde_json::from_slice(&data).map_err(|e| self.corrupt(e.to_string()))?;
        checkpoint.validate().map_err(|reason| self.corrupt(reason))?;
        Ok(Some(checkpoint))
    }

    /// Remove the checkpoint. Only ever called on explicit operator request.
    pub fn discard(&self) -> Result<bool, CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(CheckpointError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn corrupt(&self, reason: String) -> CheckpointError {
        CheckpointError::Corrupt {
            path: self.path.clone(),
            reason,
        }
    }
}

/// Write `content` to `path` via temp file + fsync + rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".{name}.{}.tmp", std::process::id()));

    let mut file = File::create(&temp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    // make the rename itself durable where the platform allows it
    if let Ok(dir) = File::open(&parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::DemoSource;
    use crate::error::ErrorKind;
    use crate::session::AuthMode;
    use chrono::TimeZone;

    fn session_with(n: u64) -> MonitoringSession {
        let identity = SessionIdentity {
            target: "ws://db01:9400/ws".into(),
            auth: AuthMode::Credentialed {
                username: "monitor".into(),
            },
            duration_minutes: 60,
            interval_secs: 60,
        };
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
        let mut s = MonitoringSession::new(identity, t0);
        s.transition(SessionStatus::Running).unwrap();
        for i in 0..n {
            let ts = t0 + chrono::Duration::seconds(60 * i as i64);
            let sample = if i % 3 == 2 {
                Sample::error(i, ts, ErrorKind::Timeout, "no response within 30s")
            } else {
                Sample::success(i, ts, DemoSource::snapshot_at(i))
            };
            s.record(sample);
        }
        s.mark_checkpointed(t0 + chrono::Duration::seconds(60 * n as i64));
        s
    }

    #[test]
    fn save_then_load_restores_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("cp.json"));
        assert!(store.load().unwrap().is_none());

        let session = session_with(5);
        store.save(&session).unwrap();
        let cp = store.load().unwrap().expect("checkpoint present");
        assert_eq!(cp.total_samples, 5);
        assert_eq!(cp.error_count, 1);
        assert_eq!(cp.status, SessionStatus::Running);
        assert_eq!(cp.samples, session.samples());
    }

    #[test]
    fn saving_twice_is_indistinguishable_from_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("cp.json"));
        let session = session_with(4);
        store.save(&session).unwrap();
        let once = fs::read(store.path()).unwrap();
        store.save(&session).unwrap();
        let twice = fs::read(store.path()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn crash_before_rename_leaves_previous_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.json");
        let store = CheckpointStore::new(&path);
        store.save(&session_with(3)).unwrap();

        // a writer killed mid-write leaves only its temp file behind
        let next = serde_json::to_vec_pretty(&Checkpoint::from_session(&session_with(4))).unwrap();
        let temp = dir.path().join(format!(".cp.json.{}.tmp", std::process::id()));
        fs::write(&temp, &next[..next.len() / 2]).unwrap();

        let cp = store.load().unwrap().unwrap();
        assert_eq!(cp.total_samples, 3);

        // the next successful save replaces both
        store.save(&session_with(4)).unwrap();
        assert_eq!(store.load().unwrap().unwrap().total_samples, 4);
        assert!(!temp.exists());
    }

    #[test]
    fn out_of_order_timestamps_are_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.json");
        let mut cp = Checkpoint::from_session(&session_with(4));
        cp.samples.swap(1, 2);
        cp.samples[1].index = 1;
        cp.samples[2].index = 2;
        fs::write(&path, serde_json::to_vec(&cp).unwrap()).unwrap();

        let err = CheckpointStore::new(&path).load().unwrap_err();
        assert!(matches!(err, CheckpointError::Corrupt { .. }), "{err}");
        assert!(path.exists(), "corrupt checkpoint must stay on disk");
    }

    #[test]
    fn index_gaps_and_bad_counters_are_corrupt() {
        let mut gap = Checkpoint::from_session(&session_with(4));
        gap.samples.remove(1);
        gap.total_samples = 3;
        gap.error_count = 1;
        assert!(gap.validate().unwrap_err().contains("index"));

        let mut counted = Checkpoint::from_session(&session_with(4));
        counted.error_count = 0;
        assert!(counted.validate().unwrap_err().contains("error_count"));
    }

    #[test]
    fn truncated_file_is_corrupt_not_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.json");
        fs::write(&path, b"{\"version\": \"0.1.0\", \"samp").unwrap();
        assert!(matches!(
            CheckpointStore::new(&path).load(),
            Err(CheckpointError::Corrupt { .. })
        ));
    }

    #[test]
    fn unknown_fields_do_not_break_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp.json");
        let mut v = serde_json::to_value(Checkpoint::from_session(&session_with(2))).unwrap();
        v["written_by"] = serde_json::json!("a newer agent");
        v["samples"][0]["host_tags"] = serde_json::json!(["prod"]);
        fs::write(&path, serde_json::to_vec(&v).unwrap()).unwrap();
        assert!(CheckpointStore::new(&path).load().unwrap().is_some());
    }

    #[test]
    fn default_path_sits_beside_output() {
        let p = CheckpointStore::default_path_for(Path::new("/data/run/sql_workload.json"));
        assert_eq!(p, Path::new("/data/run/sql_workload_checkpoint.json"));
    }
}
