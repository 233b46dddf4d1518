//! Final output document handed to downstream reporting.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::checkpoint::atomic_write;
use crate::error::CheckpointError;
use crate::session::{AuthMode, MonitoringSession, Sample};

#[derive(Debug, Serialize)]
pub struct OutputMetadata<'a> {
    pub version: &'static str,
    pub target: &'a str,
    pub auth: &'a AuthMode,
    pub duration_minutes: u64,
    pub interval_secs: u64,
    pub total_samples: u64,
    pub error_count: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OutputDocument<'a> {
    pub metadata: OutputMetadata<'a>,
    pub samples: &'a [Sample],
}

impl<'a> OutputDocument<'a> {
    pub fn new(session: &'a MonitoringSession, end_time: DateTime<Utc>) -> Self {
        let identity = session.identity();
        Self {
            metadata: OutputMetadata {
                version: env!("CARGO_PKG_VERSION"),
                target: &identity.target,
                auth: &identity.auth,
                duration_minutes: identity.duration_minutes,
                interval_secs: identity.interval_secs,
                total_samples: session.samples().len() as u64,
                error_count: session.error_count(),
                start_time: session.start_time(),
                end_time,
            },
            samples: session.samples(),
        }
    }
}

pub fn write_output(
    path: &Path,
    session: &MonitoringSession,
    end_time: DateTime<Utc>,
) -> Result<(), CheckpointError> {
    let data = serde_json::to_vec_pretty(&OutputDocument::new(session, end_time))?;
    atomic_write(path, &data).map_err(|source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    })
}
