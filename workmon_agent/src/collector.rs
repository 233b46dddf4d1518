//! Snapshot collector: one bounded call into the metric source, always yielding a `Sample`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::ErrorKind;
use crate::session::Sample;
use crate::source::MetricSource;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct Collector {
    timeout: Duration,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Collector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one acquisition stamped with `timestamp`. Failures come back as ERROR
    /// samples; this never returns an error of its own.
    pub async fn collect<S: MetricSource>(
        &self,
        source: &mut S,
        index: u64,
        timestamp: DateTime<Utc>,
    ) -> Sample {
        let outcome = tokio::time::timeout(self.timeout, source.fetch()).await;
        match outcome {
            Ok(Ok(snapshot)) => Sample::success(index, timestamp, snapshot),
            Ok(Err(e)) => Sample::error(index, timestamp, e.kind(), e.to_string()),
            Err(_) => {
                // the dropped future may have left a half-read connection behind
                source.abandon();
                debug!(endpoint = %source.describe(), "acquisition abandoned after timeout");
                Sample::error(
                    index,
                    timestamp,
                    ErrorKind::Timeout,
                    format!("no response within {}s", self.timeout.as_secs_f32()),
                )
            }
        }
    }
}
