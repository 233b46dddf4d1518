//! Session state: identity, status machine, and the ordered sample sequence.
//!
//! A `MonitoringSession` is owned by the scheduler for the lifetime of a run.
//! All counters live here; nothing about a session is global.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SessionError};
use crate::types::MetricsSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Init,
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl SessionStatus {
    /// COMPLETED and FAILED close a session for good; INTERRUPTED can be resumed.
    pub fn is_finished(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    fn can_move_to(self, to: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, to),
            (Init, Running) | (Running, Completed) | (Running, Failed) | (Running, Interrupted)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Init => "INIT",
            SessionStatus::Running => "RUNNING",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Interrupted => "INTERRUPTED",
            SessionStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// How the engine authenticates to the target. Secrets are never part of this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AuthMode {
    Trusted,
    Credentialed { username: String },
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Trusted => f.write_str("trusted"),
            AuthMode::Credentialed { username } => write!(f, "credentialed as {username}"),
        }
    }
}

/// What makes two runs "the same session" for resume purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub target: String,
    pub auth: AuthMode,
    pub duration_minutes: u64,
    pub interval_secs: u64,
}

impl SessionIdentity {
    /// `ceil(duration / interval)`.
    pub fn planned_sample_count(&self) -> u64 {
        let total_secs = self.duration_minutes.saturating_mul(60);
        let interval = self.interval_secs.max(1);
        total_secs.div_ceil(interval)
    }

    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.interval_secs as i64)
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {}m every {}s)",
            self.target, self.auth, self.duration_minutes, self.interval_secs
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        snapshot: MetricsSnapshot,
    },
    Error {
        error_kind: ErrorKind,
        message: String,
    },
}

/// One acquisition attempt. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub index: u64,
    /// Acquisition start time.
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Sample {
    pub fn success(index: u64, timestamp: DateTime<Utc>, snapshot: MetricsSnapshot) -> Self {
        Self {
            index,
            timestamp,
            outcome: Outcome::Success { snapshot },
        }
    }

    pub fn error(
        index: u64,
        timestamp: DateTime<Utc>,
        error_kind: ErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            index,
            timestamp,
            outcome: Outcome::Error {
                error_kind,
                message: message.into(),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            Outcome::Error { error_kind, .. } => Some(*error_kind),
            Outcome::Success { .. } => None,
        }
    }

    pub fn snapshot(&self) -> Option<&MetricsSnapshot> {
        match &self.outcome {
            Outcome::Success { snapshot } => Some(snapshot),
            Outcome::Error { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitoringSession {
    identity: SessionIdentity,
    status: SessionStatus,
    start_time: DateTime<Utc>,
    last_checkpoint_time: Option<DateTime<Utc>>,
    samples: Vec<Sample>,
    error_count: u64,
    consecutive_errors: u32,
}

impl MonitoringSession {
    pub fn new(identity: SessionIdentity, start_time: DateTime<Utc>) -> Self {
        Self {
            identity,
            status: SessionStatus::Init,
            start_time,
            last_checkpoint_time: None,
            samples: Vec::new(),
            error_count: 0,
            consecutive_errors: 0,
        }
    }

    /// Rebuild a session from persisted samples. The result is back in INIT;
    /// counters are recomputed from the sequence rather than trusted.
    pub fn rehydrate(
        identity: SessionIdentity,
        start_time: DateTime<Utc>,
        last_checkpoint_time: Option<DateTime<Utc>>,
        samples: Vec<Sample>,
    ) -> Self {
        let error_count = samples.iter().filter(|s| s.is_error()).count() as u64;
        let consecutive_errors = samples.iter().rev().take_while(|s| s.is_error()).count() as u32;
        Self {
            identity,
            status: SessionStatus::Init,
            start_time,
            last_checkpoint_time,
            samples,
            error_count,
            consecutive_errors,
        }
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn last_checkpoint_time(&self) -> Option<DateTime<Utc>> {
        self.last_checkpoint_time
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn planned_sample_count(&self) -> u64 {
        self.identity.planned_sample_count()
    }

    pub fn next_index(&self) -> u64 {
        self.samples.len() as u64
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.samples.last().map(|s| s.timestamp)
    }

    pub fn is_complete(&self) -> bool {
        self.samples.len() as u64 >= self.planned_sample_count()
    }

    pub fn transition(&mut self, to: SessionStatus) -> Result<(), SessionError> {
        if !self.status.can_move_to(to) {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn mark_checkpointed(&mut self, at: DateTime<Utc>) {
        self.last_checkpoint_time = Some(at);
    }

    /// Append the next sample and update the tallies.
    pub fn record(&mut self, sample: Sample) {
        debug_assert_eq!(sample.index, self.next_index());
        if sample.is_error() {
            self.error_count += 1;
            self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        } else {
            self.consecutive_errors = 0;
        }
        self.samples.push(sample);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(duration_minutes: u64, interval_secs: u64) -> SessionIdentity {
        SessionIdentity {
            target: "ws://db01:9400/ws".into(),
            auth: AuthMode::Trusted,
            duration_minutes,
            interval_secs,
        }
    }

    #[test]
    fn planned_count_rounds_up() {
        assert_eq!(identity(1440, 120).planned_sample_count(), 720);
        assert_eq!(identity(1, 7).planned_sample_count(), 9);
        assert_eq!(identity(1, 60).planned_sample_count(), 1);
    }

    #[test]
    fn only_documented_transitions_are_allowed() {
        let mut s = MonitoringSession::new(identity(10, 60), Utc::now());
        assert!(s.transition(SessionStatus::Completed).is_err());
        s.transition(SessionStatus::Running).unwrap();
        s.transition(SessionStatus::Interrupted).unwrap();
        assert!(matches!(
            s.transition(SessionStatus::Running),
            Err(SessionError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn rehydrate_recounts_errors_and_streak() {
        let t0 = Utc::now();
        let step = chrono::Duration::seconds(60);
        let samples = vec![
            Sample::error(0, t0, ErrorKind::Timeout, "slow"),
            Sample::error(1, t0 + step, ErrorKind::ConnectionError, "refused"),
            Sample::error(2, t0 + step * 2, ErrorKind::ConnectionError, "refused"),
        ];
        let s = MonitoringSession::rehydrate(identity(10, 60), t0, None, samples);
        assert_eq!(s.error_count(), 3);
        assert_eq!(s.consecutive_errors(), 3);
        assert_eq!(s.status(), SessionStatus::Init);
        assert_eq!(s.next_index(), 3);
    }

    #[test]
    fn sample_flattens_outcome() {
        let s = Sample::error(4, Utc::now(), ErrorKind::QueryError, "missing field");
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["outcome"], "error");
        assert_eq!(v["error_kind"], "query_error");
        assert_eq!(v["index"], 4);
        let back: Sample = serde_json::from_value(v).unwrap();
        assert_eq!(back, s);
    }
}
