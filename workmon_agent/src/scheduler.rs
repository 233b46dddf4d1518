//! Session scheduler: decides fresh start vs. resume, drives the tick loop,
//! and owns every status transition.
//!
//! Ticks sit on a fixed grid `anchor + k * interval`, so slow acquisitions do
//! not accumulate drift. A tick that is already due fires immediately; when the
//! loop has fallen a whole interval or more behind (long overrun, resume after
//! downtime) the grid is re-anchored at "now" rather than bursting samples.

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::checkpoint::CheckpointStore;
use crate::clock::Clock;
use crate::collector::Collector;
use crate::error::SessionError;
use crate::session::{MonitoringSession, Outcome, Sample, SessionIdentity, SessionStatus};
use crate::source::MetricSource;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_CHECKPOINT_EVERY: u32 = 1;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Back-to-back ERROR samples that escalate the session to FAILED.
    pub failure_threshold: u32,
    /// Persist after this many new samples (terminal transitions always persist).
    pub checkpoint_every: u32,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            checkpoint_every: DEFAULT_CHECKPOINT_EVERY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    Fresh,
    Resumed { samples: u64, errors: u64 },
}

pub struct Scheduler<S> {
    source: S,
    collector: Collector,
    store: CheckpointStore,
    clock: Clock,
    options: SchedulerOptions,
}

impl<S: MetricSource> Scheduler<S> {
    pub fn new(
        source: S,
        collector: Collector,
        store: CheckpointStore,
        clock: Clock,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            source,
            collector,
            store,
            clock,
            options,
        }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// INIT: rehydrate an unfinished checkpoint for the same identity, or start
    /// a fresh session. A corrupt, foreign or finished checkpoint is an error;
    /// it is never discarded here.
    pub fn init(
        &self,
        identity: SessionIdentity,
    ) -> Result<(MonitoringSession, Startup), SessionError> {
        let Some(checkpoint) = self.store.load()? else {
            let session = MonitoringSession::new(identity, self.clock.now());
            return Ok((session, Startup::Fresh));
        };
        if checkpoint.session != identity {
            return Err(SessionError::IdentityMismatch {
                expected: identity.to_string(),
                found: checkpoint.session.to_string(),
            });
        }
        if checkpoint.status.is_finished() {
            return Err(SessionError::AlreadyFinished(checkpoint.status));
        }
        let startup = Startup::Resumed {
            samples: checkpoint.total_samples,
            errors: checkpoint.error_count,
        };
        Ok((checkpoint.into_session(), startup))
    }

    /// RUNNING until COMPLETED, FAILED or INTERRUPTED (when `cancel` turns true).
    /// Cancellation is honoured between ticks; an acquisition already in flight
    /// finishes or times out first.
    pub async fn run(
        &mut self,
        session: &mut MonitoringSession,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<SessionStatus, SessionError> {
        session.transition(SessionStatus::Running)?;
        self.checkpoint(session)?;

        let planned = session.planned_sample_count();
        let mut cadence = Cadence::replay(
            session.start_time(),
            session.identity().interval(),
            session.samples(),
        );
        self.source.resume_at(session.next_index());
        let mut unsaved = 0u32;
        info!(
            endpoint = %self.source.describe(),
            taken = session.next_index(),
            planned,
            "sampling started"
        );

        loop {
            if session.is_complete() {
                return self.finish(session, SessionStatus::Completed);
            }
            if *cancel.borrow() {
                return self.finish(session, SessionStatus::Interrupted);
            }

            let index = session.next_index();
            let mut due = cadence.due(index, self.clock.now());
            if let Some(last) = session.last_timestamp() {
                due = due.max(last + chrono::Duration::milliseconds(1));
            }
            let interrupted = tokio::select! {
                biased;
                _ = cancelled(&mut cancel) => true,
                _ = self.clock.sleep_until(due) => false,
            };
            if interrupted {
                return self.finish(session, SessionStatus::Interrupted);
            }

            let timestamp = self.clock.now();
            let sample = self
                .collector
                .collect(&mut self.source, index, timestamp)
                .await;
            report_tick(&sample, planned);
            session.record(sample);
            unsaved += 1;

            if session.is_complete() {
                return self.finish(session, SessionStatus::Completed);
            }
            if session.consecutive_errors() >= self.options.failure_threshold {
                error!(
                    tag = "FAIL",
                    consecutive = session.consecutive_errors(),
                    threshold = self.options.failure_threshold,
                    "metric source unreachable, escalating session"
                );
                return self.finish(session, SessionStatus::Failed);
            }
            if unsaved >= self.options.checkpoint_every {
                self.checkpoint(session)?;
                unsaved = 0;
            }
        }
    }

    fn finish(
        &self,
        session: &mut MonitoringSession,
        status: SessionStatus,
    ) -> Result<SessionStatus, SessionError> {
        session.transition(status)?;
        self.checkpoint(session)?;
        info!(
            status = %status,
            samples = session.samples().len(),
            errors = session.error_count(),
            "session stopped"
        );
        Ok(status)
    }

    fn checkpoint(&self, session: &mut MonitoringSession) -> Result<(), SessionError> {
        session.mark_checkpointed(self.clock.now());
        self.store.save(session)?;
        Ok(())
    }
}

/// Tick grid with re-anchoring.
#[derive(Debug, Clone, Copy)]
struct Cadence {
    anchor: DateTime<Utc>,
    anchor_index: u64,
    interval: chrono::Duration,
}

impl Cadence {
    fn new(start: DateTime<Utc>, interval: chrono::Duration) -> Self {
        Self {
            anchor: start,
            anchor_index: 0,
            interval,
        }
    }

    /// Rebuild the grid a previous run was on from its recorded samples. A sample
    /// taken a whole interval or more after its slot marks a re-anchor.
    fn replay(start: DateTime<Utc>, interval: chrono::Duration, samples: &[Sample]) -> Self {
        let mut cadence = Self::new(start, interval);
        for sample in samples {
            if sample.timestamp - cadence.slot(sample.index) >= interval {
                cadence.anchor = sample.timestamp;
                cadence.anchor_index = sample.index;
            }
        }
        cadence
    }

    fn slot(&self, index: u64) -> DateTime<Utc> {
        i32::try_from(index.saturating_sub(self.anchor_index))
            .ok()
            .and_then(|steps| self.interval.checked_mul(steps))
            .and_then(|offset| self.anchor.checked_add_signed(offset))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn due(&mut self, index: u64, now: DateTime<Utc>) -> DateTime<Utc> {
        let slot = self.slot(index);
        if now - slot >= self.interval {
            self.anchor = now;
            self.anchor_index = index;
            return now;
        }
        slot
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // sender gone: nobody can cancel any more
            std::future::pending::<()>().await;
        }
    }
}

fn report_tick(sample: &Sample, planned: u64) {
    let n = sample.index + 1;
    let progress = format!("{:.1}%", n as f64 * 100.0 / planned.max(1) as f64);
    match &sample.outcome {
        Outcome::Success { snapshot } => info!(
            tag = "OK",
            sample = n,
            planned,
            progress = %progress,
            "cpu_time_ms={} buffer_pool_mb={} connections={} batch_req/s={}",
            snapshot.cpu.sql_server_cpu_time_ms,
            snapshot.memory.buffer_pool_mb,
            snapshot.activity.user_connections,
            snapshot.activity.batch_requests_per_sec
        ),
        Outcome::Error {
            error_kind,
            message,
        } => warn!(
            tag = error_kind.tag(),
            sample = n,
            planned,
            progress = %progress,
            "{message}"
        ),
    }
}
