//! The metric source seam: one read-only acquisition per call.

use crate::error::SourceError;
use crate::types::MetricsSnapshot;

/// Something that can produce one `MetricsSnapshot` per call.
///
/// Implementations may block for arbitrarily long; the collector bounds every
/// call with a timeout and calls [`MetricSource::abandon`] when it gives up.
#[allow(async_fn_in_trait)]
pub trait MetricSource {
    async fn fetch(&mut self) -> Result<MetricsSnapshot, SourceError>;

    /// Forget any connection state left behind by a call that was dropped mid-flight.
    fn abandon(&mut self) {}

    /// Called once before sampling with the index of the next sample, so a
    /// resumed session can continue where the previous process stopped.
    fn resume_at(&mut self, _next_index: u64) {}

    /// Human readable endpoint, for logs.
    fn describe(&self) -> String;
}
