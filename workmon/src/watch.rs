//! Watch mode: a lazy stream of status reports, one per polling interval.
//!
//! Nothing happens until the stream is polled; dropping it stops the polling.
//! Calling [`watch`] again starts a fresh sequence.

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, Stream};
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::error::StatusError;
use crate::status::{compute_status, read_checkpoint, StatusReport};

pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(30);

/// Never ends on its own; read errors are yielded and polling continues.
pub fn watch(
    path: PathBuf,
    every: Duration,
) -> impl Stream<Item = Result<StatusReport, StatusError>> {
    stream::unfold(
        (path, None::<Interval>),
        move |(path, ticker)| async move {
            // the first tick completes immediately
            let mut ticker = ticker.unwrap_or_else(|| {
                let mut t = interval(every);
                t.set_missed_tick_behavior(MissedTickBehavior::Delay);
                t
            });
            ticker.tick().await;
            let item = read_checkpoint(&path)
                .await
                .map(|cp| compute_status(&cp, Utc::now()));
            Some((item, (path, Some(ticker))))
        },
    )
}
