//! Wall-clock timestamps derived from tokio's monotonic clock.
//!
//! Timestamps are `wall_base + elapsed`, so they never go backwards even if the
//! system clock is adjusted mid-session, and under paused tokio time (tests)
//! they advance with the virtual clock.

use chrono::{DateTime, Utc};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Clock {
    wall_base: DateTime<Utc>,
    instant_base: Instant,
}

impl Clock {
    pub fn system() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(wall_base: DateTime<Utc>) -> Self {
        Self {
            wall_base,
            instant_base: Instant::now(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.instant_base.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_base + elapsed
    }

    /// Sleep until `at`. Returns immediately when `at` is already past.
    pub async fn sleep_until(&self, at: DateTime<Utc>) {
        let offset = (at - self.wall_base).to_std().unwrap_or_default();
        tokio::time::sleep_until(self.instant_base + offset).await;
    }
}
