//! Types that mirror the agent's checkpoint schema.
//!
//! Deliberately loose: unknown fields are ignored and most fields are optional,
//! so checkpoints written by newer agents still load.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// category -> field -> value (numbers, plus the odd string such as a wait type)
pub type Snapshot = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Auth {
    #[serde(default)]
    pub mode: String,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Session {
    pub target: String,
    #[serde(default)]
    pub auth: Auth,
    pub duration_minutes: u64,
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Sample {
    pub index: u64,
    pub timestamp: DateTime<Utc>,
    pub outcome: String,
    pub snapshot: Option<Snapshot>,
    pub error_kind: Option<String>,
    pub message: Option<String>,
}

impl Sample {
    pub fn is_success(&self) -> bool {
        self.outcome == "success"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Checkpoint {
    pub version: Option<String>,
    pub session: Session,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub last_checkpoint_time: Option<DateTime<Utc>>,
    pub planned_samples: Option<u64>,
    #[serde(default)]
    pub samples: Vec<Sample>,
}

impl Checkpoint {
    /// Stored value when present, else `ceil(duration / interval)`.
    pub fn planned(&self) -> u64 {
        self.planned_samples.unwrap_or_else(|| {
            (self.session.duration_minutes * 60).div_ceil(self.session.interval_secs.max(1))
        })
    }
}
