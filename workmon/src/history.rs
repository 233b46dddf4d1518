//! Bounded sample windows and running per-field statistics.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

pub fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    if dq.len() == cap {
        dq.pop_front();
    }
    dq.push_back(v);
}

/// Average and peak of one numeric field across SUCCESS samples.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldStats {
    pub category: String,
    pub field: String,
    pub samples: u64,
    pub avg: f64,
    pub peak: f64,
    /// Timestamp of the first sample that reached the peak.
    pub peak_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FieldAccumulator {
    sum: f64,
    count: u64,
    peak: f64,
    peak_at: DateTime<Utc>,
}

impl FieldAccumulator {
    pub fn new(value: f64, at: DateTime<Utc>) -> Self {
        Self {
            sum: value,
            count: 1,
            peak: value,
            peak_at: at,
        }
    }

    pub fn push(&mut self, value: f64, at: DateTime<Utc>) {
        self.sum += value;
        self.count += 1;
        if value > self.peak {
            self.peak = value;
            self.peak_at = at;
        }
    }

    pub fn finish(&self, category: &str, field: &str) -> FieldStats {
        FieldStats {
            category: category.to_string(),
            field: field.to_string(),
            samples: self.count,
            avg: self.sum / self.count as f64,
            peak: self.peak,
            peak_at: self.peak_at,
        }
    }
}
