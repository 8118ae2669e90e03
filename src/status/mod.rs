//! Durability Status Store
//!
//! Holds the history of check outcomes and the derived success percentage.
//! The check engine is the only writer; the status page reads owned
//! snapshots. Records and percentage live behind one mutex so no reader can
//! observe one without the other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub sequence: u64,
    /// Completion time
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// Failure reason, absent on success
    pub error_detail: Option<String>,
}

impl CheckRecord {
    pub fn success(sequence: u64, timestamp: DateTime<Utc>) -> Self {
        Self { sequence, timestamp, success: true, error_detail: None }
    }

    pub fn failure(sequence: u64, timestamp: DateTime<Utc>, detail: impl Into<String>) -> Self {
        Self { sequence, timestamp, success: false, error_detail: Some(detail.into()) }
    }
}

/// All check outcomes plus what is being monitored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurabilityStatus {
    /// Records keyed and ordered by sequence
    pub records: BTreeMap<u64, CheckRecord>,
    pub file_name: String,
    pub file_size: u64,
    pub check_interval: Duration,
    pub successes: u64,
    pub success_percentage: f64,
}

impl DurabilityStatus {
    pub fn new(file_name: impl Into<String>, file_size: u64, check_interval: Duration) -> Self {
        Self {
            records: BTreeMap::new(),
            file_name: file_name.into(),
            file_size,
            check_interval,
            successes: 0,
            success_percentage: 100.0,
        }
    }

    pub fn attempts(&self) -> u64 {
        self.records.len() as u64
    }

    fn insert(&mut self, record: CheckRecord) {
        let success = record.success;
        if let Some(previous) = self.records.insert(record.sequence, record) {
            // A sequence is issued once; if it ever repeats, keep the count honest
            if previous.success {
                self.successes -= 1;
            }
        }
        if success {
            self.successes += 1;
        }
        self.success_percentage = percentage(self.successes, self.attempts());
    }
}

/// Successes as a share of attempts, 100 before the first attempt
pub fn percentage(successes: u64, attempts: u64) -> f64 {
    if attempts == 0 {
        100.0
    } else {
        successes as f64 * 100.0 / attempts as f64
    }
}

/// Counters for log lines
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSummary {
    pub attempts: u64,
    pub successes: u64,
    pub success_percentage: f64,
}

/// Synchronized access to the process-wide durability status
#[derive(Debug)]
pub struct StatusStore {
    status: Mutex<DurabilityStatus>,
}

impl StatusStore {
    pub fn new(file_name: impl Into<String>, file_size: u64, check_interval: Duration) -> Self {
        Self {
            status: Mutex::new(DurabilityStatus::new(file_name, file_size, check_interval)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DurabilityStatus> {
        // Every mutation completes before the guard drops, so a poisoned lock still holds whole state
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consistent copy of the current status
    pub fn read(&self) -> DurabilityStatus {
        self.lock().clone()
    }

    /// Add a record and recompute the percentage in one critical section
    pub fn record(&self, record: CheckRecord) -> StatusSummary {
        let mut status = self.lock();
        status.insert(record);
        StatusSummary {
            attempts: status.attempts(),
            successes: status.successes,
            success_percentage: status.success_percentage,
        }
    }

    pub fn summary(&self) -> StatusSummary {
        let status = self.lock();
        StatusSummary {
            attempts: status.attempts(),
            successes: status.successes,
            success_percentage: status.success_percentage,
        }
    }
}
