pub mod tamper;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::utils::duration_to_millis;

pub use tamper::Tamper;

/// Default number of requests kept in the log
pub const DEFAULT_CAPACITY: usize = 50;

/// One completed request, as shown by the traffic monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub id: u64,
    pub method: String,
    pub path: String,
    #[serde(rename = "status")]
    pub status_code: u16,
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    pub tampered: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tamper_type: String,
    /// Local wall-clock time the request completed (`HH:MM:SS`)
    pub timestamp: String,
}

/// Outcome of a request, before the monitor stamps it
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub duration: Duration,
    pub tamper: Tamper,
}

/// Bounded, newest-first history of completed requests
#[derive(Debug)]
pub struct RequestMonitor {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl Default for RequestMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestMonitor {
    /// Create a monitor keeping [`DEFAULT_CAPACITY`] entries
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a monitor keeping at most `capacity` entries (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stamp and store a finished request, evicting the oldest entry when full
    pub fn record(&self, record: RequestRecord) -> LogEntry {
        let entry = LogEntry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method: record.method,
            path: record.path,
            status_code: record.status_code,
            duration_ms: duration_to_millis(record.duration),
            tampered: record.tamper.tampered,
            tamper_type: record.tamper.kind,
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
        };

        tracing::debug!(
            id = entry.id,
            method = %entry.method,
            path = %entry.path,
            status = entry.status_code,
            duration_ms = entry.duration_ms,
            tamper = %entry.tamper_type,
            "Request recorded"
        );

        let mut entries = self.entries.lock();
        entries.push_front(entry.clone());
        entries.truncate(self.capacity);

        entry
    }

    /// Copy of the current history, newest first
    pub fn get_logs(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Records a request into the monitor when dropped.
///
/// Attached to a streamed response body, so the entry is written once the
/// body has been fully sent or the client went away.
#[derive(Debug)]
pub struct CompletionRecorder {
    monitor: Arc<RequestMonitor>,
    record: Option<RequestRecord>,
    started: Instant,
}

impl CompletionRecorder {
    /// `record.duration` is overwritten with the time elapsed since `started`
    pub fn new(monitor: Arc<RequestMonitor>, record: RequestRecord, started: Instant) -> Self {
        Self {
            monitor,
            record: Some(record),
            started,
        }
    }
}

impl Drop for CompletionRecorder {
    fn drop(&mut self) {
        if let Some(mut record) = self.record.take() {
            record.duration = self.started.elapsed();
            self.monitor.record(record);
        }
    }
}
