//! Per-tick batch ledger
//!
//! Each device polled in the current tick owns one entry recording how many
//! register outcomes are expected and how many have been seen. Consumers
//! drain a finished tick with [`BatchTracker::take_if_complete`].

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Counters for one device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchEntry {
    pub expected: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchEntry {
    pub fn is_complete(&self) -> bool {
        self.succeeded + self.failed == self.expected
    }

    fn has_room(&self) -> bool {
        self.succeeded + self.failed < self.expected
    }
}

/// Shared batch ledger
#[derive(Debug, Default)]
pub struct BatchTracker {
    entries: Mutex<HashMap<String, BatchEntry>>,
}

impl BatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) the batch of `device_id`
    pub fn begin(&self, device_id: &str, expected: usize) {
        self.entries.lock().insert(
            device_id.to_string(),
            BatchEntry {
                expected,
                ..Default::default()
            },
        );
    }

    /// Count a successful register; ignored once the batch is full
    pub fn record_success(&self, device_id: &str) {
        if let Some(entry) = self.entries.lock().get_mut(device_id) {
            if entry.has_room() {
                entry.succeeded += 1;
            }
        }
    }

    /// Count a failed register; ignored once the batch is full
    pub fn record_failure(&self, device_id: &str) {
        if let Some(entry) = self.entries.lock().get_mut(device_id) {
            if entry.has_room() {
                entry.failed += 1;
            }
        }
    }

    /// True when at least one device is tracked and every tracked device is
    /// fully accounted for
    pub fn is_batch_complete(&self) -> bool {
        let entries = self.entries.lock();
        !entries.is_empty() && entries.values().all(BatchEntry::is_complete)
    }

    /// Drain every entry if the batch is complete, under one lock
    pub fn take_if_complete(&self) -> Option<HashMap<String, BatchEntry>> {
        let mut entries = self.entries.lock();
        if entries.is_empty() || !entries.values().all(BatchEntry::is_complete) {
            return None;
        }
        Some(std::mem::take(&mut *entries))
    }

    pub fn clear(&self, device_id: &str) {
        self.entries.lock().remove(device_id);
    }

    /// Drop entries of devices that are no longer configured
    pub fn retain_devices(&self, device_ids: &HashSet<String>) {
        self.entries
            .lock()
            .retain(|device_id, _| device_ids.contains(device_id));
    }

    pub fn entry(&self, device_id: &str) -> Option<BatchEntry> {
        self.entries.lock().get(device_id).copied()
    }

    pub fn snapshot(&self) -> HashMap<String, BatchEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
