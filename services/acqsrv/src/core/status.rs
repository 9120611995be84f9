//! Per-device acquisition status

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashSet;

/// Running totals for one device
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub successes: u64,
    pub failures: u64,
    pub last_poll: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Status board shared by all workers
#[derive(Debug, Default)]
pub struct StatusBoard {
    devices: DashMap<String, DeviceStatus>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_poll(&self, device_id: &str) {
        self.devices
            .entry(device_id.to_string())
            .or_default()
            .last_poll = Some(Utc::now());
    }

    pub fn record_success(&self, device_id: &str) {
        let mut status = self.devices.entry(device_id.to_string()).or_default();
        status.successes += 1;
        status.last_success = Some(Utc::now());
    }

    pub fn record_failure(&self, device_id: &str, error: &str) {
        let mut status = self.devices.entry(device_id.to_string()).or_default();
        status.failures += 1;
        status.last_error = Some(error.to_string());
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceStatus> {
        self.devices.get(device_id).map(|s| s.value().clone())
    }

    pub fn retain_devices(&self, device_ids: &HashSet<String>) {
        self.devices.retain(|device_id, _| device_ids.contains(device_id));
    }

    pub fn snapshot(&self) -> Vec<(String, DeviceStatus)> {
        let mut all: Vec<_> = self
            .devices
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
