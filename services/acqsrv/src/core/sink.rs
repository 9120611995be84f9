//! Output sink for decoded data points

use crate::error::{AcqError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::warn;

/// One decoded, calibrated register value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataPoint {
    pub device_id: String,
    pub register_id: String,
    pub register_name: String,
    pub address: u16,
    pub value: f64,
    pub unit: String,
    /// Filled in by the sink
    pub timestamp: Option<DateTime<Utc>>,
    /// Position of the register in the device's declared list
    pub sequence: usize,
}

/// Delivery queue for data points
pub trait OutputSink: Send + Sync {
    /// Hand a point to the delivery queue without waiting
    fn deliver(&self, point: DataPoint) -> Result<()>;
}

/// Sink over a bounded `mpsc` channel
///
/// A full queue drops the point and counts it.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<DataPoint>,
    dropped: AtomicU64,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DataPoint>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl OutputSink for ChannelSink {
    fn deliver(&self, mut point: DataPoint) -> Result<()> {
        point.timestamp = Some(Utc::now());
        match self.tx.try_send(point) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(point)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "Sink full, dropped {}/{} (total {})",
                    point.device_id, point.register_id, dropped
                );
                Err(AcqError::sink("delivery queue full"))
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(AcqError::sink("delivery queue closed"))
            },
        }
    }
}
