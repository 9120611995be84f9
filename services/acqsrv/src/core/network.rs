//! Uplink availability as seen by the acquisition workers

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Active uplink transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveTransport {
    None,
    Primary,
    Secondary,
}

/// Reports which uplink, if any, is currently usable
pub trait NetworkAvailability: Send + Sync {
    fn active_transport(&self) -> ActiveTransport;
}

/// Network availability flag updated by the uplink manager
#[derive(Debug)]
pub struct SharedNetworkState {
    active: AtomicU8,
}

impl SharedNetworkState {
    pub fn new(initial: ActiveTransport) -> Self {
        Self {
            active: AtomicU8::new(encode(initial)),
        }
    }

    pub fn set(&self, transport: ActiveTransport) {
        self.active.store(encode(transport), Ordering::Release);
    }
}

impl Default for SharedNetworkState {
    fn default() -> Self {
        Self::new(ActiveTransport::Primary)
    }
}

impl NetworkAvailability for SharedNetworkState {
    fn active_transport(&self) -> ActiveTransport {
        match self.active.load(Ordering::Acquire) {
            1 => ActiveTransport::Primary,
            2 => ActiveTransport::Secondary,
            _ => ActiveTransport::None,
        }
    }
}

fn encode(transport: ActiveTransport) -> u8 {
    match transport {
        ActiveTransport::None => 0,
        ActiveTransport::Primary => 1,
        ActiveTransport::Secondary => 2,
    }
}
