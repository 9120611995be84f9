//! Device configuration store

use fieldgate_modbus::modbus::DeviceDescriptor;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

/// Source of device descriptors with change notification
///
/// The receiver returned by [`ConfigStore::subscribe`] observes a version
/// counter that changes on every mutation.
pub trait ConfigStore: Send + Sync {
    /// Device ids in configuration order
    fn list_device_ids(&self) -> Vec<String>;

    fn read_device(&self, device_id: &str) -> Option<DeviceDescriptor>;

    fn subscribe(&self) -> watch::Receiver<u64>;
}

/// In-memory store seeded from the loaded configuration
#[derive(Debug)]
pub struct MemoryConfigStore {
    devices: RwLock<Vec<DeviceDescriptor>>,
    version: watch::Sender<u64>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::from_devices(Vec::new())
    }

    pub fn from_devices(devices: Vec<DeviceDescriptor>) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            devices: RwLock::new(devices),
            version,
        }
    }

    /// Insert a device or replace the one with the same id in place
    pub fn upsert_device(&self, device: DeviceDescriptor) {
        {
            let mut devices = self.devices.write();
            match devices.iter_mut().find(|d| d.id == device.id) {
                Some(existing) => *existing = device,
                None => devices.push(device),
            }
        }
        self.bump();
    }

    /// Returns whether a device was removed
    pub fn remove_device(&self, device_id: &str) -> bool {
        let removed = {
            let mut devices = self.devices.write();
            let before = devices.len();
            devices.retain(|d| d.id != device_id);
            devices.len() != before
        };
        if removed {
            self.bump();
        }
        removed
    }

    pub fn replace_all(&self, devices: Vec<DeviceDescriptor>) {
        *self.devices.write() = devices;
        self.bump();
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
        debug!("Config version {}", self.version());
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn list_device_ids(&self) -> Vec<String> {
        self.devices.read().iter().map(|d| d.id.clone()).collect()
    }

    fn read_device(&self, device_id: &str) -> Option<DeviceDescriptor> {
        self.devices
            .read()
            .iter()
            .find(|d| d.id == device_id)
            .cloned()
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }
}
