//! Device poll scheduler
//!
//! One scheduler runs per transport family. Every tick it walks the device
//! snapshot in configuration order and polls each device whose cadence has
//! elapsed:
//!
//! ```text
//! DUE? ──yes──> POLLING (register by register) ──> IDLE (last_read = tick)
//!   └──no──> skipped
//! ```
//!
//! Configuration changes are observed between devices. A change aborts the
//! pass and rebuilds the snapshot, so a removed device is not polled again.

use crate::core::batch::BatchTracker;
use crate::core::config::ConfigStore;
use crate::core::network::{ActiveTransport, NetworkAvailability};
use crate::core::sink::{DataPoint, OutputSink};
use crate::core::status::StatusBoard;
use crate::core::transport::FieldTransport;
use fieldgate_modbus::modbus::{decode_value, DeviceDescriptor, RegisterDescriptor, TransportFamily};
use fieldgate_modbus::{LinkError, Result as LinkResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Scheduler timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between passes over the device list
    pub tick_interval_ms: u64,
    /// Pause between two registers of the same device
    pub register_yield_ms: u64,
    /// Interval between pool maintenance runs
    pub maintenance_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            register_yield_ms: 5,
            maintenance_interval_ms: 5000,
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn register_yield(&self) -> Duration {
        Duration::from_millis(self.register_yield_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms)
    }
}

/// Due-time bookkeeping for one device
#[derive(Debug, Clone, Default)]
pub struct DeviceTimer {
    pub last_read: Option<Instant>,
    /// Last read of each register, by declared position
    register_reads: HashMap<usize, Instant>,
}

impl DeviceTimer {
    fn is_due(&self, now: Instant, cadence: Duration) -> bool {
        self.last_read
            .map_or(true, |last| now.duration_since(last) >= cadence)
    }

    fn register_due(&self, index: usize, now: Instant, cadence: Duration) -> bool {
        self.register_reads
            .get(&index)
            .map_or(true, |last| now.duration_since(*last) >= cadence)
    }
}

/// How a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Completed,
    /// Configuration changed mid-pass; the snapshot was rebuilt
    Aborted,
    Cancelled,
    /// No active uplink
    Skipped,
}

/// Register outcomes of one device poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub expected: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Shared collaborators of a scheduler
#[derive(Clone)]
pub struct SchedulerContext {
    pub store: Arc<dyn ConfigStore>,
    pub batch: Arc<BatchTracker>,
    pub status: Arc<StatusBoard>,
    pub sink: Arc<dyn OutputSink>,
    pub network: Option<Arc<dyn NetworkAvailability>>,
}

/// Per-family poll loop
pub struct PollScheduler {
    config: SchedulerConfig,
    family: TransportFamily,
    transport: Arc<dyn FieldTransport>,
    ctx: SchedulerContext,
    devices: Arc<Vec<DeviceDescriptor>>,
    timers: HashMap<String, DeviceTimer>,
    changes: watch::Receiver<u64>,
    last_maintenance: Instant,
}

impl PollScheduler {
    pub fn new(
        config: SchedulerConfig,
        transport: Arc<dyn FieldTransport>,
        ctx: SchedulerContext,
    ) -> Self {
        let changes = ctx.store.subscribe();
        let mut scheduler = Self {
            config,
            family: transport.family(),
            transport,
            ctx,
            devices: Arc::new(Vec::new()),
            timers: HashMap::new(),
            changes,
            last_maintenance: Instant::now(),
        };
        scheduler.reload_snapshot();
        scheduler
    }

    pub fn devices(&self) -> &Arc<Vec<DeviceDescriptor>> {
        &self.devices
    }

    pub fn timer(&self, device_id: &str) -> Option<&DeviceTimer> {
        self.timers.get(device_id)
    }

    /// Rebuild the descriptor snapshot and drop state of removed devices
    pub fn reload_snapshot(&mut self) {
        let _ = self.changes.borrow_and_update();

        let mut configured = HashSet::new();
        let mut devices = Vec::new();
        for id in self.ctx.store.list_device_ids() {
            let Some(device) = self.ctx.store.read_device(&id) else {
                continue;
            };
            configured.insert(id);
            if device.family() == self.family {
                devices.push(device);
            }
        }

        let own: HashSet<&str> = devices.iter().map(|d| d.id.as_str()).collect();
        self.timers.retain(|id, _| own.contains(id.as_str()));
        self.ctx.batch.retain_devices(&configured);
        self.ctx.status.retain_devices(&configured);

        info!("{:?} worker: {} device(s)", self.family, devices.len());
        self.devices = Arc::new(devices);
    }

    fn config_changed(&self) -> bool {
        self.changes.has_changed().unwrap_or(false)
    }

    /// One walk over the device list
    pub async fn run_pass(&mut self, token: &CancellationToken) -> PassOutcome {
        if self.config_changed() {
            self.reload_snapshot();
        }

        if self.family == TransportFamily::Network {
            if let Some(network) = &self.ctx.network {
                if network.active_transport() == ActiveTransport::None {
                    debug!("No active uplink, skipping pass");
                    return PassOutcome::Skipped;
                }
            }
        }

        let devices = Arc::clone(&self.devices);
        for device in devices.iter() {
            if token.is_cancelled() {
                return PassOutcome::Cancelled;
            }
            if self.config_changed() {
                info!("Config changed, aborting pass");
                self.reload_snapshot();
                return PassOutcome::Aborted;
            }
            if !device.is_well_formed() {
                debug!("Skipping malformed device {}", device.id);
                continue;
            }

            let now = Instant::now();
            let due = self
                .timers
                .get(&device.id)
                .map_or(true, |t| t.is_due(now, device.effective_refresh()));
            if due {
                self.poll_device(device, now, token).await;
            }
        }

        if token.is_cancelled() {
            return PassOutcome::Cancelled;
        }

        if self.last_maintenance.elapsed() >= self.config.maintenance_interval() {
            self.transport.maintain().await;
            self.last_maintenance = Instant::now();
        }
        PassOutcome::Completed
    }

    /// Poll the due registers of one device
    pub async fn poll_device(
        &mut self,
        device: &DeviceDescriptor,
        now: Instant,
        token: &CancellationToken,
    ) -> PollSummary {
        let timer = self.timers.entry(device.id.clone()).or_default();
        let selected: Vec<usize> = device
            .registers
            .iter()
            .enumerate()
            .filter(|(index, register)| {
                timer.register_due(*index, now, device.register_refresh(register))
            })
            .filter(|(_, register)| match register.validate_address_range() {
                Ok(()) => true,
                Err(e) => {
                    warn!("{}: skipping register: {}", device.id, e);
                    false
                },
            })
            .map(|(index, _)| index)
            .collect();

        let mut summary = PollSummary {
            expected: selected.len(),
            ..Default::default()
        };
        self.ctx.status.record_poll(&device.id);
        if !selected.is_empty() {
            self.ctx.batch.begin(&device.id, selected.len());
        }

        let register_yield = self.config.register_yield();
        let mut unreachable: Option<String> = None;

        for (position, &index) in selected.iter().enumerate() {
            if token.is_cancelled() {
                debug!("{}: cancelled mid-poll", device.id);
                break;
            }
            let register = &device.registers[index];

            if let Some(reason) = &unreachable {
                self.record_failure(device, register, reason);
                summary.failed += 1;
                continue;
            }

            match self.read_with_retry(device, register).await {
                Ok(words) => {
                    match decode_value(&words, register.data_type(), &register.calibration) {
                        Ok(value) => {
                            self.record_success(device, register, index, value);
                            summary.succeeded += 1;
                        },
                        Err(e) => {
                            self.record_failure(device, register, &e.to_string());
                            summary.failed += 1;
                        },
                    }
                },
                Err(e) => {
                    self.record_failure(device, register, &e.to_string());
                    summary.failed += 1;
                    if e.is_unreachable() {
                        warn!("{} unreachable: {}", device.id, e);
                        unreachable = Some(e.to_string());
                    }
                },
            }

            if unreachable.is_none()
                && position + 1 < selected.len()
                && !register_yield.is_zero()
            {
                tokio::time::sleep(register_yield).await;
            }
        }

        let timer = self.timers.entry(device.id.clone()).or_default();
        timer.last_read = Some(now);
        for index in &selected {
            timer.register_reads.insert(*index, now);
        }

        debug!(
            "{}: {}/{} ok, {} failed",
            device.id, summary.succeeded, summary.expected, summary.failed
        );
        summary
    }

    async fn read_with_retry(
        &self,
        device: &DeviceDescriptor,
        register: &RegisterDescriptor,
    ) -> LinkResult<Vec<u16>> {
        let mut attempt = 0;
        loop {
            match self.transport.read(device, register).await {
                Ok(words) => return Ok(words),
                Err(e @ (LinkError::Exception { .. } | LinkError::Config(_))) => return Err(e),
                Err(e) if attempt < device.retry_count => {
                    attempt += 1;
                    debug!(
                        "{}:{} retry {}/{}: {}",
                        device.id, register.id, attempt, device.retry_count, e
                    );
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn record_success(
        &self,
        device: &DeviceDescriptor,
        register: &RegisterDescriptor,
        index: usize,
        value: f64,
    ) {
        self.ctx.batch.record_success(&device.id);
        self.ctx.status.record_success(&device.id);

        let point = DataPoint {
            device_id: device.id.clone(),
            register_id: register.id.clone(),
            register_name: register.name.clone(),
            address: register.address,
            value,
            unit: register.unit.clone(),
            timestamp: None,
            sequence: index,
        };
        if let Err(e) = self.ctx.sink.deliver(point) {
            debug!("{}:{} not delivered: {}", device.id, register.id, e);
        }
    }

    fn record_failure(&self, device: &DeviceDescriptor, register: &RegisterDescriptor, reason: &str) {
        warn!("{}:{} read failed: {}", device.id, register.id, reason);
        self.ctx.batch.record_failure(&device.id);
        self.ctx.status.record_failure(&device.id, reason);
    }

    /// Tick until cancelled
    pub async fn run(mut self, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("{:?} worker started", self.family);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.run_pass(&token).await == PassOutcome::Cancelled {
                        break;
                    }
                }
                () = token.cancelled() => break,
            }
        }
        info!("{:?} worker stopped", self.family);
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::config::MemoryConfigStore;
    use crate::core::network::SharedNetworkState;
    use crate::core::sink::ChannelSink;
    use async_trait::async_trait;
    use fieldgate_modbus::modbus::{BaseType, Calibration, DeviceTarget, FunctionCode};
    use fieldgate_modbus::ByteOrder;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    type Responder = Box<dyn Fn(&str, u16) -> LinkResult<Vec<u16>> + Send + Sync>;

    /// Transport answering from a closure and recording every read
    struct MockTransport {
        respond: Responder,
        reads: Mutex<Vec<(String, u16)>>,
        maintained: Mutex<u32>,
        on_read: Mutex<Option<Box<dyn FnMut(&str) + Send>>>,
    }

    impl MockTransport {
        fn new(respond: impl Fn(&str, u16) -> LinkResult<Vec<u16>> + Send + Sync + 'static) -> Self {
            Self {
                respond: Box::new(respond),
                reads: Mutex::new(Vec::new()),
                maintained: Mutex::new(0),
                on_read: Mutex::new(None),
            }
        }

        fn reads(&self) -> Vec<(String, u16)> {
            self.reads.lock().clone()
        }
    }

    #[async_trait]
    impl FieldTransport for MockTransport {
        fn family(&self) -> TransportFamily {
            TransportFamily::Network
        }

        async fn read(
            &self,
            device: &DeviceDescriptor,
            register: &RegisterDescriptor,
        ) -> LinkResult<Vec<u16>> {
            self.reads.lock().push((device.id.clone(), register.address));
            if let Some(hook) = self.on_read.lock().as_mut() {
                hook(&device.id);
            }
            (self.respond)(&device.id, register.address)
        }

        async fn maintain(&self) {
            *self.maintained.lock() += 1;
        }
    }

    fn register(address: u16) -> RegisterDescriptor {
        RegisterDescriptor {
            id: format!("r{address}"),
            name: format!("Register {address}"),
            unit: "V".to_string(),
            address,
            function_code: FunctionCode::ReadHoldingRegisters,
            data_type: BaseType::UInt16,
            byte_order: ByteOrder::BigEndian,
            calibration: Calibration::default(),
            refresh_rate_ms: None,
        }
    }

    fn device(id: &str, addresses: &[u16]) -> DeviceDescriptor {
        DeviceDescriptor {
            id: id.to_string(),
            target: DeviceTarget::Tcp {
                host: format!("{id}.local"),
                port: 502,
                unit_id: 1,
            },
            refresh_rate_ms: 1000,
            timeout_ms: 100,
            retry_count: 0,
            registers: addresses.iter().map(|a| register(*a)).collect(),
        }
    }

    struct Harness {
        scheduler: PollScheduler,
        transport: Arc<MockTransport>,
        store: Arc<MemoryConfigStore>,
        batch: Arc<BatchTracker>,
        status: Arc<StatusBoard>,
        network: Arc<SharedNetworkState>,
        rx: mpsc::Receiver<DataPoint>,
    }

    fn harness(devices: Vec<DeviceDescriptor>, transport: MockTransport) -> Harness {
        let store = Arc::new(MemoryConfigStore::from_devices(devices));
        let batch = Arc::new(BatchTracker::new());
        let status = Arc::new(StatusBoard::new());
        let network = Arc::new(SharedNetworkState::default());
        let (sink, rx) = ChannelSink::new(64);
        let transport = Arc::new(transport);
        let ctx = SchedulerContext {
            store: store.clone(),
            batch: batch.clone(),
            status: status.clone(),
            sink: Arc::new(sink),
            network: Some(network.clone()),
        };
        let config = SchedulerConfig {
            register_yield_ms: 0,
            ..Default::default()
        };
        let scheduler = PollScheduler::new(config, transport.clone(), ctx);
        Harness {
            scheduler,
            transport,
            store,
            batch,
            status,
            network,
            rx,
        }
    }

    fn echo_address(_device: &str, address: u16) -> LinkResult<Vec<u16>> {
        Ok(vec![address])
    }

    // ========================================================================
    // Register outcomes
    // ========================================================================

    #[tokio::test]
    async fn test_timeout_fails_only_that_register() {
        let transport = MockTransport::new(|device, address| {
            if device == "a" && address == 3 {
                Err(LinkError::timeout("TCP header read timeout"))
            } else {
                Ok(vec![address * 10])
            }
        });
        let mut h = harness(
            vec![device("a", &[1, 2, 3, 4, 5]), device("b", &[7])],
            transport,
        );

        let outcome = h.scheduler.run_pass(&CancellationToken::new()).await;
        assert_eq!(outcome, PassOutcome::Completed);

        let a = h.batch.entry("a").unwrap();
        assert_eq!((a.expected, a.succeeded, a.failed), (5, 4, 1));
        let b = h.batch.entry("b").unwrap();
        assert_eq!((b.expected, b.succeeded, b.failed), (1, 1, 0));
        assert!(h.batch.is_batch_complete());

        let mut sequences = Vec::new();
        while let Ok(point) = h.rx.try_recv() {
            if point.device_id == "a" {
                sequences.push(point.sequence);
            }
        }
        assert_eq!(sequences, vec![0, 1, 3, 4]);

        let status = h.status.get("a").unwrap();
        assert_eq!(status.failures, 1);
        assert_eq!(status.successes, 4);
    }

    #[tokio::test]
    async fn test_unreachable_fails_remaining_registers() {
        let transport = MockTransport::new(|device, address| {
            if device == "a" {
                Err(LinkError::connection("Connection to a.local:502 timed out"))
            } else {
                Ok(vec![address])
            }
        });
        let mut h = harness(vec![device("a", &[1, 2, 3]), device("b", &[9])], transport);

        h.scheduler.run_pass(&CancellationToken::new()).await;

        let a = h.batch.entry("a").unwrap();
        assert_eq!((a.expected, a.succeeded, a.failed), (3, 0, 3));
        assert_eq!(h.batch.entry("b").unwrap().succeeded, 1);
        // Only the first register of "a" went to the wire
        let reads_a = h.transport.reads().iter().filter(|(d, _)| d == "a").count();
        assert_eq!(reads_a, 1);
    }

    #[tokio::test]
    async fn test_retry_count_bounds_attempts() {
        let transport = MockTransport::new(|_, _| Err(LinkError::io("reset")));
        let mut dev = device("a", &[1]);
        dev.retry_count = 2;
        let mut h = harness(vec![dev], transport);

        h.scheduler.run_pass(&CancellationToken::new()).await;
        assert_eq!(h.transport.reads().len(), 3);
        assert_eq!(h.batch.entry("a").unwrap().failed, 1);
    }

    #[tokio::test]
    async fn test_exception_is_not_retried() {
        let transport = MockTransport::new(|_, _| {
            Err(LinkError::Exception {
                function: 3,
                code: 2,
            })
        });
        let mut dev = device("a", &[1]);
        dev.retry_count = 3;
        let mut h = harness(vec![dev], transport);

        h.scheduler.run_pass(&CancellationToken::new()).await;
        assert_eq!(h.transport.reads().len(), 1);
    }

    #[tokio::test]
    async fn test_calibration_applied_to_data_point() {
        let transport = MockTransport::new(|_, _| Ok(vec![2305]));
        let mut dev = device("a", &[100]);
        dev.registers[0].calibration = Calibration {
            scale: 0.1,
            offset: -0.5,
        };
        let mut h = harness(vec![dev], transport);

        h.scheduler.run_pass(&CancellationToken::new()).await;
        let point = h.rx.try_recv().unwrap();
        assert!((point.value - 230.0).abs() < 1e-9);
        assert_eq!(point.register_name, "Register 100");
        assert_eq!(point.unit, "V");
        assert!(point.timestamp.is_some());
    }

    #[tokio::test]
    async fn test_address_overflow_skipped_before_transport() {
        let mut dev = device("a", &[65534, 65535, 10]);
        dev.registers[1].data_type = BaseType::UInt32;
        dev.registers[0].data_type = BaseType::UInt32;
        let mut h = harness(vec![dev], MockTransport::new(echo_address));

        h.scheduler.run_pass(&CancellationToken::new()).await;

        let addresses: Vec<u16> = h.transport.reads().into_iter().map(|(_, a)| a).collect();
        assert_eq!(addresses, vec![65534, 10]);
        assert_eq!(h.batch.entry("a").unwrap().expected, 2);
    }

    // ========================================================================
    // Cadence
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_device_polled_once_per_cadence() {
        let mut h = harness(vec![device("a", &[1])], MockTransport::new(echo_address));
        let token = CancellationToken::new();

        h.scheduler.run_pass(&token).await;
        h.scheduler.run_pass(&token).await;
        assert_eq!(h.transport.reads().len(), 1);

        tokio::time::advance(Duration::from_millis(1000)).await;
        h.scheduler.run_pass(&token).await;
        assert_eq!(h.transport.reads().len(), 2);
        assert!(h.scheduler.timer("a").unwrap().last_read.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_register_override_cadence() {
        let mut dev = device("a", &[1, 2]);
        dev.registers[1].refresh_rate_ms = Some(200);
        let mut h = harness(vec![dev], MockTransport::new(echo_address));
        let token = CancellationToken::new();

        h.scheduler.run_pass(&token).await;
        assert_eq!(h.batch.entry("a").unwrap().expected, 2);

        tokio::time::advance(Duration::from_millis(200)).await;
        h.scheduler.run_pass(&token).await;
        assert_eq!(h.batch.entry("a").unwrap().expected, 1);

        let addresses: Vec<u16> = h.transport.reads().into_iter().map(|(_, a)| a).collect();
        assert_eq!(addresses, vec![1, 2, 2]);
    }

    #[tokio::test]
    async fn test_malformed_device_skipped_without_timer() {
        let mut empty_target = device("a", &[1]);
        empty_target.target = DeviceTarget::Tcp {
            host: " ".to_string(),
            port: 502,
            unit_id: 1,
        };
        let mut h = harness(
            vec![empty_target, device("b", &[]), device("c", &[1])],
            MockTransport::new(echo_address),
        );

        h.scheduler.run_pass(&CancellationToken::new()).await;
        assert!(h.scheduler.timer("a").is_none());
        assert!(h.scheduler.timer("b").is_none());
        assert!(h.scheduler.timer("c").is_some());
        assert_eq!(h.batch.len(), 1);
    }

    // ========================================================================
    // Reconfiguration, network and cancellation
    // ========================================================================

    #[tokio::test(start_paused = true)]
    async fn test_device_removed_mid_pass() {
        let mut h = harness(
            vec![device("a", &[1]), device("b", &[2])],
            MockTransport::new(echo_address),
        );
        let store = h.store.clone();
        *h.transport.on_read.lock() = Some(Box::new(move |device_id: &str| {
            if device_id == "a" {
                store.remove_device("b");
            }
        }));
        let token = CancellationToken::new();

        assert_eq!(h.scheduler.run_pass(&token).await, PassOutcome::Aborted);
        assert!(h.scheduler.timer("b").is_none());
        assert_eq!(h.scheduler.devices().len(), 1);

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert_eq!(h.scheduler.run_pass(&token).await, PassOutcome::Completed);
        assert!(h.transport.reads().iter().all(|(d, _)| d == "a"));
        assert!(h.batch.entry("b").is_none());
    }

    #[tokio::test]
    async fn test_added_device_picked_up_next_pass() {
        let mut h = harness(vec![device("a", &[1])], MockTransport::new(echo_address));
        let token = CancellationToken::new();
        h.scheduler.run_pass(&token).await;

        h.store.upsert_device(device("b", &[5]));
        assert_eq!(h.scheduler.run_pass(&token).await, PassOutcome::Completed);
        assert_eq!(h.batch.entry("b").unwrap().succeeded, 1);
    }

    #[tokio::test]
    async fn test_line_devices_not_in_network_snapshot() {
        let mut serial = device("rtu", &[1]);
        serial.target = DeviceTarget::Serial {
            line: "/dev/ttyS0".to_string(),
            unit_id: 2,
        };
        let h = harness(vec![serial, device("a", &[1])], MockTransport::new(echo_address));
        let ids: Vec<_> = h.scheduler.devices().iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test]
    async fn test_no_uplink_skips_pass() {
        let mut h = harness(vec![device("a", &[1])], MockTransport::new(echo_address));
        h.network.set(ActiveTransport::None);

        assert_eq!(
            h.scheduler.run_pass(&CancellationToken::new()).await,
            PassOutcome::Skipped
        );
        assert!(h.transport.reads().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_first_device() {
        let mut h = harness(vec![device("a", &[1])], MockTransport::new(echo_address));
        let token = CancellationToken::new();
        token.cancel();

        assert_eq!(h.scheduler.run_pass(&token).await, PassOutcome::Cancelled);
        assert!(h.transport.reads().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_between_registers() {
        let mut h = harness(
            vec![device("a", &[1, 2, 3, 4]), device("b", &[7])],
            MockTransport::new(echo_address),
        );
        let token = CancellationToken::new();
        let trigger = token.clone();
        let mut seen = 0;
        *h.transport.on_read.lock() = Some(Box::new(move |_device_id: &str| {
            seen += 1;
            if seen == 2 {
                trigger.cancel();
            }
        }));

        assert_eq!(h.scheduler.run_pass(&token).await, PassOutcome::Cancelled);
        assert_eq!(
            h.transport.reads(),
            vec![("a".to_string(), 1), ("a".to_string(), 2)]
        );
        assert!(h.scheduler.timer("a").unwrap().last_read.is_some());
        assert!(h.scheduler.timer("b").is_none());

        let entry = h.batch.entry("a").unwrap();
        assert_eq!((entry.expected, entry.succeeded, entry.failed), (4, 2, 0));
        assert!(!h.batch.is_batch_complete());

        let mut delivered = 0;
        while h.rx.try_recv().is_ok() {
            delivered += 1;
        }
        assert_eq!(delivered, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_runs_on_interval() {
        let mut h = harness(vec![device("a", &[1])], MockTransport::new(echo_address));
        let token = CancellationToken::new();

        h.scheduler.run_pass(&token).await;
        assert_eq!(*h.transport.maintained.lock(), 0);

        tokio::time::advance(Duration::from_millis(5000)).await;
        h.scheduler.run_pass(&token).await;
        assert_eq!(*h.transport.maintained.lock(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let h = harness(vec![device("a", &[1])], MockTransport::new(echo_address));
        let transport = h.transport.clone();
        let token = CancellationToken::new();
        let task = tokio::spawn(h.scheduler.run(token.clone()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
        task.await.unwrap();
        assert_eq!(transport.reads().len(), 1);
    }
}
