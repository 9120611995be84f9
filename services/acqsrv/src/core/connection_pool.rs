//! Bounded connection pool keyed by endpoint
//!
//! One pooled entry per `host:port`. The pool lock is a short critical
//! section around the entry table and is never held across a connect or a
//! close. A slot is reserved before connecting so concurrent acquires never
//! exceed `max_size`.

use async_trait::async_trait;
use common::MemoryProbe;
use fieldgate_modbus::modbus::ModbusConnection;
use fieldgate_modbus::{LinkError, Result as LinkResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

/// Creates and closes transport connections for the pool
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Send + 'static;

    async fn connect(&self, endpoint: &str, timeout: Duration) -> LinkResult<Self::Connection>;

    async fn close(&self, connection: Self::Connection) {
        drop(connection);
    }
}

/// Modbus TCP connector
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Connection = ModbusConnection;

    async fn connect(&self, endpoint: &str, timeout: Duration) -> LinkResult<ModbusConnection> {
        ModbusConnection::connect_tcp(endpoint, timeout).await
    }

    async fn close(&self, connection: ModbusConnection) {
        connection.close().await;
    }
}

/// Connection pool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of pooled entries
    pub max_size: usize,
    /// Maximum age of a connection before it's retired
    pub max_age_secs: u64,
    /// Maximum idle time before a connection is closed
    pub max_idle_secs: u64,
    /// Below this much available memory the pool is flushed
    pub min_free_memory_bytes: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            max_age_secs: 600,
            max_idle_secs: 60,
            min_free_memory_bytes: 4 * 1024 * 1024,
        }
    }
}

impl PoolConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Connecting,
    Idle,
    InUse,
}

/// Pooled connection with metadata
struct PoolEntry<C> {
    connection: Option<C>,
    state: EntryState,
    created_at: Instant,
    last_used: Instant,
    use_count: u64,
    healthy: bool,
    generation: u64,
}

impl<C> PoolEntry<C> {
    fn reserved(generation: u64, now: Instant) -> Self {
        Self {
            connection: None,
            state: EntryState::Connecting,
            created_at: now,
            last_used: now,
            use_count: 0,
            healthy: true,
            generation,
        }
    }

    fn is_expired(&self, now: Instant, max_age: Duration) -> bool {
        now.duration_since(self.created_at) > max_age
    }

    fn is_idle(&self, now: Instant, max_idle: Duration) -> bool {
        now.duration_since(self.last_used) > max_idle
    }

    /// Candidate for `evict_idle`
    ///
    /// Checkouts and connects outstanding for longer than `max_idle` were
    /// abandoned by their caller and are reclaimed as well.
    fn is_stale(&self, now: Instant, config: &PoolConfig) -> bool {
        match self.state {
            EntryState::Idle => {
                !self.healthy
                    || self.is_idle(now, config.max_idle())
                    || self.is_expired(now, config.max_age())
            },
            EntryState::InUse | EntryState::Connecting => self.is_idle(now, config.max_idle()),
        }
    }
}

/// A checked-out connection
///
/// Must be handed back through [`ConnectionPool::release`].
pub struct PooledHandle<C> {
    endpoint: String,
    /// `None` for an overflow connection that never occupies a slot
    generation: Option<u64>,
    connection: C,
}

impl<C> PooledHandle<C> {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_overflow(&self) -> bool {
        self.generation.is_none()
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }
}

enum Plan<C> {
    Reuse { generation: u64, connection: C },
    Connect { generation: Option<u64> },
}

/// Pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub size: usize,
    pub in_use: usize,
    pub capacity: usize,
    pub created_total: u64,
    pub evicted_total: u64,
    pub overflow_total: u64,
}

/// Bounded connection pool
pub struct ConnectionPool<K: Connector> {
    config: PoolConfig,
    connector: K,
    probe: Arc<dyn MemoryProbe>,
    entries: Mutex<HashMap<String, PoolEntry<K::Connection>>>,
    generations: AtomicU64,
    created_total: AtomicU64,
    evicted_total: AtomicU64,
    overflow_total: AtomicU64,
}

impl<K: Connector> ConnectionPool<K> {
    pub fn new(config: PoolConfig, connector: K, probe: Arc<dyn MemoryProbe>) -> Self {
        Self {
            config,
            connector,
            probe,
            entries: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(1),
            created_total: AtomicU64::new(0),
            evicted_total: AtomicU64::new(0),
            overflow_total: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Check out a connection to `endpoint`, connecting if needed
    ///
    /// A connect failure or timeout fails the call; nothing is retried here.
    pub async fn acquire(
        &self,
        endpoint: &str,
        connect_timeout: Duration,
    ) -> LinkResult<PooledHandle<K::Connection>> {
        let (plan, victim) = self.plan_acquire(endpoint)?;
        if let Some(victim) = victim {
            self.connector.close(victim).await;
        }

        match plan {
            Plan::Reuse {
                generation,
                connection,
            } => Ok(PooledHandle {
                endpoint: endpoint.to_string(),
                generation: Some(generation),
                connection,
            }),
            Plan::Connect { generation } => self.connect(endpoint, connect_timeout, generation).await,
        }
    }

    fn plan_acquire(
        &self,
        endpoint: &str,
    ) -> LinkResult<(Plan<K::Connection>, Option<K::Connection>)> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get_mut(endpoint) {
            if entry.state != EntryState::Idle {
                return Ok((Plan::Connect { generation: None }, None));
            }

            if entry.healthy && !entry.is_expired(now, self.config.max_age()) {
                if let Some(connection) = entry.connection.take() {
                    entry.state = EntryState::InUse;
                    entry.last_used = now;
                    entry.use_count += 1;
                    return Ok((
                        Plan::Reuse {
                            generation: entry.generation,
                            connection,
                        },
                        None,
                    ));
                }
            }

            // Unhealthy or expired: reconnect in place, keeping the slot
            let generation = self.generations.fetch_add(1, Ordering::Relaxed);
            let victim = entry.connection.take();
            *entry = PoolEntry::reserved(generation, now);
            debug!("Reconnecting {}", endpoint);
            return Ok((
                Plan::Connect {
                    generation: Some(generation),
                },
                victim,
            ));
        }

        let mut victim = None;
        if entries.len() >= self.config.max_size {
            let oldest = entries
                .iter()
                .filter(|(_, e)| e.state == EntryState::Idle)
                .min_by_key(|(_, e)| e.last_used)
                .map(|(key, _)| key.clone());

            match oldest {
                Some(key) => {
                    info!("Pool full, evicting {}", key);
                    victim = entries.remove(&key).and_then(|e| e.connection);
                    self.evicted_total.fetch_add(1, Ordering::Relaxed);
                },
                None => {
                    return Err(LinkError::Busy(format!(
                        "Pool full: {} connections in use",
                        entries.len()
                    )));
                },
            }
        }

        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        entries.insert(endpoint.to_string(), PoolEntry::reserved(generation, now));
        Ok((
            Plan::Connect {
                generation: Some(generation),
            },
            victim,
        ))
    }

    async fn connect(
        &self,
        endpoint: &str,
        connect_timeout: Duration,
        generation: Option<u64>,
    ) -> LinkResult<PooledHandle<K::Connection>> {
        let result = match timeout(
            connect_timeout,
            self.connector.connect(endpoint, connect_timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(LinkError::connection(format!(
                "Connection to {endpoint} timed out"
            ))),
        };

        let Some(generation) = generation else {
            let connection = result?;
            self.created_total.fetch_add(1, Ordering::Relaxed);
            self.overflow_total.fetch_add(1, Ordering::Relaxed);
            debug!("Overflow connection: {}", endpoint);
            return Ok(PooledHandle {
                endpoint: endpoint.to_string(),
                generation: None,
                connection,
            });
        };

        let mut entries = self.entries.lock();
        let reserved = matches!(
            entries.get(endpoint),
            Some(e) if e.generation == generation && e.state == EntryState::Connecting
        );

        match result {
            Ok(connection) => {
                self.created_total.fetch_add(1, Ordering::Relaxed);
                let generation = match entries.get_mut(endpoint) {
                    Some(entry) if reserved => {
                        let now = Instant::now();
                        entry.state = EntryState::InUse;
                        entry.created_at = now;
                        entry.last_used = now;
                        entry.use_count = 1;
                        entry.healthy = true;
                        Some(generation)
                    },
                    // Slot flushed while connecting: hand out as overflow
                    _ => None,
                };
                Ok(PooledHandle {
                    endpoint: endpoint.to_string(),
                    generation,
                    connection,
                })
            },
            Err(e) => {
                if reserved {
                    entries.remove(endpoint);
                }
                Err(e)
            },
        }
    }

    /// Return a connection
    ///
    /// Healthy connections go back to the pool; unhealthy ones are closed and
    /// the entry is flagged so the next acquire reconnects in place.
    pub async fn release(&self, handle: PooledHandle<K::Connection>, healthy: bool) {
        let PooledHandle {
            endpoint,
            generation,
            connection,
        } = handle;

        let to_close = match generation {
            None => Some(connection),
            Some(generation) => {
                let mut entries = self.entries.lock();
                match entries.get_mut(&endpoint) {
                    Some(entry)
                        if entry.generation == generation && entry.state == EntryState::InUse =>
                    {
                        entry.state = EntryState::Idle;
                        if healthy {
                            entry.last_used = Instant::now();
                            entry.connection = Some(connection);
                            None
                        } else {
                            warn!("Connection unhealthy: {}", endpoint);
                            entry.healthy = false;
                            Some(connection)
                        }
                    },
                    _ => Some(connection),
                }
            },
        };

        if let Some(connection) = to_close {
            self.connector.close(connection).await;
        }
    }

    /// Drop idle, expired and unhealthy entries
    pub async fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let evicted: Vec<(String, Option<K::Connection>)> = {
            let mut entries = self.entries.lock();
            let stale: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.is_stale(now, &self.config))
                .map(|(key, _)| key.clone())
                .collect();
            stale
                .into_iter()
                .filter_map(|key| entries.remove(&key).map(|e| (key, e.connection)))
                .collect()
        };

        let count = evicted.len();
        if count > 0 {
            self.evicted_total
                .fetch_add(count as u64, Ordering::Relaxed);
        }
        for (endpoint, connection) in evicted {
            debug!("Evicted {}", endpoint);
            if let Some(connection) = connection {
                self.connector.close(connection).await;
            }
        }
        count
    }

    /// Close every connection if available memory is below the threshold
    pub async fn emergency_flush(&self) -> bool {
        let available = self.probe.available_bytes();
        if available >= self.config.min_free_memory_bytes {
            return false;
        }
        warn!(
            "Low memory: {} bytes free, flushing connection pool",
            available
        );
        self.flush().await;
        true
    }

    /// Close every pooled connection
    ///
    /// Checked-out connections are closed when they are released.
    pub async fn flush(&self) -> usize {
        let drained: Vec<PoolEntry<K::Connection>> = {
            let mut entries = self.entries.lock();
            entries.drain().map(|(_, e)| e).collect()
        };
        let count = drained.len();
        self.evicted_total
            .fetch_add(count as u64, Ordering::Relaxed);
        for entry in drained {
            if let Some(connection) = entry.connection {
                self.connector.close(connection).await;
            }
        }
        count
    }

    pub fn stats(&self) -> PoolStats {
        let entries = self.entries.lock();
        PoolStats {
            size: entries.len(),
            in_use: entries
                .values()
                .filter(|e| e.state != EntryState::Idle)
                .count(),
            capacity: self.config.max_size,
            created_total: self.created_total.load(Ordering::Relaxed),
            evicted_total: self.evicted_total.load(Ordering::Relaxed),
            overflow_total: self.overflow_total.load(Ordering::Relaxed),
        }
    }

    /// Use count of the pooled entry for `endpoint`
    pub fn use_count(&self, endpoint: &str) -> Option<u64> {
        self.entries.lock().get(endpoint).map(|e| e.use_count)
    }
}
