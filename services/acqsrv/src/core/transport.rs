//! Field transports
//!
//! A transport turns one register descriptor into the raw words the device
//! returned. The networked transport checks a connection out of the pool,
//! runs a single MBAP request/response exchange and hands the connection
//! back, flagged unhealthy when the exchange failed on the wire or the reply
//! answered a different request.

use crate::core::connection_pool::{ConnectionPool, Connector};
use async_trait::async_trait;
use fieldgate_modbus::modbus::{
    build_read_request, parse_read_response, DeviceDescriptor, ModbusConnection, ReadRequest,
    RegisterDescriptor, TransactionIdGenerator, TransportFamily,
};
use fieldgate_modbus::{LinkError, Result as LinkResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Reads registers for one transport family
#[async_trait]
pub trait FieldTransport: Send + Sync {
    fn family(&self) -> TransportFamily;

    /// Read the words backing `register`
    async fn read(
        &self,
        device: &DeviceDescriptor,
        register: &RegisterDescriptor,
    ) -> LinkResult<Vec<u16>>;

    /// Periodic housekeeping driven by the scheduler
    async fn maintain(&self) {}
}

/// One request/response round trip on an established link
#[async_trait]
pub trait FrameExchange: Send {
    async fn exchange(&mut self, request: &[u8], timeout: Duration) -> LinkResult<Vec<u8>>;
}

#[async_trait]
impl FrameExchange for ModbusConnection {
    async fn exchange(&mut self, request: &[u8], timeout: Duration) -> LinkResult<Vec<u8>> {
        self.send_and_receive(request, timeout).await
    }
}

/// Modbus TCP transport over the shared connection pool
pub struct TcpFieldTransport<K: Connector> {
    pool: Arc<ConnectionPool<K>>,
    transaction_ids: Arc<TransactionIdGenerator>,
}

impl<K> TcpFieldTransport<K>
where
    K: Connector,
    K::Connection: FrameExchange,
{
    pub fn new(pool: Arc<ConnectionPool<K>>, transaction_ids: Arc<TransactionIdGenerator>) -> Self {
        Self {
            pool,
            transaction_ids,
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<K>> {
        &self.pool
    }
}

#[async_trait]
impl<K> FieldTransport for TcpFieldTransport<K>
where
    K: Connector,
    K::Connection: FrameExchange,
{
    fn family(&self) -> TransportFamily {
        TransportFamily::Network
    }

    async fn read(
        &self,
        device: &DeviceDescriptor,
        register: &RegisterDescriptor,
    ) -> LinkResult<Vec<u16>> {
        register.validate_address_range()?;

        let endpoint = device.target.endpoint();
        let timeout = device.timeout();
        let mut handle = self.pool.acquire(&endpoint, timeout).await?;

        let request = ReadRequest {
            transaction_id: self.transaction_ids.next_id(),
            unit_id: device.target.unit_id(),
            function: register.function_code,
            address: register.address,
            quantity: register.register_count(),
        };
        let frame = build_read_request(&request);

        let result = match handle.connection_mut().exchange(&frame, timeout).await {
            Ok(response) => parse_read_response(&request, &response),
            Err(e) => Err(e),
        };

        let healthy = match &result {
            Ok(_) | Err(LinkError::Exception { .. }) => true,
            Err(e) => !e.poisons_connection(),
        };
        if !healthy {
            debug!("{}: dropping connection to {}", device.id, endpoint);
        }
        self.pool.release(handle, healthy).await;

        result.map(|r| r.into_words())
    }

    async fn maintain(&self) {
        let evicted = self.pool.evict_idle().await;
        if evicted > 0 {
            debug!("Pool maintenance evicted {}", evicted);
        }
        self.pool.emergency_flush().await;
    }
}
