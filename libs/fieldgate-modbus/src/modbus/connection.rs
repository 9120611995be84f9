//! Modbus TCP connection
//!
//! One request/response pair in flight per connection. Every blocking step
//! (connect, write, read) is bounded by the caller's timeout.

use super::constants::{MAX_MBAP_LENGTH, MBAP_HEADER_LEN};
use crate::error::{LinkError, Result};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

/// Established Modbus TCP connection
#[derive(Debug)]
pub struct ModbusConnection {
    endpoint: String,
    stream: TcpStream,
}

impl ModbusConnection {
    /// Connect to `host:port`
    ///
    /// Refusal and connect timeout both surface as [`LinkError::Connection`]:
    /// the endpoint is unreachable either way.
    pub async fn connect_tcp(endpoint: &str, timeout_duration: Duration) -> Result<Self> {
        debug!("TCP connecting: {}", endpoint);

        match timeout(timeout_duration, TcpStream::connect(endpoint)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("TCP_NODELAY: {}", e);
                }
                info!("TCP connected: {}", endpoint);
                Ok(Self {
                    endpoint: endpoint.to_string(),
                    stream,
                })
            },
            Ok(Err(e)) => {
                error!("TCP err: {} - {}", endpoint, e);
                Err(LinkError::connection(format!(
                    "Failed to connect to {endpoint}: {e}"
                )))
            },
            Err(_) => {
                warn!("TCP timeout: {}", endpoint);
                Err(LinkError::connection(format!(
                    "Connection to {endpoint} timed out"
                )))
            },
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Write a complete frame
    pub async fn send(&mut self, data: &[u8], timeout_duration: Duration) -> Result<()> {
        trace!("TCP TX {}: {}", self.endpoint, hex(data));
        match timeout(timeout_duration, self.stream.write_all(data)).await {
            Ok(Ok(())) => {
                debug!("TCP TX: {}B", data.len());
                Ok(())
            },
            Ok(Err(e)) => {
                error!("TCP TX: {}", e);
                Err(LinkError::io(format!("TCP send error: {e}")))
            },
            Err(_) => Err(LinkError::timeout("TCP send timeout")),
        }
    }

    /// Read exactly one MBAP frame
    pub async fn receive(&mut self, timeout_duration: Duration) -> Result<Vec<u8>> {
        let mut header = [0u8; MBAP_HEADER_LEN];
        match timeout(timeout_duration, self.stream.read_exact(&mut header)).await {
            Ok(Ok(_)) => {},
            Ok(Err(e)) => {
                error!("TCP header RX: {}", e);
                return Err(LinkError::io(format!("TCP header read error: {e}")));
            },
            Err(_) => {
                debug!("TCP header timeout");
                return Err(LinkError::timeout("TCP header read timeout"));
            },
        }

        // length counts the unit id, which is already in the header
        let length = usize::from(u16::from_be_bytes([header[4], header[5]]));
        if length < 2 || length > MAX_MBAP_LENGTH {
            error!("TCP invalid len: {}", length);
            return Err(LinkError::protocol(format!(
                "Invalid TCP frame length: {length}"
            )));
        }

        let total_size = MBAP_HEADER_LEN - 1 + length;
        let mut frame = vec![0u8; total_size];
        frame[..MBAP_HEADER_LEN].copy_from_slice(&header);

        match timeout(
            timeout_duration,
            self.stream.read_exact(&mut frame[MBAP_HEADER_LEN..]),
        )
        .await
        {
            Ok(Ok(_)) => {
                debug!("TCP RX: {}B", total_size);
                trace!("TCP RX {}: {}", self.endpoint, hex(&frame));
                Ok(frame)
            },
            Ok(Err(e)) => {
                error!("TCP PDU RX: {}", e);
                Err(LinkError::io(format!("TCP PDU read error: {e}")))
            },
            Err(_) => {
                debug!("TCP PDU timeout");
                Err(LinkError::timeout("TCP PDU read timeout"))
            },
        }
    }

    /// Send a request and wait for the next frame
    pub async fn send_and_receive(
        &mut self,
        request: &[u8],
        timeout_duration: Duration,
    ) -> Result<Vec<u8>> {
        self.send(request, timeout_duration).await?;
        self.receive(timeout_duration).await
    }

    /// Close the write half; the socket is released on drop
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("TCP close {}: {}", self.endpoint, e);
        }
    }
}

fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}
