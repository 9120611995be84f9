//! In-process Modbus TCP device for integration tests

#![allow(dead_code)]

use fieldgate_modbus::modbus::{DeviceDescriptor, DeviceTarget, FunctionCode, RegisterDescriptor};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Register map and misbehaviour of a simulated device
#[derive(Debug, Clone, Default)]
pub struct DeviceImage {
    pub registers: HashMap<u16, u16>,
    /// Requests starting at these addresses are never answered
    pub silent: HashSet<u16>,
}

impl DeviceImage {
    pub fn with_registers(words: &[(u16, u16)]) -> Self {
        Self {
            registers: words.iter().copied().collect(),
            silent: HashSet::new(),
        }
    }

    pub fn silent_at(mut self, address: u16) -> Self {
        self.silent.insert(address);
        self
    }
}

pub struct ModbusSimulator {
    pub port: u16,
    connections: Arc<AtomicUsize>,
    requests: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl ModbusSimulator {
    pub async fn start(image: DeviceImage) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(AtomicUsize::new(0));
        let image = Arc::new(image);

        let accepted = Arc::clone(&connections);
        let served = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve(stream, Arc::clone(&image), Arc::clone(&served)));
            }
        });

        Self {
            port,
            connections,
            requests,
            handle,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for ModbusSimulator {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut stream: TcpStream, image: Arc<DeviceImage>, served: Arc<AtomicUsize>) {
    let mut request = [0u8; 12];
    while stream.read_exact(&mut request).await.is_ok() {
        served.fetch_add(1, Ordering::SeqCst);
        let fc = request[7];
        let address = u16::from_be_bytes([request[8], request[9]]);
        let quantity = u16::from_be_bytes([request[10], request[11]]);

        if image.silent.contains(&address) {
            continue;
        }

        let mut pdu = vec![request[6], fc];
        if fc <= 2 {
            let bit = image.registers.get(&address).copied().unwrap_or(0) != 0;
            pdu.extend_from_slice(&[1, u8::from(bit)]);
        } else {
            pdu.push((quantity * 2) as u8);
            for offset in 0..quantity {
                let word = image
                    .registers
                    .get(&address.wrapping_add(offset))
                    .copied()
                    .unwrap_or(0);
                pdu.extend_from_slice(&word.to_be_bytes());
            }
        }

        let mut frame = request[0..4].to_vec();
        frame.extend_from_slice(&(pdu.len() as u16).to_be_bytes());
        frame.extend_from_slice(&pdu);
        if stream.write_all(&frame).await.is_err() {
            break;
        }
    }
}

/// A port nothing listens on
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

pub fn holding(address: u16) -> RegisterDescriptor {
    RegisterDescriptor {
        id: format!("hr{address}"),
        name: format!("Holding {address}"),
        unit: String::new(),
        address,
        function_code: FunctionCode::ReadHoldingRegisters,
        data_type: Default::default(),
        byte_order: Default::default(),
        calibration: Default::default(),
        refresh_rate_ms: None,
    }
}

pub fn tcp_device(id: &str, port: u16, registers: Vec<RegisterDescriptor>) -> DeviceDescriptor {
    DeviceDescriptor {
        id: id.to_string(),
        target: DeviceTarget::Tcp {
            host: "127.0.0.1".to_string(),
            port,
            unit_id: 1,
        },
        refresh_rate_ms: 1000,
        timeout_ms: 200,
        retry_count: 0,
        registers,
    }
}
