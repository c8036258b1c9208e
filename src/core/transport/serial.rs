//! Serial bus transport
//!
//! UART byte transport over `tokio-serial`. One instance per physical bus
//! (addressed multi-drop, relay rack, modem link).

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, error};

use super::traits::{BusTransport, TransportError, TransportStats};
use crate::utils::hex;

/// Serial port configuration
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Transport name for logging
    pub name: String,
    /// Serial device path
    pub device: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1-2)
    pub stop_bits: u8,
    /// Parity: none, even, odd
    pub parity: String,
}

impl SerialConfig {
    fn data_bits(&self) -> tokio_serial::DataBits {
        match self.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        }
    }

    fn stop_bits(&self) -> tokio_serial::StopBits {
        match self.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        }
    }

    fn parity(&self) -> tokio_serial::Parity {
        match self.parity.as_str() {
            "even" => tokio_serial::Parity::Even,
            "odd" => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        }
    }
}

impl From<&crate::config::BusConfig> for SerialConfig {
    fn from(cfg: &crate::config::BusConfig) -> Self {
        Self {
            name: "addressed-bus".to_string(),
            device: cfg.device.clone(),
            baud_rate: cfg.baud_rate,
            data_bits: cfg.data_bits,
            stop_bits: cfg.stop_bits,
            parity: cfg.parity.clone(),
        }
    }
}

impl From<&crate::config::RackConfig> for SerialConfig {
    fn from(cfg: &crate::config::RackConfig) -> Self {
        Self {
            name: "relay-rack".to_string(),
            device: cfg.device.clone(),
            baud_rate: cfg.baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: "none".to_string(),
        }
    }
}

impl From<&crate::config::ModemConfig> for SerialConfig {
    fn from(cfg: &crate::config::ModemConfig) -> Self {
        Self {
            name: "radio-modem".to_string(),
            device: cfg.device.clone(),
            baud_rate: cfg.baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: "none".to_string(),
        }
    }
}

/// Serial transport implementation
#[derive(Debug)]
pub struct SerialBusTransport {
    config: SerialConfig,
    stream: Option<SerialStream>,
    stats: TransportStats,
}

impl SerialBusTransport {
    /// Create a new serial transport; the port is opened on `connect`.
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            stream: None,
            stats: TransportStats::new(),
        }
    }
}

#[async_trait]
impl BusTransport for SerialBusTransport {
    fn transport_type(&self) -> &str {
        "serial"
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.stream.is_some() {
            return Ok(());
        }

        debug!(
            "[{}] opening serial port {} @ {} baud",
            self.config.name, self.config.device, self.config.baud_rate
        );

        let builder = tokio_serial::new(&self.config.device, self.config.baud_rate)
            .data_bits(self.config.data_bits())
            .stop_bits(self.config.stop_bits())
            .parity(self.config.parity());

        match builder.open_native_async() {
            Ok(stream) => {
                self.stream = Some(stream);
                self.stats.successful_connections += 1;
                Ok(())
            }
            Err(e) => {
                error!(
                    "[{}] failed to open serial port {}: {}",
                    self.config.name, self.config.device, e
                );
                self.stats.failed_connections += 1;
                Err(TransportError::ConnectionFailed(format!(
                    "{}: {e}",
                    self.config.device
                )))
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        if self.stream.take().is_some() {
            self.stats.disconnections += 1;
            debug!("[{}] serial port closed", self.config.name);
        }
        Ok(())
    }

    async fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        stream
            .write_all(data)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        stream
            .flush()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        self.stats.record_bytes_sent(data.len());
        debug!("[{}] TX: {}", self.config.name, hex::dump(data));
        Ok(data.len())
    }

    async fn receive(
        &mut self,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        // A zero timeout still needs one poll of the reactor to drain
        // buffered bytes, so clamp to a minimal wait.
        let wait = timeout.max(Duration::from_millis(1));
        match tokio::time::timeout(wait, stream.read(buffer)).await {
            Ok(Ok(n)) => {
                if n > 0 {
                    self.stats.record_bytes_received(n);
                    debug!("[{}] RX: {}", self.config.name, hex::dump(&buffer[..n]));
                }
                Ok(n)
            }
            Ok(Err(e)) => Err(TransportError::ReceiveFailed(e.to_string())),
            Err(_) => Ok(0),
        }
    }

    async fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
