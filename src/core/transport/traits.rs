//! Transport layer traits
//!
//! Defines the byte-transport interface shared by the addressed bus, the
//! relay-rack link and the modem link, plus per-transport statistics.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Transport layer error types
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Send operation failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Receive operation failed
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Transport is not connected
    #[error("Not connected")]
    NotConnected,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<TransportError> for crate::error::NodeBusError {
    fn from(err: TransportError) -> Self {
        crate::error::NodeBusError::Transport(err.to_string())
    }
}

/// Transport statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportStats {
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Frames sent through this transport
    pub frames_sent: u64,
    /// Number of successful connections
    pub successful_connections: u64,
    /// Number of failed connections
    pub failed_connections: u64,
    /// Number of disconnections
    pub disconnections: u64,
}

impl TransportStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_bytes_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
        self.frames_sent += 1;
    }

    pub fn record_bytes_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Byte-transport interface for all physical buses.
///
/// `receive` returns the bytes currently available, up to the buffer size;
/// a `Duration::ZERO` timeout polls without blocking, which is how the
/// reply waiter pumps its line ring once per granule.
#[async_trait]
pub trait BusTransport: Send + Sync + fmt::Debug {
    /// Transport type identifier ("serial", "mock")
    fn transport_type(&self) -> &str;

    /// Human-readable transport name
    fn name(&self) -> &str;

    /// Open the underlying device
    async fn connect(&mut self) -> std::result::Result<(), TransportError>;

    /// Close the underlying device
    async fn disconnect(&mut self) -> std::result::Result<(), TransportError>;

    /// Send raw bytes; returns the number of bytes written
    async fn send(&mut self, data: &[u8]) -> std::result::Result<usize, TransportError>;

    /// Receive available bytes into `buffer`; returns the number read.
    ///
    /// Returns `Ok(0)` when nothing is pending within `timeout`.
    async fn receive(
        &mut self,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> std::result::Result<usize, TransportError>;

    /// Whether the device is currently open
    async fn is_connected(&self) -> bool;

    /// Transport statistics snapshot
    async fn stats(&self) -> TransportStats;
}

#[async_trait]
impl BusTransport for Box<dyn BusTransport> {
    fn transport_type(&self) -> &str {
        self.as_ref().transport_type()
    }

    fn name(&self) -> &str {
        self.as_ref().name()
    }

    async fn connect(&mut self) -> std::result::Result<(), TransportError> {
        self.as_mut().connect().await
    }

    async fn disconnect(&mut self) -> std::result::Result<(), TransportError> {
        self.as_mut().disconnect().await
    }

    async fn send(&mut self, data: &[u8]) -> std::result::Result<usize, TransportError> {
        self.as_mut().send(data).await
    }

    async fn receive(
        &mut self,
        buffer: &mut [u8],
        timeout: Duration,
    ) -> std::result::Result<usize, TransportError> {
        self.as_mut().receive(buffer, timeout).await
    }

    async fn is_connected(&self) -> bool {
        self.as_ref().is_connected().await
    }

    async fn stats(&self) -> TransportStats {
        self.as_ref().stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_stats() {
        let mut stats = TransportStats::new();
        assert_eq!(stats.bytes_sent, 0);

        stats.record_bytes_sent(10);
        stats.record_bytes_sent(5);
        stats.record_bytes_received(7);
        assert_eq!(stats.bytes_sent, 15);
        assert_eq!(stats.frames_sent, 2);
        assert_eq!(stats.bytes_received, 7);

        stats.reset();
        assert_eq!(stats.bytes_sent, 0);
        assert_eq!(stats.frames_sent, 0);
    }

    #[test]
    fn test_transport_error_display() {
        let error = TransportError::SendFailed("port gone".to_string());
        assert!(error.to_string().contains("Send failed"));
        assert!(error.to_string().contains("port gone"));
    }
}
