//! Radio uplink/downlink over an AT command modem.
//!
//! Uplink payloads are capped at 12 bytes; a downlink, when requested with
//! the uplink, is a fixed 8-byte frame returned by the network.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::ModemConfig;
use crate::core::bus::{wait_reply, DecodeMode, LineRing, ReplyKind, ReplyOutcome, ReplySpec};
use crate::core::registers::Direction;
use crate::core::transport::BusTransport;
use crate::error::{NodeBusError, Result};
use crate::utils::hex;

/// Hard uplink payload cap, set by the radio network
pub const MAX_UPLINK_PAYLOAD: usize = 12;
/// Every downlink frame is exactly this long
pub const DOWNLINK_FRAME_LEN: usize = 8;

#[async_trait]
pub trait RadioLink: Send {
    /// Transmit one uplink payload.
    ///
    /// With `request_downlink` set, blocks for the network round trip and
    /// returns the downlink frame if one was pending.
    async fn send(
        &mut self,
        payload: &[u8],
        request_downlink: bool,
    ) -> Result<Option<[u8; DOWNLINK_FRAME_LEN]>>;
}

/// Radio link through an AT modem on its own serial port
pub struct ModemRadioLink {
    transport: Box<dyn BusTransport>,
    ring: LineRing,
    config: ModemConfig,
}

impl ModemRadioLink {
    pub fn new(transport: Box<dyn BusTransport>, config: ModemConfig) -> Self {
        Self {
            transport,
            ring: LineRing::new(DecodeMode::Direct),
            config,
        }
    }

    fn reply_spec(&self, kind: ReplyKind) -> ReplySpec {
        ReplySpec {
            kind,
            expected_source: None,
            reply_timeout: Duration::from_millis(self.config.reply_timeout_ms),
            sequence_timeout: Duration::from_millis(self.config.sequence_timeout_ms),
            poll_granule: Duration::from_millis(10),
        }
    }

    async fn exchange(&mut self, command: &str, kind: ReplyKind) -> Result<ReplyOutcome> {
        if !self.transport.is_connected().await {
            self.transport.connect().await?;
        }
        self.ring.clear();
        let mut frame = command.as_bytes().to_vec();
        frame.push(0x0D);
        self.transport.send(&frame).await?;
        let spec = self.reply_spec(kind);
        wait_reply(self.transport.as_mut(), &mut self.ring, &spec, Direction::Write).await
    }

    fn parse_downlink(line: &str) -> Result<[u8; DOWNLINK_FRAME_LEN]> {
        // Modem reports a downlink as "RX=<16 hex digits>".
        let token = line
            .trim()
            .strip_prefix("RX=")
            .ok_or_else(|| NodeBusError::parsing(format!("unexpected downlink line: {line:?}")))?;
        let bytes = hex::parse(token)
            .ok_or_else(|| NodeBusError::parsing(format!("bad downlink hex: {token:?}")))?;
        let mut frame = [0u8; DOWNLINK_FRAME_LEN];
        if bytes.len() != DOWNLINK_FRAME_LEN {
            return Err(NodeBusError::parsing(format!(
                "downlink frame is {} bytes, expected {}",
                bytes.len(),
                DOWNLINK_FRAME_LEN
            )));
        }
        frame.copy_from_slice(&bytes);
        Ok(frame)
    }
}

#[async_trait]
impl RadioLink for ModemRadioLink {
    async fn send(
        &mut self,
        payload: &[u8],
        request_downlink: bool,
    ) -> Result<Option<[u8; DOWNLINK_FRAME_LEN]>> {
        if payload.is_empty() || payload.len() > self.config.max_payload {
            return Err(NodeBusError::PayloadOverflow {
                size: payload.len(),
                max: self.config.max_payload,
            });
        }

        let command = if request_downlink {
            format!("AT$SF={},1", hex::compact(payload))
        } else {
            format!("AT$SF={}", hex::compact(payload))
        };
        info!("radio uplink: {} bytes [{}]", payload.len(), hex::dump(payload));

        let kind = if request_downlink {
            // The downlink line arrives before the final OK; accept it raw.
            ReplyKind::Raw
        } else {
            ReplyKind::Ok
        };
        let outcome = self.exchange(&command, kind).await?;

        if outcome.status.any() {
            warn!("radio uplink failed: status 0x{:02X}", outcome.status.as_byte());
            return Err(NodeBusError::radio(format!(
                "modem did not acknowledge uplink (status 0x{:02X})",
                outcome.status.as_byte()
            )));
        }

        if !request_downlink {
            return Ok(None);
        }

        let line = outcome
            .line
            .ok_or_else(|| NodeBusError::radio("modem reply vanished".to_string()))?;
        if line.trim() == "OK" {
            // Acknowledged with no downlink pending.
            debug!("no downlink pending");
            return Ok(None);
        }
        let frame = Self::parse_downlink(&line)?;
        debug!("radio downlink: [{}]", hex::dump(&frame));
        Ok(Some(frame))
    }
}

/// Scripted radio link for tests
#[derive(Clone, Default)]
pub struct MockRadioLink {
    state: Arc<Mutex<MockRadioState>>,
}

#[derive(Default)]
struct MockRadioState {
    uplinks: Vec<Vec<u8>>,
    downlinks: VecDeque<[u8; DOWNLINK_FRAME_LEN]>,
    fail_sends: bool,
}

impl MockRadioLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_downlink(&self, frame: [u8; DOWNLINK_FRAME_LEN]) {
        self.state.lock().downlinks.push_back(frame);
    }

    pub fn uplinks(&self) -> Vec<Vec<u8>> {
        self.state.lock().uplinks.clone()
    }

    pub fn set_send_failure(&self, fail: bool) {
        self.state.lock().fail_sends = fail;
    }
}

#[async_trait]
impl RadioLink for MockRadioLink {
    async fn send(
        &mut self,
        payload: &[u8],
        request_downlink: bool,
    ) -> Result<Option<[u8; DOWNLINK_FRAME_LEN]>> {
        if payload.is_empty() || payload.len() > MAX_UPLINK_PAYLOAD {
            return Err(NodeBusError::PayloadOverflow {
                size: payload.len(),
                max: MAX_UPLINK_PAYLOAD,
            });
        }
        let mut state = self.state.lock();
        if state.fail_sends {
            return Err(NodeBusError::radio("simulated radio failure".to_string()));
        }
        state.uplinks.push(payload.to_vec());
        if request_downlink {
            Ok(state.downlinks.pop_front())
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::MockBusTransport;

    fn modem_config() -> ModemConfig {
        ModemConfig {
            device: "/dev/null".to_string(),
            baud_rate: 9600,
            reply_timeout_ms: 200,
            sequence_timeout_ms: 1000,
            max_payload: 12,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_uplink_without_downlink() {
        let (mut transport, handle) = MockBusTransport::new("modem");
        transport.connect().await.unwrap();
        handle.set_responder(|frame| {
            assert_eq!(frame, b"AT$SF=0102AB\r");
            Some(b"OK\r".to_vec())
        });

        let mut link = ModemRadioLink::new(Box::new(transport), modem_config());
        let downlink = link.send(&[0x01, 0x02, 0xAB], false).await.unwrap();
        assert!(downlink.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_uplink_with_downlink() {
        let (mut transport, handle) = MockBusTransport::new("modem");
        transport.connect().await.unwrap();
        handle.set_responder(|frame| {
            assert_eq!(frame, b"AT$SF=FF,1\r");
            Some(b"RX=0205040000012C00\r".to_vec())
        });

        let mut link = ModemRadioLink::new(Box::new(transport), modem_config());
        let downlink = link.send(&[0xFF], true).await.unwrap().unwrap();
        assert_eq!(downlink, [0x02, 0x05, 0x04, 0x00, 0x00, 0x01, 0x2C, 0x00]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_downlink_request_with_nothing_pending() {
        let (mut transport, handle) = MockBusTransport::new("modem");
        transport.connect().await.unwrap();
        handle.set_responder(|_| Some(b"OK\r".to_vec()));

        let mut link = ModemRadioLink::new(Box::new(transport), modem_config());
        let downlink = link.send(&[0x00], true).await.unwrap();
        assert!(downlink.is_none());
    }

    #[tokio::test]
    async fn test_payload_cap_enforced() {
        let mut link = MockRadioLink::new();
        let too_big = [0u8; 13];
        assert!(link.send(&too_big, false).await.is_err());
        assert!(link.send(&[], false).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_link_queues() {
        let mut link = MockRadioLink::new();
        link.queue_downlink([1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(
            link.send(&[0xAA], true).await.unwrap(),
            Some([1, 2, 3, 4, 5, 6, 7, 8])
        );
        assert_eq!(link.send(&[0xBB], true).await.unwrap(), None);
        assert_eq!(link.uplinks(), vec![vec![0xAA], vec![0xBB]]);
    }
}
