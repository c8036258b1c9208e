//! Addressed ASCII protocol on the shared multi-drop bus.
//!
//! Every exchange is one frame `[dest|0x80] [src] <ASCII command> CR` and
//! one reply frame back. Reads ask `AT$R=<reg>` and parse a hex value;
//! writes send `AT$W=<reg>,<value>` and require `OK`. A write to part of a
//! register reads the current value first and merges the field in.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::BusConfig;
use crate::core::bus::{
    build_addressed_frame, read_command, write_command, wait_reply, DecodeMode, LineRing,
    ReplyKind, ReplySpec, ValueFormat, PING_COMMAND,
};
use crate::core::registers::{read_field, write_field, AccessStatus, BoardType, Direction};
use crate::core::transport::BusTransport;
use crate::error::Result;

use super::{AccessResult, RegisterProtocol};

pub struct AddressedProtocol {
    transport: Box<dyn BusTransport>,
    ring: LineRing,
    config: BusConfig,
}

impl AddressedProtocol {
    pub fn new(transport: Box<dyn BusTransport>, config: BusConfig) -> Self {
        Self {
            transport,
            ring: LineRing::new(DecodeMode::Addressed),
            config,
        }
    }

    fn reply_spec(&self, kind: ReplyKind, source: u8, reply_timeout_ms: u64) -> ReplySpec {
        ReplySpec {
            kind,
            expected_source: Some(source),
            reply_timeout: Duration::from_millis(reply_timeout_ms),
            sequence_timeout: Duration::from_millis(self.config.sequence_timeout_ms),
            poll_granule: Duration::from_millis(self.config.poll_granule_ms),
        }
    }

    async fn exchange(
        &mut self,
        dest: u8,
        command: &str,
        spec: &ReplySpec,
        direction: Direction,
    ) -> Result<crate::core::bus::ReplyOutcome> {
        let frame = build_addressed_frame(dest, self.config.master_address, command)?;
        self.ring.clear();
        self.transport.send(&frame).await?;
        wait_reply(self.transport.as_mut(), &mut self.ring, spec, direction).await
    }

    /// Probe one address with the identification command.
    pub async fn ping(&mut self, address: u8) -> Result<bool> {
        let spec = self.reply_spec(ReplyKind::Raw, address, self.config.reply_timeout_ms);
        let outcome = self
            .exchange(address, PING_COMMAND, &spec, Direction::Read)
            .await?;
        Ok(!outcome.status.any())
    }

    /// Read a node's identity register and map it to a board type.
    ///
    /// `Ok(None)` means the node answered with an id this firmware does not
    /// know, or did not answer the identity read at all.
    pub async fn identify(&mut self, address: u8) -> Result<Option<BoardType>> {
        let (status, raw) = self
            .read_raw(address, crate::core::registers::boards::common::BOARD_ID)
            .await?;
        if status.any() {
            return Ok(None);
        }
        Ok(raw.and_then(|id| BoardType::from_board_id(id as u8)))
    }

    /// Read the full raw register value, no field extraction.
    async fn read_raw(&mut self, address: u8, reg: u8) -> Result<(AccessStatus, Option<u32>)> {
        let spec = self.reply_spec(
            ReplyKind::Value(ValueFormat::Hexadecimal),
            address,
            self.config.reply_timeout_ms,
        );
        let command = read_command(reg);
        let outcome = self.exchange(address, &command, &spec, Direction::Read).await?;
        Ok((outcome.status, outcome.value))
    }

    async fn write_raw(
        &mut self,
        board: BoardType,
        address: u8,
        reg: u8,
        value: u32,
    ) -> Result<AccessStatus> {
        let spec = self.reply_spec(ReplyKind::Ok, address, board.write_timeout_ms(reg));
        let command = write_command(reg, value);
        let outcome = self.exchange(address, &command, &spec, Direction::Write).await?;
        Ok(outcome.status)
    }
}

#[async_trait]
impl RegisterProtocol for AddressedProtocol {
    async fn init(&mut self) -> Result<()> {
        if !self.transport.is_connected().await {
            self.transport.connect().await?;
        }
        self.ring.clear();
        Ok(())
    }

    async fn deinit(&mut self) -> Result<()> {
        // Leave the port open; just drop anything half-received.
        self.ring.clear();
        Ok(())
    }

    async fn read_register(
        &mut self,
        board: BoardType,
        node_address: u8,
        reg: u8,
        mask: u32,
    ) -> Result<AccessResult> {
        let (status, raw) = self.read_raw(node_address, reg).await?;
        if status.any() {
            warn!(
                "read 0x{:02X}@0x{:02X} failed: status 0x{:02X}",
                reg,
                node_address,
                status.as_byte()
            );
            return Ok(AccessResult {
                status,
                value: board.error_value(reg),
            });
        }
        let raw = raw.unwrap_or_else(|| board.error_value(reg));
        let value = read_field(raw, mask);
        debug!(
            "read 0x{:02X}@0x{:02X}: raw 0x{:08X}, field 0x{:08X}",
            reg, node_address, raw, value
        );
        Ok(AccessResult { status, value })
    }

    async fn write_register(
        &mut self,
        board: BoardType,
        node_address: u8,
        reg: u8,
        mask: u32,
        value: u32,
    ) -> Result<AccessResult> {
        let full_mask = board.register(reg).map(|d| d.mask).unwrap_or(0xFFFF_FFFF);

        let mut image = 0u32;
        let mut status;
        if mask == full_mask {
            status = AccessStatus::new(Direction::Write);
        } else {
            // Partial field: read-modify-write.
            let (read_status, raw) = self.read_raw(node_address, reg).await?;
            if read_status.any() {
                return Ok(AccessResult {
                    status: read_status,
                    value: board.error_value(reg),
                });
            }
            image = raw.unwrap_or(0);
            status = AccessStatus::new(Direction::Write);
            status.merge(read_status);
        }
        let mut written = 0u32;
        write_field(&mut image, &mut written, value, mask);
        let image = board.secure_register(reg, image)?;

        let write_status = self.write_raw(board, node_address, reg, image).await?;
        status.merge(write_status);
        if status.any() {
            warn!(
                "write 0x{:02X}@0x{:02X} failed: status 0x{:02X}",
                reg,
                node_address,
                status.as_byte()
            );
        }
        Ok(AccessResult {
            status,
            value: image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::MockBusTransport;

    fn bus_config() -> BusConfig {
        BusConfig {
            device: "/dev/null".to_string(),
            baud_rate: 19200,
            data_bits: 8,
            stop_bits: 1,
            parity: "none".to_string(),
            master_address: 0x00,
            scan_start: 0x08,
            scan_end: 0x30,
            reply_timeout_ms: 200,
            sequence_timeout_ms: 120_000,
            poll_granule_ms: 10,
        }
    }

    /// Builds a reply frame the way a node would: destination is the master
    /// with the address marker, then the node's own address, then the line.
    fn node_reply(node: u8, text: &str) -> Vec<u8> {
        let mut frame = vec![0x80, node];
        frame.extend_from_slice(text.as_bytes());
        frame.push(0x0D);
        frame
    }

    fn protocol_with_responder(
        node: u8,
        reply: &'static str,
    ) -> AddressedProtocol {
        let (transport, handle) = MockBusTransport::new("bus");
        handle.set_responder(move |_| Some(node_reply(node, reply)));
        AddressedProtocol::new(Box::new(transport), bus_config())
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_alive_node() {
        let mut protocol = protocol_with_responder(0x09, "SENSOR,1.2");
        protocol.init().await.unwrap();
        assert!(protocol.ping(0x09).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_silent_address() {
        let (transport, _handle) = MockBusTransport::new("bus");
        let mut protocol = AddressedProtocol::new(Box::new(transport), bus_config());
        protocol.init().await.unwrap();
        assert!(!protocol.ping(0x11).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_extracts_field() {
        // FW_VERSION raw 0x0102: major 1, minor 2.
        let mut protocol = protocol_with_responder(0x09, "102");
        protocol.init().await.unwrap();

        let result = protocol
            .read_register(
                BoardType::SensorModule,
                0x09,
                crate::core::registers::boards::common::FW_VERSION,
                crate::core::registers::boards::common::FW_VERSION_MAJOR_MASK,
            )
            .await
            .unwrap();
        assert!(!result.status.any());
        assert_eq!(result.value, 0x01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_returns_error_value() {
        let (transport, _handle) = MockBusTransport::new("bus");
        let mut protocol = AddressedProtocol::new(Box::new(transport), bus_config());
        protocol.init().await.unwrap();

        let result = protocol
            .read_register(BoardType::SensorModule, 0x09, 0x04, 0xFFFF)
            .await
            .unwrap();
        assert!(result.status.reply_timeout());
        assert_eq!(result.value, 0xFFFF);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_write_sends_command() {
        let (transport, handle) = MockBusTransport::new("bus");
        handle.set_responder(|frame| {
            // [dest|marker][src]AT$W=04,55[CR]
            assert_eq!(frame[0], 0x88);
            assert_eq!(frame[1], 0x00);
            assert_eq!(&frame[2..frame.len() - 1], b"AT$W=04,55");
            Some(node_reply(0x08, "OK"))
        });
        let mut protocol = AddressedProtocol::new(Box::new(transport), bus_config());
        protocol.init().await.unwrap();

        let result = protocol
            .write_register(
                BoardType::RelayModule,
                0x08,
                crate::core::registers::boards::relay::RELAY_STATE,
                0xFF,
                0x55,
            )
            .await
            .unwrap();
        assert!(!result.status.any());
        assert_eq!(result.value, 0x55);
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_write_reads_then_merges() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicU32::new(0));
        let calls_in = calls.clone();
        let (transport, handle) = MockBusTransport::new("bus");
        handle.set_responder(move |frame| {
            let n = calls_in.fetch_add(1, Ordering::SeqCst);
            let text = String::from_utf8_lossy(&frame[2..frame.len() - 1]).into_owned();
            if n == 0 {
                assert_eq!(text, "AT$R=05");
                // CHARGE_CONTROL currently 0b10 (running, not enabled).
                Some(node_reply(0x0A, "2"))
            } else {
                // Enable bit merged in without clearing the running bit.
                assert_eq!(text, "AT$W=05,3");
                Some(node_reply(0x0A, "OK"))
            }
        });
        let mut protocol = AddressedProtocol::new(Box::new(transport), bus_config());
        protocol.init().await.unwrap();

        let result = protocol
            .write_register(
                BoardType::BatteryModule,
                0x0A,
                crate::core::registers::boards::battery::CHARGE_CONTROL,
                crate::core::registers::boards::battery::CHARGE_ENABLE_MASK,
                1,
            )
            .await
            .unwrap();
        assert!(!result.status.any());
        assert_eq!(result.value, 0x3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_error_reply_sets_status() {
        let mut protocol = protocol_with_responder(0x08, "ERROR_02");
        protocol.init().await.unwrap();

        let result = protocol
            .write_register(BoardType::RelayModule, 0x08, 0x04, 0xFF, 0x01)
            .await
            .unwrap();
        assert!(result.status.error_received());
    }

    #[tokio::test(start_paused = true)]
    async fn test_readonly_register_rejected_locally() {
        let mut protocol = protocol_with_responder(0x09, "OK");
        protocol.init().await.unwrap();

        let err = protocol
            .read_register(BoardType::SensorModule, 0x09, 0x04, 0xFFFF)
            .await;
        assert!(err.is_ok());

        let err = protocol
            .write_register(BoardType::SensorModule, 0x09, 0x04, 0xFFFF, 1)
            .await;
        assert!(err.is_err());
    }
}
