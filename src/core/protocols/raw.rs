//! Raw binary protocol for the relay rack.
//!
//! The rack sits on its own point-to-point port and speaks fixed 3-byte
//! commands `[bus_address] [code] [value]`; every command is answered by a
//! fixed 3-byte report `[bus_address] [states_hi] [states_lo]` carrying all
//! eight relay states, 2 bits each. There are no ASCII lines and no CR
//! terminator anywhere on this port.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::RackConfig;
use crate::core::bus::build_raw_command;
use crate::core::registers::boards::rack;
use crate::core::registers::{read_field, AccessStatus, BoardType, Direction};
use crate::core::transport::BusTransport;
use crate::error::{NodeBusError, Result};
use crate::utils::hex;

use super::{AccessResult, RegisterProtocol};

/// Command codes the rack controller understands
mod code {
    /// value is ignored; reply reports all relay states
    pub const READ_STATES: u8 = 0x01;
    /// value is `[relay:6][state:2]`
    pub const SET_RELAY: u8 = 0x02;
}

const REPORT_LEN: usize = 3;
const RELAY_COUNT: u8 = 8;

pub struct RawProtocol {
    transport: Box<dyn BusTransport>,
    config: RackConfig,
}

impl RawProtocol {
    pub fn new(transport: Box<dyn BusTransport>, config: RackConfig) -> Self {
        Self { transport, config }
    }

    /// Send one command and collect the fixed-size report.
    async fn exchange(&mut self, code: u8, value: u8, direction: Direction) -> (AccessStatus, u32) {
        let mut status = AccessStatus::new(direction);
        let command = build_raw_command(self.config.bus_address, code, value);
        debug!("rack command: [{}]", hex::dump(&command));

        if let Err(e) = self.transport.send(&command).await {
            warn!("rack send failed: {}", e);
            status.set_reply_timeout();
            return (status, 0);
        }

        let mut report = [0u8; REPORT_LEN];
        let mut filled = 0usize;
        let mut elapsed = Duration::ZERO;
        let granule = Duration::from_millis(10);
        let reply_timeout = Duration::from_millis(self.config.reply_timeout_ms);
        let sequence_timeout = Duration::from_millis(self.config.sequence_timeout_ms);

        while filled < REPORT_LEN {
            match self.transport.receive(&mut report[filled..], granule).await {
                Ok(n) => filled += n,
                Err(e) => {
                    warn!("rack receive failed: {}", e);
                    status.set_reply_timeout();
                    return (status, 0);
                }
            }
            elapsed += granule;
            if elapsed >= reply_timeout && filled < REPORT_LEN {
                if filled > 0 {
                    // A truncated report is a framing fault, not silence.
                    status.set_parser_error();
                } else {
                    status.set_reply_timeout();
                }
                return (status, 0);
            }
            if elapsed >= sequence_timeout {
                status.set_sequence_timeout();
                return (status, 0);
            }
        }

        debug!("rack report: [{}]", hex::dump(&report));
        if report[0] != self.config.bus_address {
            status.set_source_address_mismatch();
            return (status, 0);
        }
        let states = u32::from(report[1]) << 8 | u32::from(report[2]);
        (status, states)
    }

    /// Probe the rack port.
    pub async fn ping(&mut self) -> Result<bool> {
        self.init().await?;
        let (status, _) = self.exchange(code::READ_STATES, 0, Direction::Read).await;
        self.deinit().await?;
        Ok(!status.any())
    }
}

#[async_trait]
impl RegisterProtocol for RawProtocol {
    async fn init(&mut self) -> Result<()> {
        if !self.transport.is_connected().await {
            self.transport.connect().await?;
        }
        Ok(())
    }

    async fn deinit(&mut self) -> Result<()> {
        // Drain anything the rack volunteered after the report.
        let mut scratch = [0u8; 16];
        while self
            .transport
            .receive(&mut scratch, Duration::ZERO)
            .await
            .unwrap_or(0)
            > 0
        {}
        Ok(())
    }

    async fn read_register(
        &mut self,
        board: BoardType,
        _node_address: u8,
        reg: u8,
        mask: u32,
    ) -> Result<AccessResult> {
        // The rack hardware only reports relay states; the common registers
        // are synthesized here.
        let raw = match reg {
            rack::RELAY_STATES => {
                let (status, states) = self.exchange(code::READ_STATES, 0, Direction::Read).await;
                if status.any() {
                    return Ok(AccessResult {
                        status,
                        value: board.error_value(reg),
                    });
                }
                states
            }
            crate::core::registers::boards::common::BOARD_ID => u32::from(board.board_id()),
            crate::core::registers::boards::common::FW_VERSION
            | crate::core::registers::boards::common::STATUS
            | crate::core::registers::boards::common::ERROR_STACK => 0,
            _ => {
                return Err(NodeBusError::RegisterOutOfRange(reg, board.name().to_string()));
            }
        };
        Ok(AccessResult {
            status: AccessStatus::new(Direction::Read),
            value: read_field(raw, mask),
        })
    }

    async fn write_register(
        &mut self,
        board: BoardType,
        _node_address: u8,
        reg: u8,
        mask: u32,
        value: u32,
    ) -> Result<AccessResult> {
        if reg != rack::RELAY_STATES {
            return Err(NodeBusError::protocol(format!(
                "rack register 0x{reg:02X} is not writable"
            )));
        }
        if mask == 0 || mask & !0xFFFF != 0 {
            return Err(NodeBusError::RegisterFieldValue {
                reg,
                value,
                mask: 0xFFFF,
            });
        }

        // One SET_RELAY command per relay whose 2-bit field the mask covers.
        let field = value << mask.trailing_zeros();
        let mut status = AccessStatus::new(Direction::Write);
        let mut committed = 0u32;
        for relay in 0..RELAY_COUNT {
            let relay_mask = 0x3u32 << (relay * 2);
            if mask & relay_mask == 0 {
                continue;
            }
            let state = ((field & relay_mask) >> (relay * 2)) as u8;
            let (step_status, states) = self
                .exchange(code::SET_RELAY, (relay << 2) | state, Direction::Write)
                .await;
            status.merge(step_status);
            if status.any() {
                return Ok(AccessResult {
                    status,
                    value: board.error_value(reg),
                });
            }
            committed = states;
        }
        Ok(AccessResult {
            status,
            value: committed,
        })
    }
}
