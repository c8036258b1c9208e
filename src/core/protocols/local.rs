//! Master virtual registers.
//!
//! The master itself is addressable like any other node, but its registers
//! live in memory. Persisted registers shadow a cell in non-volatile
//! storage at `nvm_base + register * 4`; runtime registers are computed on
//! read. There is no bus and nothing here can time out, so every access
//! returns a clean status unless the NVM store itself fails.

use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use crate::core::hal::NvmStore;
use crate::core::registers::boards::{common, master};
use crate::core::registers::{read_field, write_field, AccessStatus, BoardType, Direction, ResetPolicy};
use crate::error::{NodeBusError, Result};

use super::{AccessResult, RegisterProtocol};

/// Firmware version reported by the master itself
const MASTER_FW_VERSION: u32 = 0x0103;

/// Volatile register images held per master, indexed by register address
const CELL_COUNT: usize = 8;

pub struct LocalProtocol<N: NvmStore> {
    nvm: N,
    nvm_base: u32,
    cells: [u32; CELL_COUNT],
    boot_time: Instant,
}

impl<N: NvmStore> LocalProtocol<N> {
    pub fn new(nvm: N, nvm_base: u32) -> Self {
        let mut cells = [0u32; CELL_COUNT];
        // The boot flag is up until the radio layer reports it and clears it.
        cells[common::STATUS as usize] = common::STATUS_BOOT_FLAG_MASK;
        Self {
            nvm,
            nvm_base,
            cells,
            boot_time: Instant::now(),
        }
    }

    fn nvm_address(&self, reg: u8) -> u32 {
        self.nvm_base + u32::from(reg) * 4
    }

    fn reset_policy(reg: u8) -> ResetPolicy {
        BoardType::Master
            .register(reg)
            .map(|d| d.reset)
            .unwrap_or(ResetPolicy::StaticError)
    }

    /// Load persisted registers from NVM into their volatile images.
    pub async fn restore(&mut self) -> Result<()> {
        for reg in 0..CELL_COUNT as u8 {
            if Self::reset_policy(reg) == ResetPolicy::Persisted {
                let value = self.nvm.read_u32(self.nvm_address(reg)).await?;
                self.cells[reg as usize] = value;
                debug!("restored master register 0x{:02X} = 0x{:08X}", reg, value);
            }
        }
        Ok(())
    }

    fn raw_value(&self, reg: u8) -> Result<u32> {
        let value = match reg {
            common::BOARD_ID => u32::from(BoardType::Master.board_id()),
            common::FW_VERSION => MASTER_FW_VERSION,
            master::UPTIME_S => self.boot_time.elapsed().as_secs() as u32,
            r if (r as usize) < CELL_COUNT && BoardType::Master.register(r).is_some() => {
                self.cells[r as usize]
            }
            _ => {
                return Err(NodeBusError::RegisterOutOfRange(
                    reg,
                    BoardType::Master.name().to_string(),
                ))
            }
        };
        Ok(value)
    }
}

#[async_trait]
impl<N: NvmStore> RegisterProtocol for LocalProtocol<N> {
    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    async fn deinit(&mut self) -> Result<()> {
        Ok(())
    }

    async fn read_register(
        &mut self,
        _board: BoardType,
        _node_address: u8,
        reg: u8,
        mask: u32,
    ) -> Result<AccessResult> {
        let raw = self.raw_value(reg)?;
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
        let mut image = self.raw_value(reg)?;
        let mut written = 0u32;
        write_field(&mut image, &mut written, value, mask);
        let image = board.secure_register(reg, image)?;

        self.cells[reg as usize] = image;
        if Self::reset_policy(reg) == ResetPolicy::Persisted {
            self.nvm.write_u32(self.nvm_address(reg), image).await?;
        }
        debug!("master register 0x{:02X} = 0x{:08X}", reg, image);
        Ok(AccessResult {
            status: AccessStatus::new(Direction::Write),
            value: image,
        })
    }
}
