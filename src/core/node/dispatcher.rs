//! Register-access dispatch.
//!
//! One entry point for every register access in the system. The dispatcher
//! picks the protocol from the board type, powers the bus rail around the
//! exchange, runs the protocol's init/deinit bracket whatever the outcome,
//! and records every failed access on the error stack.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::core::hal::{NvmStore, PowerControl};
use crate::core::protocols::{
    AccessResult, AddressedProtocol, LocalProtocol, RawProtocol, RegisterProtocol,
};
use crate::core::registers::BoardType;
use crate::error::Result;

use super::error_stack::ErrorStack;
use super::registry::NodeRegistry;

pub struct NodeAccess<N: NvmStore> {
    addressed: AddressedProtocol,
    raw: RawProtocol,
    local: LocalProtocol<N>,
    power: Arc<dyn PowerControl>,
    errors: ErrorStack,
    rack_address: u8,
    scan_start: u8,
    scan_end: u8,
}

impl<N: NvmStore> NodeAccess<N> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        addressed: AddressedProtocol,
        raw: RawProtocol,
        local: LocalProtocol<N>,
        power: Arc<dyn PowerControl>,
        rack_address: u8,
        scan_start: u8,
        scan_end: u8,
    ) -> Self {
        Self {
            addressed,
            raw,
            local,
            power,
            errors: ErrorStack::new(),
            rack_address,
            scan_start,
            scan_end,
        }
    }

    pub fn errors(&mut self) -> &mut ErrorStack {
        &mut self.errors
    }

    fn protocol_for(&mut self, board: BoardType) -> &mut dyn RegisterProtocol {
        match board {
            BoardType::Master => &mut self.local,
            BoardType::RelayRack => &mut self.raw,
            _ => &mut self.addressed,
        }
    }

    /// The master's local registers never touch the rail.
    fn needs_power(board: BoardType) -> bool {
        board != BoardType::Master
    }

    /// Read the field selected by `mask` from a node register.
    pub async fn read(
        &mut self,
        board: BoardType,
        address: u8,
        reg: u8,
        mask: u32,
    ) -> Result<AccessResult> {
        let powered = Self::needs_power(board);
        if powered {
            self.power.acquire().await?;
        }
        let result = self.bracketed_read(board, address, reg, mask).await;
        if powered {
            if let Err(e) = self.power.release().await {
                warn!("rail release failed: {}", e);
            }
        }
        let result = result?;
        if result.status.any() {
            self.errors.push(address, reg, result.status);
        }
        Ok(result)
    }

    /// Write the field selected by `mask` to a node register.
    pub async fn write(
        &mut self,
        board: BoardType,
        address: u8,
        reg: u8,
        mask: u32,
        value: u32,
    ) -> Result<AccessResult> {
        let powered = Self::needs_power(board);
        if powered {
            self.power.acquire().await?;
        }
        let result = self.bracketed_write(board, address, reg, mask, value).await;
        if powered {
            if let Err(e) = self.power.release().await {
                warn!("rail release failed: {}", e);
            }
        }
        let result = result?;
        if result.status.any() {
            self.errors.push(address, reg, result.status);
        }
        Ok(result)
    }

    async fn bracketed_read(
        &mut self,
        board: BoardType,
        address: u8,
        reg: u8,
        mask: u32,
    ) -> Result<AccessResult> {
        let protocol = self.protocol_for(board);
        protocol.init().await?;
        let op = protocol.read_register(board, address, reg, mask).await;
        // Deinit runs even when the access failed.
        let deinit = protocol.deinit().await;
        let result = op?;
        deinit?;
        Ok(result)
    }

    async fn bracketed_write(
        &mut self,
        board: BoardType,
        address: u8,
        reg: u8,
        mask: u32,
        value: u32,
    ) -> Result<AccessResult> {
        let protocol = self.protocol_for(board);
        protocol.init().await?;
        let op = protocol.write_register(board, address, reg, mask, value).await;
        let deinit = protocol.deinit().await;
        let result = op?;
        deinit?;
        Ok(result)
    }

    /// Sweep the bus and rebuild the node inventory.
    ///
    /// Every address in the scan window is pinged and identified; the relay
    /// rack is probed on its own port. Returns the number of nodes found,
    /// master excluded.
    pub async fn scan(&mut self, registry: &mut NodeRegistry) -> Result<usize> {
        let previous = registry.begin_rescan();
        info!(
            "scanning bus addresses 0x{:02X}..=0x{:02X}",
            self.scan_start, self.scan_end
        );

        self.power.acquire().await?;
        let result = self.scan_bus(registry, &previous).await;
        if let Err(e) = self.power.release().await {
            warn!("rail release failed: {}", e);
        }
        result?;

        match self.raw.ping().await {
            Ok(true) => {
                if let Err(e) =
                    registry.insert_carrying(self.rack_address, BoardType::RelayRack, &previous)
                {
                    warn!("rack not registered: {}", e);
                }
            }
            Ok(false) => {}
            Err(e) => warn!("rack probe failed: {}", e),
        }

        let found = registry.len() - 1;
        info!("scan complete: {} node(s)", found);
        Ok(found)
    }

    async fn scan_bus(
        &mut self,
        registry: &mut NodeRegistry,
        previous: &[Option<super::registry::Node>],
    ) -> Result<()> {
        self.addressed.init().await?;
        let mut result = Ok(());
        for address in self.scan_start..=self.scan_end {
            match self.sweep_one(address).await {
                Ok(Some(board)) => {
                    // A full node list ends the sweep; whatever was found so
                    // far is still a valid inventory.
                    if let Err(e) = registry.insert_carrying(address, board, previous) {
                        warn!("scan stopped at 0x{:02X}: {}", address, e);
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        let deinit = self.addressed.deinit().await;
        result?;
        deinit
    }

    async fn sweep_one(&mut self, address: u8) -> Result<Option<BoardType>> {
        if !self.addressed.ping(address).await? {
            return Ok(None);
        }
        debug!("address 0x{:02X} answered ping", address);
        let board = self.addressed.identify(address).await?;
        if board.is_none() {
            warn!("node 0x{:02X} reported an unknown board id", address);
        }
        Ok(board)
    }
}
