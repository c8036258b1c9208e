//! The periodic radio tick.
//!
//! Tick order matters: scheduled actions run first so a deadline is never
//! stretched by the rest of the tick, then one node reports. Two overrides
//! can displace that node's regular rotation payload: a startup report when
//! its boot flag is set, and an error report when its error-stack flag is
//! set. A downlink can only arrive attached to a rotation report, so command
//! latency is bounded by the tick period times the inventory size.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::RadioConfig;
use crate::core::hal::{NvmStore, RadioLink, DOWNLINK_FRAME_LEN};
use crate::core::node::{Node, NodeAccess, NodeRegistry};
use crate::core::registers::boards::{common, master};
use crate::core::registers::BoardType;
use crate::error::{NodeBusError, Result};

use super::downlink::{interpret, DownlinkCommand, WriteOp};
use super::payload::{
    downlink_hash, pack_action_log, pack_error_stack, rotation, PayloadType, MAX_ERROR_ENTRIES,
};
use super::scheduler::{ActionList, ScheduledAction};
use super::uplink::build_node_uplink;

/// Receipt status for commands rejected before any bus exchange
const LOCAL_REJECT_STATUS: u8 = 0x84;

pub struct RadioProcess<N: NvmStore, R: RadioLink> {
    access: NodeAccess<N>,
    registry: NodeRegistry,
    link: R,
    actions: ActionList,
    config: RadioConfig,
    rotation_index: usize,
}

impl<N: NvmStore, R: RadioLink> RadioProcess<N, R> {
    pub fn new(
        access: NodeAccess<N>,
        registry: NodeRegistry,
        link: R,
        config: RadioConfig,
    ) -> Self {
        Self {
            access,
            registry,
            link,
            actions: ActionList::new(),
            config,
            rotation_index: 0,
        }
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(self.config.tick_period_s)
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut NodeRegistry {
        &mut self.registry
    }

    pub fn access_mut(&mut self) -> &mut NodeAccess<N> {
        &mut self.access
    }

    pub fn pending_actions(&self) -> usize {
        self.actions.len()
    }

    /// Run one full radio cycle.
    pub async fn tick(&mut self) -> Result<()> {
        self.run_due_actions().await?;
        self.report_next_node().await
    }

    /// Execute every scheduled write whose deadline passed.
    async fn run_due_actions(&mut self) -> Result<()> {
        let due = self.actions.take_due(Instant::now());
        for action in due {
            debug!(
                "running scheduled write 0x{:02X}@0x{:02X} (hash 0x{:03X})",
                action.register, action.address, action.hash
            );
            let (value, status) = self
                .write_one(WriteOp {
                    address: action.address,
                    register: action.register,
                    mask: action.mask,
                    value: action.value,
                })
                .await;
            let receipt = pack_action_log(action.hash, action.register, value, status);
            self.link.send(&receipt, false).await?;
        }
        Ok(())
    }

    /// Uplink for the next node in the rotation.
    ///
    /// The boot override wins over the error override, which wins over the
    /// regular rotation payload. The rotation counter advances whichever
    /// payload goes out, so the rotation resumes where it would have been
    /// once the overriding condition clears.
    async fn report_next_node(&mut self) -> Result<()> {
        let count = self.registry.len();
        let node = match self.registry.nth(self.rotation_index % count) {
            Some(node) => *node,
            None => return Ok(()),
        };
        self.rotation_index = (self.rotation_index + 1) % count;

        let pattern = rotation(node.board);
        let payload_type = pattern[node.payload_type_counter as usize % pattern.len()];
        if let Some(entry) = self.registry.get_mut(node.address) {
            entry.payload_type_counter =
                ((entry.payload_type_counter as usize + 1) % pattern.len()) as u8;
        }

        let status_mask = node
            .board
            .register(common::STATUS)
            .map(|d| d.mask)
            .unwrap_or(common::STATUS_BOOT_FLAG_MASK | common::STATUS_ERROR_STACK_FLAG_MASK);
        let status = self
            .access
            .read(node.board, node.address, common::STATUS, status_mask)
            .await?;
        let status_ok = !status.status.any();

        // A freshly booted node reports its startup before anything else.
        if status_ok && status.value & common::STATUS_BOOT_FLAG_MASK != 0 {
            info!("node 0x{:02X} boot flag set, sending startup report", node.address);
            let payload = build_node_uplink(&mut self.access, &node, PayloadType::Startup).await?;
            self.link.send(&payload, false).await?;
            let cleared = self
                .access
                .write(
                    node.board,
                    node.address,
                    common::STATUS,
                    common::STATUS_BOOT_FLAG_MASK,
                    0,
                )
                .await?;
            if cleared.status.any() {
                warn!("could not clear boot flag on 0x{:02X}", node.address);
            }
            return Ok(());
        }

        // The master's failures live in the dispatcher's stack; every other
        // node raises its error-stack status flag.
        let errors_pending = if node.board == BoardType::Master {
            !self.access.errors().is_empty()
        } else {
            status_ok && status.value & common::STATUS_ERROR_STACK_FLAG_MASK != 0
        };
        if errors_pending {
            if node.error_streak < self.config.error_stack_flood_limit {
                if let Some(entry) = self.registry.get_mut(node.address) {
                    entry.error_streak = node.error_streak + 1;
                }
                return self.report_errors(&node).await;
            }
            debug!("node 0x{:02X} error reports suppressed", node.address);
        } else if status_ok && node.error_streak != 0 {
            if let Some(entry) = self.registry.get_mut(node.address) {
                entry.error_streak = 0;
            }
        }

        let payload = build_node_uplink(&mut self.access, &node, payload_type).await?;
        let downlink_wanted = self.downlink_enabled().await;
        let downlink = self.link.send(&payload, downlink_wanted).await?;

        if let Some(frame) = downlink {
            self.handle_downlink(frame).await?;
        }
        Ok(())
    }

    /// One error payload for this node's report turn.
    async fn report_errors(&mut self, node: &Node) -> Result<()> {
        let payload = if node.board == BoardType::Master {
            let mut entries = Vec::with_capacity(MAX_ERROR_ENTRIES);
            while entries.len() < MAX_ERROR_ENTRIES {
                match self.access.errors().pop_oldest() {
                    Some(entry) => entries.push(entry),
                    None => break,
                }
            }
            pack_error_stack(node.address, &entries)?
        } else {
            build_node_uplink(&mut self.access, node, PayloadType::ErrorStack).await?
        };
        info!(
            "node 0x{:02X} error report ({} consecutive)",
            node.address,
            node.error_streak + 1
        );
        self.link.send(&payload, false).await.map(|_| ())
    }

    async fn downlink_enabled(&mut self) -> bool {
        let master_address = match self.registry.nth(0) {
            Some(node) => node.address,
            None => return false,
        };
        match self
            .access
            .read(BoardType::Master, master_address, master::DOWNLINK_ENABLE, 0x1)
            .await
        {
            Ok(result) => !result.status.any() && result.value == 1,
            Err(e) => {
                warn!("downlink-enable read failed: {}", e);
                false
            }
        }
    }

    /// Interpret and execute one downlink frame.
    async fn handle_downlink(&mut self, frame: [u8; DOWNLINK_FRAME_LEN]) -> Result<()> {
        let hash = downlink_hash(&frame);
        let command = match interpret(&frame) {
            Ok(command) => command,
            Err(e) => {
                warn!("downlink rejected: {}", e);
                let receipt = pack_action_log(hash, 0, 0, LOCAL_REJECT_STATUS);
                return self.link.send(&receipt, false).await.map(|_| ());
            }
        };
        info!("downlink 0x{:03X}: {:?}", hash, command);

        match command {
            DownlinkCommand::Nop => {}
            DownlinkCommand::Read { address, register } => {
                let (value, status) = self.read_one(address, register).await;
                let receipt = pack_action_log(hash, register, value, status);
                self.link.send(&receipt, false).await?;
            }
            DownlinkCommand::Write(writes) => {
                let now = Instant::now();
                for write in &writes {
                    // A rejected write abandons the rest of the frame.
                    if !self.schedule_write(write, write.value, now, hash).await? {
                        break;
                    }
                }
            }
            DownlinkCommand::Temporary { write, hold_s } => {
                // The previous value must be readable or there is nothing
                // sound to restore.
                let (previous, read_status) = self
                    .read_masked(write.address, write.register, write.mask)
                    .await;
                if read_status & 0x7F != 0 {
                    let receipt = pack_action_log(hash, write.register, previous, read_status);
                    return self.link.send(&receipt, false).await.map(|_| ());
                }
                let now = Instant::now();
                if self.schedule_write(&write, write.value, now, hash).await? {
                    let restore_at = now + Duration::from_secs(u64::from(hold_s));
                    self.schedule_write(&write, previous, restore_at, hash).await?;
                }
            }
            DownlinkCommand::Successive {
                first,
                second_value,
                hold_s,
            } => {
                let now = Instant::now();
                if self.schedule_write(&first, first.value, now, hash).await? {
                    let second_at = now + Duration::from_secs(u64::from(hold_s));
                    self.schedule_write(&first, second_value, second_at, hash).await?;
                }
            }
        }
        Ok(())
    }

    /// Put one decoded write on the action list.
    ///
    /// Immediate writes get a due-now deadline and execute on the next tick
    /// alongside deferred ones, in slot order. Returns false when the write
    /// never reached the list; the rejection is receipted right away and
    /// recorded on the error stack.
    async fn schedule_write(
        &mut self,
        write: &WriteOp,
        value: u32,
        execute_at: Instant,
        hash: u16,
    ) -> Result<bool> {
        let scheduled = if self.registry.get(write.address).is_none() {
            Err(NodeBusError::UnknownNode(write.address))
        } else {
            self.actions.schedule(ScheduledAction {
                execute_at,
                address: write.address,
                register: write.register,
                mask: write.mask,
                value,
                hash,
            })
        };
        match scheduled {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(
                    "downlink write 0x{:02X}@0x{:02X} rejected: {}",
                    write.register, write.address, e
                );
                self.access
                    .errors()
                    .push_raw(write.address, write.register, LOCAL_REJECT_STATUS);
                let receipt = pack_action_log(hash, write.register, value, LOCAL_REJECT_STATUS);
                self.link.send(&receipt, false).await?;
                Ok(false)
            }
        }
    }

    async fn read_one(&mut self, address: u8, register: u8) -> (u32, u8) {
        self.read_masked(address, register, None).await
    }

    async fn read_masked(&mut self, address: u8, register: u8, mask: Option<u32>) -> (u32, u8) {
        let Some(node) = self.registry.get(address).copied() else {
            return (0, LOCAL_REJECT_STATUS & 0x7F);
        };
        let mask = mask
            .or_else(|| node.board.register(register).map(|d| d.mask))
            .unwrap_or(0xFFFF_FFFF);
        match self.access.read(node.board, address, register, mask).await {
            Ok(result) => (result.value, result.status.as_byte()),
            Err(e) => {
                warn!("downlink read 0x{:02X}@0x{:02X} rejected: {}", register, address, e);
                (0, LOCAL_REJECT_STATUS & 0x7F)
            }
        }
    }

    async fn write_one(&mut self, write: WriteOp) -> (u32, u8) {
        let Some(node) = self.registry.get(write.address).copied() else {
            warn!("downlink write to unknown node 0x{:02X}", write.address);
            return (write.value, LOCAL_REJECT_STATUS);
        };
        let mask = write
            .mask
            .or_else(|| node.board.register(write.register).map(|d| d.mask))
            .unwrap_or(0xFFFF_FFFF);
        match self
            .access
            .write(node.board, write.address, write.register, mask, write.value)
            .await
        {
            Ok(result) => (result.value, result.status.as_byte()),
            Err(e) => {
                warn!(
                    "downlink write 0x{:02X}@0x{:02X} rejected: {}",
                    write.register, write.address, e
                );
                (write.value, LOCAL_REJECT_STATUS)
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn inject_downlink(&mut self, frame: [u8; DOWNLINK_FRAME_LEN]) -> Result<()> {
        self.handle_downlink(frame).await
    }

    #[cfg(test)]
    pub(crate) fn node(&self, address: u8) -> Option<crate::core::node::Node> {
        self.registry.get(address).copied()
    }
}
