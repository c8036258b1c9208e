//! Inventory of nodes found on the bus.
//!
//! Slot 0 always holds the master itself; discovered nodes fill the
//! remaining slots in scan order. A rescan rebuilds the inventory but
//! carries each node's uplink rotation counter forward by address, so a
//! node that survives a rescan keeps its place in the payload rotation.

use tracing::{debug, info};

use crate::core::registers::BoardType;
use crate::error::{NodeBusError, Result};

pub const MAX_NODES: usize = 32;

/// One node known to the master
#[derive(Debug, Clone, Copy)]
pub struct Node {
    pub address: u8,
    pub board: BoardType,
    /// Rotation position in this node's uplink payload pattern
    pub payload_type_counter: u8,
    /// Consecutive report turns this node's error-stack flag was set
    pub error_streak: u8,
}

impl Node {
    pub fn new(address: u8, board: BoardType) -> Self {
        Self {
            address,
            board,
            payload_type_counter: 0,
            error_streak: 0,
        }
    }
}

#[derive(Debug)]
pub struct NodeRegistry {
    slots: [Option<Node>; MAX_NODES],
}

impl NodeRegistry {
    /// A registry holding only the master
    pub fn new(master_address: u8) -> Self {
        let mut slots = [None; MAX_NODES];
        slots[0] = Some(Node::new(master_address, BoardType::Master));
        Self { slots }
    }

    /// Drop every discovered node, keeping the master, and hand back the
    /// previous inventory so a rescan can carry counters forward.
    pub fn begin_rescan(&mut self) -> [Option<Node>; MAX_NODES] {
        let mut previous = [None; MAX_NODES];
        for (slot, prev) in self.slots.iter_mut().zip(previous.iter_mut()).skip(1) {
            *prev = slot.take();
        }
        previous
    }

    /// Record a discovered node in the first free slot.
    pub fn insert(&mut self, address: u8, board: BoardType) -> Result<()> {
        self.insert_carrying(address, board, &[])
    }

    /// Record a discovered node, restoring its rotation counter from the
    /// previous inventory if the address was known before.
    pub fn insert_carrying(
        &mut self,
        address: u8,
        board: BoardType,
        previous: &[Option<Node>],
    ) -> Result<()> {
        let mut node = Node::new(address, board);
        if let Some(old) = previous
            .iter()
            .flatten()
            .find(|n| n.address == address && n.board == board)
        {
            node.payload_type_counter = old.payload_type_counter;
            debug!(
                "node 0x{:02X} kept rotation counter {}",
                address, node.payload_type_counter
            );
        }

        let slot = self
            .slots
            .iter_mut()
            .skip(1)
            .find(|s| s.is_none())
            .ok_or(NodeBusError::NodeListFull(MAX_NODES))?;
        info!("node 0x{:02X} registered as {}", address, board);
        *slot = Some(node);
        Ok(())
    }

    pub fn get(&self, address: u8) -> Option<&Node> {
        self.slots.iter().flatten().find(|n| n.address == address)
    }

    pub fn get_mut(&mut self, address: u8) -> Option<&mut Node> {
        self.slots.iter_mut().flatten().find(|n| n.address == address)
    }

    /// All known nodes, master first
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        // Slot 0 is always occupied.
        false
    }

    /// Node at a rotation position, master included
    pub fn nth(&self, index: usize) -> Option<&Node> {
        self.iter().nth(index)
    }
}
