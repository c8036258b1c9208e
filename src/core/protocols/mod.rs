//! Register-access protocols.
//!
//! Every node reachable from the master speaks one of three dialects:
//!
//! - [`AddressedProtocol`]: ASCII AT commands inside address-marked frames
//!   on the shared multi-drop bus (all plug-in modules)
//! - [`RawProtocol`]: fixed 3-byte binary commands to the relay rack on its
//!   dedicated port
//! - [`LocalProtocol`]: the master's own virtual registers, no bus at all
//!
//! The dispatcher in [`crate::core::node`] picks the dialect from the board
//! type; callers never see which one ran.

pub mod addressed;
pub mod local;
pub mod raw;

use async_trait::async_trait;

pub use addressed::AddressedProtocol;
pub use local::LocalProtocol;
pub use raw::RawProtocol;

use crate::core::registers::{AccessStatus, BoardType};
use crate::error::Result;

/// Outcome of one register access.
///
/// `status` carries protocol-level failures; `value` is only meaningful
/// when `status` is clean (reads return the field value, writes echo the
/// committed value).
#[derive(Debug, Clone, Copy)]
pub struct AccessResult {
    pub status: AccessStatus,
    pub value: u32,
}

/// One register-access dialect.
///
/// `init` runs before each access sequence and `deinit` after it, whatever
/// the outcome was; implementations keep both idempotent.
#[async_trait]
pub trait RegisterProtocol: Send {
    async fn init(&mut self) -> Result<()>;

    async fn deinit(&mut self) -> Result<()>;

    /// Read the field selected by `mask` from a register.
    async fn read_register(
        &mut self,
        board: BoardType,
        node_address: u8,
        reg: u8,
        mask: u32,
    ) -> Result<AccessResult>;

    /// Write the field selected by `mask`; partial masks leave the other
    /// bits of the register untouched.
    async fn write_register(
        &mut self,
        board: BoardType,
        node_address: u8,
        reg: u8,
        mask: u32,
        value: u32,
    ) -> Result<AccessResult>;
}
