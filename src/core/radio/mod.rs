//! Radio reporting and remote control.
//!
//! The process walks the node inventory round-robin, one uplink per tick,
//! and piggybacks a downlink request on each report when remote control is
//! enabled. Downlink commands run immediately or leave deferred writes on
//! the action list; every executed command is answered with an action-log
//! receipt uplink.

pub mod downlink;
pub mod payload;
pub mod process;
pub mod scheduler;
pub mod uplink;

/// Hard cap on any uplink payload
pub const MAX_PAYLOAD: usize = crate::core::hal::MAX_UPLINK_PAYLOAD;

pub use downlink::{interpret, DownlinkCommand, WriteOp};
pub use payload::{downlink_hash, pack_action_log, pack_error_stack, PayloadType};
pub use process::RadioProcess;
pub use scheduler::{ActionList, ScheduledAction, MAX_ACTIONS};
pub use uplink::build_node_uplink;
