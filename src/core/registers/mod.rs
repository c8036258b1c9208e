//! Register model
//!
//! Masked-field access over 32-bit registers, the access-status bitset every
//! bus operation returns, and the per-board register tables.

pub mod access;
pub mod boards;

pub use access::{read_field, write_field, AccessStatus, Direction};
pub use boards::{Access, BoardType, RegisterDef, ResetPolicy};
