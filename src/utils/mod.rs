//! Utility modules shared across the stack

pub mod hex;
pub mod logger;
pub mod time;

pub use crate::error::{NodeBusError, Result};
