//! Error handling for the node communication stack
//!
//! One crate-wide error type covers dispatch, scheduling and resource errors.
//! Bus-level failures (timeouts, parse mismatches, error tokens) are NOT
//! errors in the `Result` sense: they travel as [`AccessStatus`] bits inside
//! `Ok` values so callers can keep going and display "unavailable" instead of
//! a stale number.
//!
//! [`AccessStatus`]: crate::core::registers::AccessStatus

use thiserror::Error;

/// Node bus error type
#[derive(Error, Debug, Clone)]
pub enum NodeBusError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    Io(String),

    /// Transport-layer errors (connect/send/receive)
    #[error("Transport error: {0}")]
    Transport(String),

    /// General protocol communication errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Data parsing errors
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// Data serialization and deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Register address outside the board's register table
    #[error("Register 0x{0:02X} out of range for board {1}")]
    RegisterOutOfRange(u8, String),

    /// Write attempted on a read-only register
    #[error("Register 0x{0:02X} is read-only")]
    RegisterReadOnly(u8),

    /// Value does not fit the register's declared bit-field
    #[error("Register field value error: register 0x{reg:02X}, value 0x{value:08X} exceeds mask 0x{mask:08X}")]
    RegisterFieldValue { reg: u8, value: u32, mask: u32 },

    /// Downlink referenced a node address that is not in the registry
    #[error("Unknown node address: 0x{0:02X}")]
    UnknownNode(u8),

    /// Downlink op code is not part of the op-code table
    #[error("Unknown downlink op code: 0x{0:02X}")]
    UnknownOpCode(u8),

    /// Scheduled action list has no free slot
    #[error("Action list full ({0} slots)")]
    ActionListFull(usize),

    /// Uplink payload would exceed the modem maximum
    #[error("Payload overflow: {size} bytes exceeds maximum {max}")]
    PayloadOverflow { size: usize, max: usize },

    /// Node list reached its fixed capacity during discovery
    #[error("Node list full ({0} slots)")]
    NodeListFull(usize),

    /// Non-volatile memory access errors
    #[error("NVM error: {0}")]
    Nvm(String),

    /// Radio link errors (modem exchange failed outright)
    #[error("Radio error: {0}")]
    Radio(String),

    /// General internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for the node bus stack
pub type Result<T> = std::result::Result<T, NodeBusError>;

impl From<std::io::Error> for NodeBusError {
    fn from(err: std::io::Error) -> Self {
        NodeBusError::Io(err.to_string())
    }
}

impl From<figment::Error> for NodeBusError {
    fn from(err: figment::Error) -> Self {
        NodeBusError::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for NodeBusError {
    fn from(err: serde_yaml::Error) -> Self {
        NodeBusError::Serialization(format!("YAML error: {err}"))
    }
}

impl From<serde_json::Error> for NodeBusError {
    fn from(err: serde_json::Error) -> Self {
        NodeBusError::Serialization(format!("JSON error: {err}"))
    }
}

// Helper constructors, mirroring the call sites that build errors from
// formatted strings.
impl NodeBusError {
    pub fn config(msg: impl Into<String>) -> Self {
        NodeBusError::Config(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        NodeBusError::Transport(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        NodeBusError::Protocol(msg.into())
    }

    pub fn parsing(msg: impl Into<String>) -> Self {
        NodeBusError::Parsing(msg.into())
    }

    pub fn nvm(msg: impl Into<String>) -> Self {
        NodeBusError::Nvm(msg.into())
    }

    pub fn radio(msg: impl Into<String>) -> Self {
        NodeBusError::Radio(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        NodeBusError::Internal(msg.into())
    }
}
