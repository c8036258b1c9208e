//! Masked-field access and access status
//!
//! Every bus operation yields an [`AccessStatus`]; any set bit means the
//! associated register value is invalid and callers must fall back to the
//! register's declared error value. Statuses are data, not `Err` values,
//! so a failed read never aborts a polling cycle.

/// Direction tag of a bus operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Read,
    Write,
}

/// Bitset describing why a register access did not cleanly succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessStatus {
    bits: u8,
    direction: Direction,
}

impl AccessStatus {
    pub const ERROR_RECEIVED: u8 = 0x01;
    pub const REPLY_TIMEOUT: u8 = 0x02;
    pub const PARSER_ERROR: u8 = 0x04;
    pub const SEQUENCE_TIMEOUT: u8 = 0x08;
    pub const SOURCE_ADDRESS_MISMATCH: u8 = 0x10;

    /// Direction flag of the encoded byte form
    const DIRECTION_WRITE: u8 = 0x80;

    /// Clean status for the given direction
    pub fn new(direction: Direction) -> Self {
        Self { bits: 0, direction }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Any failure bit set means the associated value is invalid
    pub fn any(&self) -> bool {
        self.bits != 0
    }

    pub fn set_error_received(&mut self) {
        self.bits |= Self::ERROR_RECEIVED;
    }

    pub fn set_reply_timeout(&mut self) {
        self.bits |= Self::REPLY_TIMEOUT;
    }

    pub fn set_parser_error(&mut self) {
        self.bits |= Self::PARSER_ERROR;
    }

    pub fn set_sequence_timeout(&mut self) {
        self.bits |= Self::SEQUENCE_TIMEOUT;
    }

    pub fn set_source_address_mismatch(&mut self) {
        self.bits |= Self::SOURCE_ADDRESS_MISMATCH;
    }

    pub fn error_received(&self) -> bool {
        self.bits & Self::ERROR_RECEIVED != 0
    }

    pub fn reply_timeout(&self) -> bool {
        self.bits & Self::REPLY_TIMEOUT != 0
    }

    pub fn parser_error(&self) -> bool {
        self.bits & Self::PARSER_ERROR != 0
    }

    pub fn sequence_timeout(&self) -> bool {
        self.bits & Self::SEQUENCE_TIMEOUT != 0
    }

    pub fn source_address_mismatch(&self) -> bool {
        self.bits & Self::SOURCE_ADDRESS_MISMATCH != 0
    }

    /// Merge the failure bits of another status (direction kept)
    pub fn merge(&mut self, other: AccessStatus) {
        self.bits |= other.bits;
    }

    /// One-byte wire form used by the action-log payload: failure bits in
    /// the low bits, direction in bit 7.
    pub fn as_byte(&self) -> u8 {
        let dir = match self.direction {
            Direction::Read => 0,
            Direction::Write => Self::DIRECTION_WRITE,
        };
        self.bits | dir
    }
}

impl Default for AccessStatus {
    fn default() -> Self {
        Self::new(Direction::Read)
    }
}

/// Extract a masked field from a register value.
///
/// The field is shifted down so bit 0 of the result is the lowest set bit
/// of the mask.
pub fn read_field(register_value: u32, mask: u32) -> u32 {
    if mask == 0 {
        return 0;
    }
    (register_value & mask) >> mask.trailing_zeros()
}

/// Insert a masked field into a register value.
///
/// `written_mask` accumulates which bits were actually touched: the local
/// virtual-register implementation merges partial writes and must know
/// which bits each write covered.
pub fn write_field(register_value: &mut u32, written_mask: &mut u32, field: u32, mask: u32) {
    if mask == 0 {
        return;
    }
    let shifted = (field << mask.trailing_zeros()) & mask;
    *register_value = (*register_value & !mask) | shifted;
    *written_mask |= mask;
}
