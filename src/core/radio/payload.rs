//! Uplink payload packing.
//!
//! Every uplink is at most 12 bytes. Node payloads open with a header byte
//! `[type:4][board_id:4]` followed by the node's bus address; the fields
//! after that are big-endian and payload-type specific. Error-stack payloads
//! use the same header form, naming the node whose errors they carry. Action
//! logs use the high nibble 0xF with no node header.

use crate::core::node::ErrorEntry;
use crate::core::registers::BoardType;
use crate::error::{NodeBusError, Result};

/// Payload type nibbles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadType {
    /// Common status register
    Status = 0x0,
    /// Boot report: reset reason and firmware version
    Startup = 0x1,
    /// Temperature and humidity
    Ambient = 0x2,
    /// Position fix
    Geoloc = 0x3,
    /// Mains metering
    Mains = 0x4,
    /// Relay or charge state with voltage and current
    Electrical = 0x5,
    /// Modem state and TX power
    RadioSettings = 0x6,
    /// All rack relay states
    RelayStates = 0x7,
    /// Drained access failures
    ErrorStack = 0xE,
    /// Receipt for one executed downlink command
    ActionLog = 0xF,
}

/// Fixed rotation of payload types each board reports
pub fn rotation(board: BoardType) -> &'static [PayloadType] {
    match board {
        BoardType::Master => &[PayloadType::Status],
        BoardType::RelayModule => &[PayloadType::Status, PayloadType::Electrical],
        BoardType::BatteryModule => &[PayloadType::Status, PayloadType::Electrical],
        BoardType::GpsModule => &[PayloadType::Status, PayloadType::Geoloc],
        BoardType::SensorModule => &[PayloadType::Status, PayloadType::Ambient],
        BoardType::MeterModule => &[PayloadType::Status, PayloadType::Mains],
        BoardType::RadioModem => &[PayloadType::Status, PayloadType::RadioSettings],
        BoardType::RelayRack => &[PayloadType::RelayStates],
    }
}

/// Maximum error entries one error-stack payload carries
pub const MAX_ERROR_ENTRIES: usize = 3;

fn header(payload_type: PayloadType, board: BoardType) -> u8 {
    (payload_type as u8) << 4 | board.board_id()
}

/// Incrementally packs one payload, rejecting overflow at push time.
#[derive(Debug)]
pub struct PayloadBuilder {
    buf: [u8; super::MAX_PAYLOAD],
    len: usize,
}

impl PayloadBuilder {
    pub fn node(payload_type: PayloadType, board: BoardType, address: u8) -> Result<Self> {
        let mut builder = Self::raw();
        builder.push_u8(header(payload_type, board))?;
        builder.push_u8(address)?;
        Ok(builder)
    }

    pub fn raw() -> Self {
        Self {
            buf: [0; super::MAX_PAYLOAD],
            len: 0,
        }
    }

    pub fn push_u8(&mut self, value: u8) -> Result<()> {
        self.push_bytes(&[value])
    }

    pub fn push_u16(&mut self, value: u16) -> Result<()> {
        self.push_bytes(&value.to_be_bytes())
    }

    pub fn push_u32(&mut self, value: u32) -> Result<()> {
        self.push_bytes(&value.to_be_bytes())
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if self.len + bytes.len() > super::MAX_PAYLOAD {
            return Err(NodeBusError::PayloadOverflow {
                size: self.len + bytes.len(),
                max: super::MAX_PAYLOAD,
            });
        }
        self.buf[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf[..self.len].to_vec()
    }
}

/// Fold an 8-byte downlink frame into its 12-bit receipt hash.
///
/// The action-log uplink identifies the command it answers by this hash, so
/// the fold must match what the downlink sender computes.
pub fn downlink_hash(frame: &[u8; 8]) -> u16 {
    let word = u64::from_be_bytes(*frame);
    let mut hash = 0u16;
    let mut rest = word;
    while rest != 0 {
        hash ^= (rest & 0xFFF) as u16;
        rest >>= 12;
    }
    hash
}

/// Receipt for one executed downlink command:
/// `[0xF:4][hash:12][register:8][value:32][status:8]`, 8 bytes.
pub fn pack_action_log(hash: u16, register: u8, value: u32, status_byte: u8) -> Vec<u8> {
    let mut payload = Vec::with_capacity(8);
    payload.push(0xF0 | ((hash >> 8) & 0x0F) as u8);
    payload.push((hash & 0xFF) as u8);
    payload.push(register);
    payload.extend_from_slice(&value.to_be_bytes());
    payload.push(status_byte);
    payload
}

/// Up to [`MAX_ERROR_ENTRIES`] failures drained from the master's own stack:
/// node header `[0xE0][master_address]` then `[address][register][status]`
/// per entry.
pub fn pack_error_stack(master_address: u8, entries: &[ErrorEntry]) -> Result<Vec<u8>> {
    if entries.is_empty() || entries.len() > MAX_ERROR_ENTRIES {
        return Err(NodeBusError::radio(format!(
            "error payload carries 1..={} entries, got {}",
            MAX_ERROR_ENTRIES,
            entries.len()
        )));
    }
    let mut builder =
        PayloadBuilder::node(PayloadType::ErrorStack, BoardType::Master, master_address)?;
    for entry in entries {
        builder.push_u8(entry.node_address)?;
        builder.push_u8(entry.register)?;
        builder.push_u8(entry.status_byte)?;
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_header_layout() {
        let builder =
            PayloadBuilder::node(PayloadType::Ambient, BoardType::SensorModule, 0x09).unwrap();
        let payload = builder.finish();
        assert_eq!(payload, vec![0x24, 0x09]);
    }

    #[test]
    fn test_builder_rejects_overflow() {
        let mut builder = PayloadBuilder::raw();
        for _ in 0..3 {
            builder.push_u32(0).unwrap();
        }
        assert!(builder.push_u8(0).is_err());
    }

    #[test]
    fn test_downlink_hash_folds_to_12_bits() {
        let frame = [0x02, 0x05, 0x04, 0x00, 0x00, 0x01, 0x2C, 0x00];
        let hash = downlink_hash(&frame);
        assert!(hash <= 0xFFF);
        // A single flipped bit changes the hash.
        let mut other = frame;
        other[7] ^= 0x01;
        assert_ne!(hash, downlink_hash(&other));
    }

    #[test]
    fn test_action_log_layout() {
        let payload = pack_action_log(0xABC, 0x04, 0x0000_0155, 0x81);
        assert_eq!(
            payload,
            vec![0xFA, 0xBC, 0x04, 0x00, 0x00, 0x01, 0x55, 0x81]
        );
    }

    #[test]
    fn test_error_stack_payload() {
        let entries = [
            ErrorEntry {
                node_address: 0x08,
                register: 0x04,
                status_byte: 0x02,
            },
            ErrorEntry {
                node_address: 0x09,
                register: 0x05,
                status_byte: 0x81,
            },
        ];
        let payload = pack_error_stack(0x00, &entries).unwrap();
        assert_eq!(
            payload,
            vec![0xE0, 0x00, 0x08, 0x04, 0x02, 0x09, 0x05, 0x81]
        );
        assert!(pack_error_stack(0x00, &[]).is_err());
    }

    #[test]
    fn test_rotation_tables_start_with_status() {
        for board in [
            BoardType::Master,
            BoardType::RelayModule,
            BoardType::BatteryModule,
            BoardType::GpsModule,
            BoardType::SensorModule,
            BoardType::MeterModule,
            BoardType::RadioModem,
        ] {
            assert_eq!(rotation(board)[0], PayloadType::Status);
        }
        assert_eq!(rotation(BoardType::RelayRack), &[PayloadType::RelayStates]);
    }
}
