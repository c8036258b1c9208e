//! Frame construction for the bus protocols
//!
//! Three wire formats leave the master:
//!
//! - Addressed multi-drop: `[dest | 0x80] [src] [ASCII command] [CR]`. The
//!   0x80 bit marks the byte as an address rather than data on the shared
//!   bus; the source byte carries no marker.
//! - Point-to-point: `[ASCII command] [CR]`, single peer, no addressing.
//! - Raw rack command: `[bus_address] [code] [value]`, three bytes, no
//!   terminator.

use crate::error::{NodeBusError, Result};

/// Marker bit distinguishing address bytes from data bytes on the shared bus
pub const ADDRESS_MARKER: u8 = 0x80;

/// Line terminator for the ASCII protocols
pub const CR: u8 = 0x0D;

/// Ping command answered with OK by every addressed node
pub const PING_COMMAND: &str = "RS";

/// Build a register read command (`AT$R=<hex_addr>`)
pub fn read_command(reg_addr: u8) -> String {
    format!("AT$R={reg_addr:02X}")
}

/// Build a register write command (`AT$W=<hex_addr>,<value>`)
pub fn write_command(reg_addr: u8, value: u32) -> String {
    format!("AT$W={reg_addr:02X},{value:X}")
}

/// Build an addressed multi-drop frame.
///
/// Both addresses must fit the 7-bit range; the destination gets the
/// address-marker bit on the wire.
pub fn build_addressed_frame(dest: u8, src: u8, command: &str) -> Result<Vec<u8>> {
    if dest & ADDRESS_MARKER != 0 {
        return Err(NodeBusError::Protocol(format!(
            "Destination address 0x{dest:02X} exceeds the 7-bit range"
        )));
    }
    if src & ADDRESS_MARKER != 0 {
        return Err(NodeBusError::Protocol(format!(
            "Source address 0x{src:02X} exceeds the 7-bit range"
        )));
    }
    let mut frame = Vec::with_capacity(command.len() + 3);
    frame.push(dest | ADDRESS_MARKER);
    frame.push(src);
    frame.extend_from_slice(command.as_bytes());
    frame.push(CR);
    Ok(frame)
}

/// Build a point-to-point frame (no addressing bytes, single peer)
pub fn build_direct_frame(command: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(command.len() + 1);
    frame.extend_from_slice(command.as_bytes());
    frame.push(CR);
    frame
}

/// Build a raw rack command (3 bytes, no terminator)
pub fn build_raw_command(bus_address: u8, code: u8, value: u8) -> [u8; 3] {
    [bus_address, code, value]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addressed_frame_layout() {
        let frame = build_addressed_frame(0x05, 0x00, "RS").unwrap();
        assert_eq!(frame, vec![0x85, 0x00, b'R', b'S', 0x0D]);
    }

    #[test]
    fn test_addressed_frame_rejects_8bit_addresses() {
        assert!(build_addressed_frame(0x85, 0x00, "RS").is_err());
        assert!(build_addressed_frame(0x05, 0x80, "RS").is_err());
    }

    #[test]
    fn test_direct_frame_layout() {
        let frame = build_direct_frame("AT$SF=ABCD");
        assert_eq!(&frame[..frame.len() - 1], b"AT$SF=ABCD");
        assert_eq!(*frame.last().unwrap(), CR);
    }

    #[test]
    fn test_raw_command() {
        assert_eq!(build_raw_command(0xFF, 0x03, 0x01), [0xFF, 0x03, 0x01]);
    }

    #[test]
    fn test_command_formatting() {
        assert_eq!(read_command(0x10), "AT$R=10");
        assert_eq!(write_command(0x10, 0x2A), "AT$W=10,2A");
        assert_eq!(write_command(0x04, 0), "AT$W=04,0");
    }
}
