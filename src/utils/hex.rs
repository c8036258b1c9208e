//! Hex helpers for frame-level logging

/// Format a byte slice as uppercase hex pairs separated by spaces.
///
/// Used by the transport and protocol layers when dumping TX/RX frames at
/// debug level.
pub fn dump(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format a byte slice as a compact hex string (no separators).
///
/// This is the on-wire form used by the modem uplink command
/// (`AT$SF=<hex>`).
pub fn compact(data: &[u8]) -> String {
    hex::encode_upper(data)
}

/// Parse a compact hex string into bytes.
pub fn parse(s: &str) -> Option<Vec<u8>> {
    hex::decode(s.trim()).ok()
}
