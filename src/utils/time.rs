//! Time utilities
//!
//! Timestamp helpers, millisecond sleeps and the downlink duration-byte
//! codec shared by the scheduler and the downlink interpreter.

use chrono::Utc;
use std::time::Duration;
use tokio::time::sleep;

/// Get current UTC timestamp in RFC3339 format
pub fn current_timestamp() -> String {
    Utc::now().to_rfc3339()
}

/// Get current UTC time as Unix timestamp in seconds
pub fn unix_timestamp() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Sleep for the given number of milliseconds
pub async fn sleep_ms(ms: u64) {
    sleep(Duration::from_millis(ms)).await;
}

/// Unit selector bit of the downlink duration byte.
///
/// Bit 7 clear: low 7 bits are seconds. Bit 7 set: low 7 bits are tens of
/// seconds, extending the deferrable range to 1270 s with one byte.
const DURATION_TENS_FLAG: u8 = 0x80;

/// Decode a downlink duration byte into seconds.
pub fn decode_duration_s(byte: u8) -> u32 {
    let value = u32::from(byte & !DURATION_TENS_FLAG);
    if byte & DURATION_TENS_FLAG != 0 {
        value * 10
    } else {
        value
    }
}

/// Encode a duration in seconds into the one-byte downlink form.
///
/// Durations above 127 s are rounded down to the nearest 10 s; durations
/// above the encodable maximum saturate at 1270 s.
pub fn encode_duration_s(seconds: u32) -> u8 {
    if seconds <= 127 {
        seconds as u8
    } else {
        let tens = (seconds / 10).min(127) as u8;
        tens | DURATION_TENS_FLAG
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_byte_seconds() {
        assert_eq!(decode_duration_s(0), 0);
        assert_eq!(decode_duration_s(1), 1);
        assert_eq!(decode_duration_s(127), 127);
    }

    #[test]
    fn test_duration_byte_tens() {
        assert_eq!(decode_duration_s(0x80), 0);
        assert_eq!(decode_duration_s(0x81), 10);
        assert_eq!(decode_duration_s(0xFF), 1270);
    }

    #[test]
    fn test_duration_encode() {
        assert_eq!(encode_duration_s(45), 45);
        assert_eq!(decode_duration_s(encode_duration_s(45)), 45);
        assert_eq!(decode_duration_s(encode_duration_s(300)), 300);
        // Rounded down to tens above 127 s
        assert_eq!(decode_duration_s(encode_duration_s(135)), 130);
        // Saturates at the encodable maximum
        assert_eq!(decode_duration_s(encode_duration_s(100_000)), 1270);
    }

    #[test]
    fn test_unix_timestamp_monotonic_enough() {
        let a = unix_timestamp();
        let b = unix_timestamp();
        assert!(b >= a);
    }
}
