//! Reply-line ring buffer
//!
//! Fixed-capacity ring of line slots filled one byte at a time by the
//! receive path and drained by the reply waiter. Slots are created once and
//! only ever reset; a line that outgrows its buffer wraps and carries an
//! overflow flag instead of failing the receive path.
//!
//! For the addressed protocol the decoder first consumes the destination
//! address byte (0x80 marker set) and the source address byte, then
//! accumulates ASCII payload until CR. Completing a line resets the decoder
//! to address-hunting, so a stray mid-line power-up never desynchronizes
//! more than one line.

/// Byte capacity of one line slot
pub const LINE_CAPACITY: usize = 64;

/// Number of line slots in the ring
pub const RING_CAPACITY: usize = 8;

/// One reply-line slot
#[derive(Debug, Clone)]
struct ReplyLine {
    buf: [u8; LINE_CAPACITY],
    len: usize,
    complete: bool,
    overflowed: bool,
    source_address: Option<u8>,
}

impl ReplyLine {
    const fn new() -> Self {
        Self {
            buf: [0; LINE_CAPACITY],
            len: 0,
            complete: false,
            overflowed: false,
            source_address: None,
        }
    }

    fn reset(&mut self) {
        self.len = 0;
        self.complete = false;
        self.overflowed = false;
        self.source_address = None;
    }

    fn push(&mut self, byte: u8) {
        if self.len >= LINE_CAPACITY {
            // Wrap instead of dropping bytes; the consumer sees the flag.
            self.len = 0;
            self.overflowed = true;
        }
        self.buf[self.len] = byte;
        self.len += 1;
    }
}

/// A completed line handed to the reply waiter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedLine {
    /// Line payload with the terminator stripped
    pub text: String,
    /// Source address parsed from the frame (addressed protocol only)
    pub source_address: Option<u8>,
    /// The line wrapped its buffer at least once
    pub overflowed: bool,
}

/// Decoding mode of the receive path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Addressed multi-drop: destination + source bytes precede the payload
    Addressed,
    /// Point-to-point: payload only
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    /// Hunting for a byte with the address marker (addressed mode only)
    DestAddress,
    /// Next byte is the peer source address
    SourceAddress,
    /// Accumulating ASCII payload until CR
    Payload,
}

/// Fixed-capacity ring of reply-line slots
#[derive(Debug)]
pub struct LineRing {
    slots: [ReplyLine; RING_CAPACITY],
    write_index: usize,
    read_index: usize,
    mode: DecodeMode,
    state: RxState,
    pending_source: Option<u8>,
}

impl LineRing {
    /// Create an empty ring for the given decode mode
    pub fn new(mode: DecodeMode) -> Self {
        let state = match mode {
            DecodeMode::Addressed => RxState::DestAddress,
            DecodeMode::Direct => RxState::Payload,
        };
        Self {
            slots: [const { ReplyLine::new() }; RING_CAPACITY],
            write_index: 0,
            read_index: 0,
            mode,
            state,
            pending_source: None,
        }
    }

    /// Feed one received byte into the ring.
    ///
    /// Invoked once per byte; never parses, never blocks.
    pub fn push_byte(&mut self, byte: u8) {
        match self.state {
            RxState::DestAddress => {
                // Discard noise until an address-marked byte arrives. The
                // destination is this master; its value is consumed here and
                // not stored.
                if byte & super::frame::ADDRESS_MARKER != 0 {
                    self.state = RxState::SourceAddress;
                }
            }
            RxState::SourceAddress => {
                self.pending_source = Some(byte);
                self.state = RxState::Payload;
            }
            RxState::Payload => {
                if byte == super::frame::CR {
                    let source = self.pending_source.take();
                    let slot = &mut self.slots[self.write_index];
                    slot.complete = true;
                    slot.source_address = source;
                    self.write_index = (self.write_index + 1) % RING_CAPACITY;
                    if self.slots[self.write_index].complete && self.read_index == self.write_index {
                        // Ring full: drop the oldest unconsumed line.
                        self.read_index = (self.read_index + 1) % RING_CAPACITY;
                    }
                    self.slots[self.write_index].reset();
                    // Protocol reset: the next addressed line starts with its
                    // destination byte again.
                    self.state = match self.mode {
                        DecodeMode::Addressed => RxState::DestAddress,
                        DecodeMode::Direct => RxState::Payload,
                    };
                } else {
                    self.slots[self.write_index].push(byte);
                }
            }
        }
    }

    /// Take the oldest completed line, if any, resetting its slot.
    pub fn pop_completed(&mut self) -> Option<CompletedLine> {
        let slot = &mut self.slots[self.read_index];
        if !slot.complete {
            return None;
        }
        let line = CompletedLine {
            text: String::from_utf8_lossy(&slot.buf[..slot.len]).into_owned(),
            source_address: slot.source_address,
            overflowed: slot.overflowed,
        };
        slot.reset();
        self.read_index = (self.read_index + 1) % RING_CAPACITY;
        Some(line)
    }

    /// Discard all buffered lines and partial input
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            slot.reset();
        }
        self.write_index = 0;
        self.read_index = 0;
        self.pending_source = None;
        self.state = match self.mode {
            DecodeMode::Addressed => RxState::DestAddress,
            DecodeMode::Direct => RxState::Payload,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(ring: &mut LineRing, bytes: &[u8]) {
        for &b in bytes {
            ring.push_byte(b);
        }
    }

    #[test]
    fn test_direct_line_completion() {
        let mut ring = LineRing::new(DecodeMode::Direct);
        feed(&mut ring, b"OK\r");
        let line = ring.pop_completed().unwrap();
        assert_eq!(line.text, "OK");
        assert_eq!(line.source_address, None);
        assert!(!line.overflowed);
        assert!(ring.pop_completed().is_none());
    }

    #[test]
    fn test_addressed_line_extracts_source() {
        let mut ring = LineRing::new(DecodeMode::Addressed);
        // dest = master | marker, source = 0x05, payload "OK"
        feed(&mut ring, &[0x80, 0x05]);
        feed(&mut ring, b"OK\r");
        let line = ring.pop_completed().unwrap();
        assert_eq!(line.text, "OK");
        assert_eq!(line.source_address, Some(0x05));
    }

    #[test]
    fn test_addressed_noise_before_marker_is_discarded() {
        let mut ring = LineRing::new(DecodeMode::Addressed);
        feed(&mut ring, &[0x12, 0x34]); // no marker bit, noise
        feed(&mut ring, &[0x80, 0x09]);
        feed(&mut ring, b"123\r");
        let line = ring.pop_completed().unwrap();
        assert_eq!(line.text, "123");
        assert_eq!(line.source_address, Some(0x09));
    }

    #[test]
    fn test_multiple_lines_in_order() {
        let mut ring = LineRing::new(DecodeMode::Direct);
        feed(&mut ring, b"first\rsecond\r");
        assert_eq!(ring.pop_completed().unwrap().text, "first");
        assert_eq!(ring.pop_completed().unwrap().text, "second");
        assert!(ring.pop_completed().is_none());
    }

    #[test]
    fn test_line_overflow_wraps_and_flags() {
        let mut ring = LineRing::new(DecodeMode::Direct);
        let long = vec![b'A'; LINE_CAPACITY + 5];
        feed(&mut ring, &long);
        ring.push_byte(super::super::frame::CR);
        let line = ring.pop_completed().unwrap();
        assert!(line.overflowed);
        assert_eq!(line.text.len(), 5);
    }

    #[test]
    fn test_decoder_resets_after_each_addressed_line() {
        let mut ring = LineRing::new(DecodeMode::Addressed);
        feed(&mut ring, &[0x80, 0x05]);
        feed(&mut ring, b"OK\r");
        // Payload bytes without a new address prefix are noise now.
        feed(&mut ring, b"garbage");
        feed(&mut ring, &[0x80, 0x06]);
        feed(&mut ring, b"1A2B\r");

        assert_eq!(ring.pop_completed().unwrap().source_address, Some(0x05));
        let second = ring.pop_completed().unwrap();
        assert_eq!(second.text, "1A2B");
        assert_eq!(second.source_address, Some(0x06));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut ring = LineRing::new(DecodeMode::Direct);
        feed(&mut ring, b"partial");
        feed(&mut ring, b"done\r");
        ring.clear();
        assert!(ring.pop_completed().is_none());
        feed(&mut ring, b"new\r");
        assert_eq!(ring.pop_completed().unwrap().text, "new");
    }
}
