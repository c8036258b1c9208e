//! Fixed-depth stack of failed register accesses.
//!
//! Each failed access leaves one entry; the radio layer drains entries into
//! error payloads, oldest first. When the stack is full the oldest entry is
//! dropped, so the most recent failures always survive.

use crate::core::registers::AccessStatus;

pub const ERROR_STACK_DEPTH: usize = 32;

/// One failed access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorEntry {
    pub node_address: u8,
    pub register: u8,
    /// Status byte as reported over the radio, direction bit included
    pub status_byte: u8,
}

#[derive(Debug)]
pub struct ErrorStack {
    entries: [Option<ErrorEntry>; ERROR_STACK_DEPTH],
    /// Index of the oldest entry
    head: usize,
    count: usize,
}

impl Default for ErrorStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorStack {
    pub fn new() -> Self {
        Self {
            entries: [None; ERROR_STACK_DEPTH],
            head: 0,
            count: 0,
        }
    }

    /// Record a failed access. Drops the oldest entry when full.
    pub fn push(&mut self, node_address: u8, register: u8, status: AccessStatus) {
        self.push_raw(node_address, register, status.as_byte());
    }

    /// Record a failure with a pre-built status byte, for rejections that
    /// never reached the bus.
    pub fn push_raw(&mut self, node_address: u8, register: u8, status_byte: u8) {
        let entry = ErrorEntry {
            node_address,
            register,
            status_byte,
        };
        let tail = (self.head + self.count) % ERROR_STACK_DEPTH;
        self.entries[tail] = Some(entry);
        if self.count == ERROR_STACK_DEPTH {
            self.head = (self.head + 1) % ERROR_STACK_DEPTH;
        } else {
            self.count += 1;
        }
    }

    /// Take the oldest entry
    pub fn pop_oldest(&mut self) -> Option<ErrorEntry> {
        if self.count == 0 {
            return None;
        }
        let entry = self.entries[self.head].take();
        self.head = (self.head + 1) % ERROR_STACK_DEPTH;
        self.count -= 1;
        entry
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}
