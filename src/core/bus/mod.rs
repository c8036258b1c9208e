//! Addressed-bus framing and reply handling
//!
//! The frame codec serializes commands for the two ASCII bus protocols and
//! the raw rack protocol; the line ring turns the byte-at-a-time receive
//! path into completed lines; the reply waiter turns completed lines into
//! one typed, timed-out result.

pub mod frame;
pub mod line_ring;
pub mod reply;

pub use frame::{
    build_addressed_frame, build_direct_frame, build_raw_command, read_command, write_command,
    ADDRESS_MARKER, CR, PING_COMMAND,
};
pub use line_ring::{CompletedLine, DecodeMode, LineRing, LINE_CAPACITY, RING_CAPACITY};
pub use reply::{wait_reply, ReplyKind, ReplyOutcome, ReplySpec, ValueFormat};
