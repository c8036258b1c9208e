//! Downlink command interpreter.
//!
//! Every downlink is a fixed 8-byte frame starting with an op code. Write
//! values are sized to fit the frame, so wide-register ops carry 32-bit
//! values while multi-write ops shrink to 16 or 8 bits per value. Trailing
//! frame bytes beyond an op's operands are padding and ignored.

use crate::utils::time::decode_duration_s;
use crate::error::{NodeBusError, Result};

/// Downlink op codes
pub mod op {
    pub const NOP: u8 = 0x00;
    pub const SINGLE_FULL_READ: u8 = 0x01;
    pub const SINGLE_FULL_WRITE: u8 = 0x02;
    pub const SINGLE_MASKED_WRITE: u8 = 0x03;
    pub const TEMPORARY_FULL_WRITE: u8 = 0x04;
    pub const TEMPORARY_MASKED_WRITE: u8 = 0x05;
    pub const SUCCESSIVE_FULL_WRITE: u8 = 0x06;
    pub const SUCCESSIVE_MASKED_WRITE: u8 = 0x07;
    pub const DUAL_FULL_WRITE: u8 = 0x08;
    pub const TRIPLE_FULL_WRITE: u8 = 0x09;
    pub const DUAL_NODE_WRITE: u8 = 0x0A;
}

/// One write within a downlink command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOp {
    pub address: u8,
    pub register: u8,
    /// In-register field mask; the full declared field when the op carries
    /// no explicit mask
    pub mask: Option<u32>,
    pub value: u32,
}

/// A decoded downlink frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownlinkCommand {
    Nop,
    Read {
        address: u8,
        register: u8,
    },
    /// Immediate writes, executed in frame order
    Write(Vec<WriteOp>),
    /// Write now, restore the previous value after the hold time
    Temporary {
        write: WriteOp,
        hold_s: u32,
    },
    /// Write the first value now and the second after the hold time
    Successive {
        first: WriteOp,
        second_value: u32,
        hold_s: u32,
    },
}

/// Decode one 8-byte downlink frame.
pub fn interpret(frame: &[u8; 8]) -> Result<DownlinkCommand> {
    let command = match frame[0] {
        op::NOP => DownlinkCommand::Nop,
        op::SINGLE_FULL_READ => DownlinkCommand::Read {
            address: frame[1],
            register: frame[2],
        },
        op::SINGLE_FULL_WRITE => DownlinkCommand::Write(vec![WriteOp {
            address: frame[1],
            register: frame[2],
            mask: None,
            value: u32::from_be_bytes([frame[3], frame[4], frame[5], frame[6]]),
        }]),
        op::SINGLE_MASKED_WRITE => DownlinkCommand::Write(vec![WriteOp {
            address: frame[1],
            register: frame[2],
            mask: Some(u32::from(u16::from_be_bytes([frame[3], frame[4]]))),
            value: u32::from(u16::from_be_bytes([frame[5], frame[6]])),
        }]),
        op::TEMPORARY_FULL_WRITE => DownlinkCommand::Temporary {
            write: WriteOp {
                address: frame[1],
                register: frame[2],
                mask: None,
                value: u32::from_be_bytes([frame[3], frame[4], frame[5], frame[6]]),
            },
            hold_s: decode_duration_s(frame[7]),
        },
        op::TEMPORARY_MASKED_WRITE => DownlinkCommand::Temporary {
            write: WriteOp {
                address: frame[1],
                register: frame[2],
                mask: Some(u32::from(u16::from_be_bytes([frame[3], frame[4]]))),
                value: u32::from(frame[5]),
            },
            hold_s: decode_duration_s(frame[7]),
        },
        op::SUCCESSIVE_FULL_WRITE => DownlinkCommand::Successive {
            first: WriteOp {
                address: frame[1],
                register: frame[2],
                mask: None,
                value: u32::from(u16::from_be_bytes([frame[3], frame[4]])),
            },
            second_value: u32::from(u16::from_be_bytes([frame[5], frame[6]])),
            hold_s: decode_duration_s(frame[7]),
        },
        op::SUCCESSIVE_MASKED_WRITE => DownlinkCommand::Successive {
            first: WriteOp {
                address: frame[1],
                register: frame[2],
                mask: Some(u32::from(frame[3])),
                value: u32::from(frame[4]),
            },
            second_value: u32::from(frame[5]),
            hold_s: decode_duration_s(frame[6]),
        },
        op::DUAL_FULL_WRITE => DownlinkCommand::Write(vec![
            WriteOp {
                address: frame[1],
                register: frame[2],
                mask: None,
                value: u32::from(u16::from_be_bytes([frame[3], frame[4]])),
            },
            WriteOp {
                address: frame[1],
                register: frame[5],
                mask: None,
                value: u32::from(u16::from_be_bytes([frame[6], frame[7]])),
            },
        ]),
        op::TRIPLE_FULL_WRITE => DownlinkCommand::Write(vec![
            WriteOp {
                address: frame[1],
                register: frame[2],
                mask: None,
                value: u32::from(frame[3]),
            },
            WriteOp {
                address: frame[1],
                register: frame[4],
                mask: None,
                value: u32::from(frame[5]),
            },
            WriteOp {
                address: frame[1],
                register: frame[6],
                mask: None,
                value: u32::from(frame[7]),
            },
        ]),
        op::DUAL_NODE_WRITE => DownlinkCommand::Write(vec![
            WriteOp {
                address: frame[1],
                register: frame[2],
                mask: None,
                value: u32::from(frame[3]),
            },
            WriteOp {
                address: frame[4],
                register: frame[5],
                mask: None,
                value: u32::from(frame[6]),
            },
        ]),
        unknown => return Err(NodeBusError::UnknownOpCode(unknown)),
    };
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nop() {
        let frame = [0u8; 8];
        assert_eq!(interpret(&frame).unwrap(), DownlinkCommand::Nop);
    }

    #[test]
    fn test_single_full_write() {
        let frame = [0x02, 0x08, 0x04, 0x00, 0x00, 0x01, 0x55, 0x00];
        let command = interpret(&frame).unwrap();
        assert_eq!(
            command,
            DownlinkCommand::Write(vec![WriteOp {
                address: 0x08,
                register: 0x04,
                mask: None,
                value: 0x0000_0155,
            }])
        );
    }

    #[test]
    fn test_single_masked_write() {
        // Set bits 7:4 of relay state at node 0x08 to 0x5.
        let frame = [0x03, 0x08, 0x04, 0x00, 0xF0, 0x00, 0x05, 0x00];
        let command = interpret(&frame).unwrap();
        assert_eq!(
            command,
            DownlinkCommand::Write(vec![WriteOp {
                address: 0x08,
                register: 0x04,
                mask: Some(0x00F0),
                value: 0x05,
            }])
        );
    }

    #[test]
    fn test_temporary_write_decodes_duration() {
        // Hold 300 s: tens flag + 30.
        let frame = [0x04, 0x08, 0x04, 0x00, 0x00, 0x00, 0x01, 0x9E];
        match interpret(&frame).unwrap() {
            DownlinkCommand::Temporary { write, hold_s } => {
                assert_eq!(write.value, 1);
                assert_eq!(hold_s, 300);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_successive_write() {
        let frame = [0x06, 0x08, 0x04, 0x00, 0x01, 0x00, 0x00, 0x1E];
        match interpret(&frame).unwrap() {
            DownlinkCommand::Successive {
                first,
                second_value,
                hold_s,
            } => {
                assert_eq!(first.value, 1);
                assert_eq!(second_value, 0);
                assert_eq!(hold_s, 30);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_dual_node_write() {
        let frame = [0x0A, 0x08, 0x04, 0x01, 0x09, 0x04, 0x02, 0x00];
        match interpret(&frame).unwrap() {
            DownlinkCommand::Write(writes) => {
                assert_eq!(writes.len(), 2);
                assert_eq!(writes[0].address, 0x08);
                assert_eq!(writes[1].address, 0x09);
                assert_eq!(writes[1].value, 2);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_op_rejected() {
        let frame = [0x42, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            interpret(&frame),
            Err(NodeBusError::UnknownOpCode(0x42))
        ));
    }
}
