//! Reply waiter
//!
//! Converts the ring of completed lines into one typed result, honoring two
//! timeouts. The waiter is a finite automaton with a single polling state:
//!
//! ```text
//!            ┌──────────────────────────────┐
//!            │           WAITING            │
//!            └──┬────────────┬───────────┬──┘
//!               │            │           │
//!          SUCCESS    ERROR_RECEIVED  TIMED_OUT
//!                                     (reply_timeout | parser_error
//!                                      | sequence_timeout)
//! ```
//!
//! Loop ordering is deliberate and must not change: each iteration checks
//! for a new completed line BEFORE checking the elapsed timers, so a reply
//! arriving in the same granule as a timeout expiry is never dropped in
//! favor of the timeout.

use std::time::Duration;
use tracing::{debug, trace};

use super::line_ring::LineRing;
use crate::core::registers::{AccessStatus, Direction};
use crate::core::transport::BusTransport;
use crate::error::Result;

/// Expected reply type of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Fire-and-forget: no reply expected, immediate success
    None,
    /// Any completed line is accepted
    Raw,
    /// An exact "OK" token is required
    Ok,
    /// A numeric token in the given format is required
    Value(ValueFormat),
}

/// Numeric format of a `ReplyKind::Value` reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueFormat {
    Decimal,
    Hexadecimal,
    Boolean,
}

/// Parameters of one reply wait
#[derive(Debug, Clone)]
pub struct ReplySpec {
    pub kind: ReplyKind,
    /// For the addressed protocol: the address this exchange was sent to.
    /// Lines from any other source are discarded with the mismatch bit set.
    pub expected_source: Option<u8>,
    /// Per-reply timeout
    pub reply_timeout: Duration,
    /// Absolute cap on the whole exchange
    pub sequence_timeout: Duration,
    /// Poll granule
    pub poll_granule: Duration,
}

/// Terminal result of a reply wait
#[derive(Debug, Clone)]
pub struct ReplyOutcome {
    /// Failure bits; empty means success
    pub status: AccessStatus,
    /// The raw line that terminated the wait, when one did
    pub line: Option<String>,
    /// Parsed value for `ReplyKind::Value`
    pub value: Option<u32>,
}

impl ReplyOutcome {
    fn success(status: AccessStatus, line: String, value: Option<u32>) -> Self {
        Self {
            status,
            line: Some(line),
            value,
        }
    }
}

/// Token every node sends when it rejects a command
const ERROR_TOKEN: &str = "ERROR";

/// Parse a numeric token in the given format
fn parse_value(text: &str, format: ValueFormat) -> Option<u32> {
    let token = text.trim();
    match format {
        ValueFormat::Decimal => token.parse::<u32>().ok(),
        ValueFormat::Hexadecimal => {
            let stripped = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            u32::from_str_radix(stripped, 16).ok()
        }
        ValueFormat::Boolean => match token {
            "0" => Some(0),
            "1" => Some(1),
            _ => None,
        },
    }
}

/// Wait for one reply on the given transport and ring.
///
/// Pumps received bytes into the ring once per granule, then consumes
/// completed lines against the expected grammar. Returns `Err` only for
/// transport faults; every protocol-level failure is an [`AccessStatus`]
/// bit inside `Ok`.
pub async fn wait_reply(
    transport: &mut (impl BusTransport + ?Sized),
    ring: &mut LineRing,
    spec: &ReplySpec,
    direction: Direction,
) -> Result<ReplyOutcome> {
    let mut status = AccessStatus::new(direction);

    // Fire-and-forget writes short-circuit.
    if spec.kind == ReplyKind::None {
        return Ok(ReplyOutcome {
            status,
            line: None,
            value: None,
        });
    }

    let mut reply_elapsed = Duration::ZERO;
    let mut sequence_elapsed = Duration::ZERO;
    let mut received_any = false;

    loop {
        tokio::time::sleep(spec.poll_granule).await;
        reply_elapsed += spec.poll_granule;
        sequence_elapsed += spec.poll_granule;

        // Drain whatever the bus produced during the granule.
        let mut buf = [0u8; 64];
        loop {
            let n = transport.receive(&mut buf, Duration::ZERO).await?;
            if n == 0 {
                break;
            }
            for &b in &buf[..n] {
                ring.push_byte(b);
            }
        }

        while let Some(line) = ring.pop_completed() {
            received_any = true;
            trace!("reply line: {:?} (source {:?})", line.text, line.source_address);

            if let Some(expected) = spec.expected_source {
                if line.source_address != Some(expected) {
                    debug!(
                        "source address mismatch: expected 0x{:02X}, got {:?}",
                        expected, line.source_address
                    );
                    status.set_source_address_mismatch();
                    continue;
                }
            }

            if line.overflowed {
                // Wrapped lines cannot be trusted against any grammar.
                status.set_parser_error();
                continue;
            }

            match spec.kind {
                ReplyKind::None => unreachable!("handled above"),
                ReplyKind::Raw => {
                    return Ok(ReplyOutcome::success(status, line.text, None));
                }
                ReplyKind::Ok => {
                    if line.text.trim() == "OK" {
                        return Ok(ReplyOutcome::success(status, line.text, None));
                    }
                    if line.text.trim_start().starts_with(ERROR_TOKEN) {
                        status.set_error_received();
                        return Ok(ReplyOutcome::success(status, line.text, None));
                    }
                    // Neither OK nor ERROR: discard and keep waiting.
                }
                ReplyKind::Value(format) => {
                    if let Some(value) = parse_value(&line.text, format) {
                        return Ok(ReplyOutcome::success(status, line.text, Some(value)));
                    }
                    if line.text.trim_start().starts_with(ERROR_TOKEN) {
                        status.set_error_received();
                        return Ok(ReplyOutcome::success(status, line.text, None));
                    }
                }
            }
        }

        if reply_elapsed >= spec.reply_timeout {
            if received_any {
                // A reply arrived but never matched the expected grammar.
                status.set_parser_error();
            } else {
                status.set_reply_timeout();
            }
            return Ok(ReplyOutcome {
                status,
                line: None,
                value: None,
            });
        }

        if sequence_elapsed >= spec.sequence_timeout {
            status.set_sequence_timeout();
            return Ok(ReplyOutcome {
                status,
                line: None,
                value: None,
            });
        }
    }
}
