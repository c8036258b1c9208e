//! Bus transport layer
//!
//! Byte-stream access to the physical buses. Protocol code only ever sees
//! the [`BusTransport`] trait; the serial implementation drives real UARTs
//! and the mock implementation scripts exchanges in tests.

pub mod mock;
pub mod serial;
pub mod traits;

pub use mock::{MockBusTransport, MockTransportHandle};
pub use serial::{SerialBusTransport, SerialConfig};
pub use traits::{BusTransport, TransportError, TransportStats};
