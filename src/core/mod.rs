//! Core services: transports, bus framing, register model, protocols,
//! node dispatch and the radio process.

pub mod bus;
pub mod hal;
pub mod node;
pub mod protocols;
pub mod radio;
pub mod registers;
pub mod transport;
