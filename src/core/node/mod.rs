//! Node inventory and register-access dispatch.
//!
//! The registry tracks which nodes answered the last bus scan; the
//! dispatcher routes each register access to the protocol the node's board
//! type speaks and keeps the rail powered for exactly the duration of the
//! exchange. Failed accesses land on the error stack for the radio layer
//! to report.

pub mod dispatcher;
pub mod error_stack;
pub mod registry;

pub use dispatcher::NodeAccess;
pub use error_stack::{ErrorEntry, ErrorStack, ERROR_STACK_DEPTH};
pub use registry::{Node, NodeRegistry, MAX_NODES};
