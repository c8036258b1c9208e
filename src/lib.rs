//! Node Bus Master (`nodebus`)
//!
//! Master-controller service for a multi-drop field bus of plug-in modules,
//! with periodic reporting and remote control over a constrained radio
//! uplink.
//!
//! # Features
//!
//! - **Addressed serial bus**: CR-terminated ASCII frames with destination
//!   and source address bytes, one shared rail powered per exchange
//! - **Multi-protocol register access**: AT-style addressed commands,
//!   a raw binary dialect for the relay rack, and the master's own
//!   virtual registers behind one dispatch surface
//! - **Typed register model**: per-board register tables with field masks,
//!   access policy, write timeouts and error values
//! - **Radio reporting**: round-robin node payloads capped at 12 bytes,
//!   error-stack and startup reports, action-log receipts
//! - **Remote control**: fixed 8-byte downlink commands, including
//!   temporary and successive writes held on a deferred action list
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌────────────────┐
//! │ RadioProcess │──►│  NodeAccess   │──►│   Protocols    │
//! │ (tick loop)  │   │ (dispatcher)  │   │ addr/raw/local │
//! └──────┬───────┘   └──────┬────────┘   └───────┬────────┘
//!        │                  │                    │
//!        ▼                  ▼                    ▼
//! ┌──────────────┐   ┌───────────────┐   ┌────────────────┐
//! │  RadioLink   │   │  ErrorStack   │   │  BusTransport  │
//! │ (AT modem)   │   │  PowerControl │   │ (serial/mock)  │
//! └──────────────┘   └───────────────┘   └────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//!
//! use nodebus::config::AppConfig;
//! use nodebus::utils::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load(Some(Path::new("config/nodebus.yaml")))?;
//!     config.validate()?;
//!     println!("bus device: {}", config.bus.device);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod utils;

pub use config::AppConfig;
pub use core::node::{NodeAccess, NodeRegistry};
pub use core::radio::RadioProcess;
pub use error::{NodeBusError, Result};
