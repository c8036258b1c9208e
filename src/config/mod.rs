//! Service configuration
//!
//! Layered configuration in the figment style: built-in defaults, then an
//! optional YAML file, then `NODEBUS_`-prefixed environment variables.
//! Every struct derives serde with per-field defaults, and `validate()`
//! rejects values the bus or radio layers cannot operate with.

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{NodeBusError, Result};

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Service-level settings (logging)
    #[serde(default)]
    pub service: ServiceConfig,
    /// Addressed multi-drop bus settings
    #[serde(default)]
    pub bus: BusConfig,
    /// Raw point-to-point relay rack settings
    #[serde(default)]
    pub rack: RackConfig,
    /// Radio modem link settings
    #[serde(default)]
    pub modem: ModemConfig,
    /// Radio process settings
    #[serde(default)]
    pub radio: RadioConfig,
    /// Non-volatile register persistence settings
    #[serde(default)]
    pub nvm: NvmConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for rolling log files
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    /// Log to console instead of file
    #[serde(default = "default_true")]
    pub console: bool,
}

/// Serial and timing parameters of the addressed multi-drop bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Serial device path
    #[serde(default = "default_bus_device")]
    pub device: String,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Data bits (5-8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Stop bits (1-2)
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Parity: none, even, odd
    #[serde(default = "default_parity")]
    pub parity: String,
    /// Source address of the master on the bus (7-bit)
    #[serde(default = "default_master_address")]
    pub master_address: u8,
    /// First node address of the discovery sweep
    #[serde(default = "default_scan_start")]
    pub scan_start: u8,
    /// Last node address of the discovery sweep (inclusive)
    #[serde(default = "default_scan_end")]
    pub scan_end: u8,
    /// Default per-reply timeout in milliseconds
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
    /// Absolute sequence timeout in milliseconds
    #[serde(default = "default_bus_sequence_timeout_ms")]
    pub sequence_timeout_ms: u64,
    /// Reply waiter poll granule in milliseconds
    #[serde(default = "default_poll_granule_ms")]
    pub poll_granule_ms: u64,
}

/// Relay rack point-to-point settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RackConfig {
    /// Serial device path
    #[serde(default = "default_rack_device")]
    pub device: String,
    /// Baud rate
    #[serde(default = "default_rack_baud_rate")]
    pub baud_rate: u32,
    /// Fixed bus address byte of the rack protocol
    #[serde(default = "default_rack_bus_address")]
    pub bus_address: u8,
    /// Node address the rack occupies in the node list
    #[serde(default = "default_rack_node_address")]
    pub node_address: u8,
    /// Per-reply timeout in milliseconds
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
    /// Absolute sequence timeout in milliseconds
    #[serde(default = "default_rack_sequence_timeout_ms")]
    pub sequence_timeout_ms: u64,
}

/// Radio modem link settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModemConfig {
    /// Serial device path
    #[serde(default = "default_modem_device")]
    pub device: String,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Per-reply timeout in milliseconds (radio exchanges are slow)
    #[serde(default = "default_modem_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
    /// Absolute sequence timeout in milliseconds
    #[serde(default = "default_rack_sequence_timeout_ms")]
    pub sequence_timeout_ms: u64,
    /// Maximum uplink payload size imposed by the modem, header included
    #[serde(default = "default_max_payload")]
    pub max_payload: usize,
}

/// Radio process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Seconds between radio-process ticks
    #[serde(default = "default_tick_period_s")]
    pub tick_period_s: u64,
    /// Consecutive error reports a node may send before being suppressed
    /// until its error condition clears
    #[serde(default = "default_error_stack_flood_limit")]
    pub error_stack_flood_limit: u8,
}

/// Non-volatile register persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NvmConfig {
    /// Backing file for persisted master registers
    #[serde(default = "default_nvm_store_path")]
    pub store_path: String,
    /// Base byte address of the persisted register range
    #[serde(default)]
    pub base_address: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_true() -> bool {
    true
}
fn default_bus_device() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_rack_device() -> String {
    "/dev/ttyUSB1".to_string()
}
fn default_modem_device() -> String {
    "/dev/ttyUSB2".to_string()
}
fn default_baud_rate() -> u32 {
    9600
}
fn default_rack_baud_rate() -> u32 {
    9600
}
fn default_data_bits() -> u8 {
    8
}
fn default_stop_bits() -> u8 {
    1
}
fn default_parity() -> String {
    "none".to_string()
}
fn default_master_address() -> u8 {
    0x00
}
fn default_scan_start() -> u8 {
    0x08
}
fn default_scan_end() -> u8 {
    0x30
}
fn default_reply_timeout_ms() -> u64 {
    200
}
fn default_modem_reply_timeout_ms() -> u64 {
    10_000
}
fn default_bus_sequence_timeout_ms() -> u64 {
    120_000
}
fn default_rack_sequence_timeout_ms() -> u64 {
    60_000
}
fn default_poll_granule_ms() -> u64 {
    10
}
fn default_rack_bus_address() -> u8 {
    0xFF
}
fn default_rack_node_address() -> u8 {
    0x70
}
fn default_max_payload() -> usize {
    12
}
fn default_tick_period_s() -> u64 {
    600
}
fn default_error_stack_flood_limit() -> u8 {
    3
}
fn default_nvm_store_path() -> String {
    "nodebus-nvm.json".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            console: true,
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            device: default_bus_device(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: default_parity(),
            master_address: default_master_address(),
            scan_start: default_scan_start(),
            scan_end: default_scan_end(),
            reply_timeout_ms: default_reply_timeout_ms(),
            sequence_timeout_ms: default_bus_sequence_timeout_ms(),
            poll_granule_ms: default_poll_granule_ms(),
        }
    }
}

impl Default for RackConfig {
    fn default() -> Self {
        Self {
            device: default_rack_device(),
            baud_rate: default_rack_baud_rate(),
            bus_address: default_rack_bus_address(),
            node_address: default_rack_node_address(),
            reply_timeout_ms: default_reply_timeout_ms(),
            sequence_timeout_ms: default_rack_sequence_timeout_ms(),
        }
    }
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            device: default_modem_device(),
            baud_rate: default_baud_rate(),
            reply_timeout_ms: default_modem_reply_timeout_ms(),
            sequence_timeout_ms: default_rack_sequence_timeout_ms(),
            max_payload: default_max_payload(),
        }
    }
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            tick_period_s: default_tick_period_s(),
            error_stack_flood_limit: default_error_stack_flood_limit(),
        }
    }
}

impl Default for NvmConfig {
    fn default() -> Self {
        Self {
            store_path: default_nvm_store_path(),
            base_address: 0,
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional YAML file with env overrides.
    ///
    /// Environment variables use the `NODEBUS_` prefix and `__` as the
    /// section separator, e.g. `NODEBUS_BUS__BAUD_RATE=115200`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: AppConfig = figment
            .merge(Env::prefixed("NODEBUS_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.bus.baud_rate == 0 || self.rack.baud_rate == 0 || self.modem.baud_rate == 0 {
            return Err(NodeBusError::Config("Baud rate cannot be zero".to_string()));
        }
        if !(5..=8).contains(&self.bus.data_bits) {
            return Err(NodeBusError::Config(format!(
                "Invalid data bits: {}",
                self.bus.data_bits
            )));
        }
        if !(1..=2).contains(&self.bus.stop_bits) {
            return Err(NodeBusError::Config(format!(
                "Invalid stop bits: {}",
                self.bus.stop_bits
            )));
        }
        if !matches!(self.bus.parity.as_str(), "none" | "even" | "odd") {
            return Err(NodeBusError::Config(format!(
                "Invalid parity: {}",
                self.bus.parity
            )));
        }
        if self.bus.master_address & 0x80 != 0 {
            return Err(NodeBusError::Config(format!(
                "Master address 0x{:02X} exceeds the 7-bit range",
                self.bus.master_address
            )));
        }
        if self.bus.scan_end & 0x80 != 0 || self.bus.scan_start > self.bus.scan_end {
            return Err(NodeBusError::Config(format!(
                "Invalid scan range 0x{:02X}..=0x{:02X}",
                self.bus.scan_start, self.bus.scan_end
            )));
        }
        if self.bus.poll_granule_ms == 0 || self.bus.poll_granule_ms > 1000 {
            return Err(NodeBusError::Config(format!(
                "Poll granule {} ms out of range 1..=1000",
                self.bus.poll_granule_ms
            )));
        }
        if self.bus.reply_timeout_ms == 0 || self.bus.sequence_timeout_ms == 0 {
            return Err(NodeBusError::Config(
                "Bus timeouts cannot be zero".to_string(),
            ));
        }
        if self.modem.max_payload < 3 || self.modem.max_payload > 12 {
            return Err(NodeBusError::Config(format!(
                "Modem max payload {} out of range 3..=12",
                self.modem.max_payload
            )));
        }
        if self.radio.error_stack_flood_limit == 0 {
            return Err(NodeBusError::Config(
                "Error-stack flood limit cannot be zero".to_string(),
            ));
        }
        Ok(())
    }
}
