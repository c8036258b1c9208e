//! Board types and per-board register tables
//!
//! Each board type declares a register table: bit-field mask, access policy,
//! write timeout, error value and reset-value policy per register. The first
//! four addresses are common to every board; specific registers start at
//! 0x04. Register addressing is per board type, values are 32-bit.
//!
//! Dispatch by board id goes through this closed enum; there is no function
//! pointer to be null at runtime.

use crate::error::{NodeBusError, Result};

/// Register access policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// Register value policy after a board reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetPolicy {
    /// Starts pinned at the error value until first refreshed
    StaticError,
    /// Restored from non-volatile memory
    Persisted,
    /// Computed at runtime (identity, uptime)
    Runtime,
}

/// One register table entry
#[derive(Debug, Clone, Copy)]
pub struct RegisterDef {
    pub addr: u8,
    pub name: &'static str,
    /// Declared bit-field layout; a register's effective value never
    /// exceeds this mask.
    pub mask: u32,
    pub access: Access,
    pub reset: ResetPolicy,
    pub write_timeout_ms: u64,
    /// Value consumers see when access fails
    pub error_value: u32,
}

const fn reg(
    addr: u8,
    name: &'static str,
    mask: u32,
    access: Access,
    reset: ResetPolicy,
    write_timeout_ms: u64,
    error_value: u32,
) -> RegisterDef {
    RegisterDef {
        addr,
        name,
        mask,
        access,
        reset,
        write_timeout_ms,
        error_value,
    }
}

/// Common register addresses (all board types)
pub mod common {
    pub const BOARD_ID: u8 = 0x00;
    pub const FW_VERSION: u8 = 0x01;
    pub const STATUS: u8 = 0x02;
    pub const ERROR_STACK: u8 = 0x03;

    // STATUS register bit fields
    pub const STATUS_BOOT_FLAG_MASK: u32 = 0x0000_0001;
    pub const STATUS_ERROR_STACK_FLAG_MASK: u32 = 0x0000_0002;
    pub const STATUS_RESET_REASON_MASK: u32 = 0x0000_FF00;

    // FW_VERSION register bit fields
    pub const FW_VERSION_MAJOR_MASK: u32 = 0x0000_FF00;
    pub const FW_VERSION_MINOR_MASK: u32 = 0x0000_00FF;
}

const COMMON_REGISTERS: [RegisterDef; 4] = [
    reg(common::BOARD_ID, "BOARD_ID", 0x0000_00FF, Access::ReadOnly, ResetPolicy::Runtime, 100, 0xFF),
    reg(common::FW_VERSION, "FW_VERSION", 0x0000_FFFF, Access::ReadOnly, ResetPolicy::Runtime, 100, 0xFFFF),
    reg(common::STATUS, "STATUS", 0x0000_FF03, Access::ReadWrite, ResetPolicy::Runtime, 100, 0xFF03),
    reg(common::ERROR_STACK, "ERROR_STACK", 0x0000_FFFF, Access::ReadOnly, ResetPolicy::StaticError, 100, 0xFFFF),
];

/// Relay module registers
pub mod relay {
    pub const RELAY_STATE: u8 = 0x04;
    pub const VOLTAGE_MV: u8 = 0x05;
    pub const CURRENT_UA: u8 = 0x06;
}

const RELAY_REGISTERS: [RegisterDef; 3] = [
    reg(relay::RELAY_STATE, "RELAY_STATE", 0x0000_00FF, Access::ReadWrite, ResetPolicy::StaticError, 2000, 0xFF),
    reg(relay::VOLTAGE_MV, "VOLTAGE_MV", 0x0000_FFFF, Access::ReadOnly, ResetPolicy::StaticError, 100, 0xFFFF),
    reg(relay::CURRENT_UA, "CURRENT_UA", 0x00FF_FFFF, Access::ReadOnly, ResetPolicy::StaticError, 100, 0x00FF_FFFF),
];

/// Battery module registers
pub mod battery {
    pub const VBATT_MV: u8 = 0x04;
    pub const CHARGE_CONTROL: u8 = 0x05;
    pub const OUTPUT_CURRENT_UA: u8 = 0x06;

    pub const CHARGE_ENABLE_MASK: u32 = 0x0000_0001;
    pub const CHARGE_RUNNING_MASK: u32 = 0x0000_0002;
}

const BATTERY_REGISTERS: [RegisterDef; 3] = [
    reg(battery::VBATT_MV, "VBATT_MV", 0x0000_FFFF, Access::ReadOnly, ResetPolicy::StaticError, 100, 0xFFFF),
    reg(battery::CHARGE_CONTROL, "CHARGE_CONTROL", 0x0000_0003, Access::ReadWrite, ResetPolicy::StaticError, 1000, 0x3),
    reg(battery::OUTPUT_CURRENT_UA, "OUTPUT_CURRENT_UA", 0x00FF_FFFF, Access::ReadOnly, ResetPolicy::StaticError, 100, 0x00FF_FFFF),
];

/// GPS module registers
pub mod gps {
    pub const LATITUDE: u8 = 0x04;
    pub const LONGITUDE: u8 = 0x05;
    pub const ALTITUDE_M: u8 = 0x06;
    pub const FIX_STATUS: u8 = 0x07;

    pub const FIX_FLAG_MASK: u32 = 0x0000_0001;
    pub const SATELLITE_COUNT_MASK: u32 = 0x0000_003E;
}

const GPS_REGISTERS: [RegisterDef; 4] = [
    reg(gps::LATITUDE, "LATITUDE", 0xFFFF_FFFF, Access::ReadOnly, ResetPolicy::StaticError, 100, 0xFFFF_FFFF),
    reg(gps::LONGITUDE, "LONGITUDE", 0xFFFF_FFFF, Access::ReadOnly, ResetPolicy::StaticError, 100, 0xFFFF_FFFF),
    reg(gps::ALTITUDE_M, "ALTITUDE_M", 0x0000_FFFF, Access::ReadOnly, ResetPolicy::StaticError, 100, 0xFFFF),
    reg(gps::FIX_STATUS, "FIX_STATUS", 0x0000_003F, Access::ReadOnly, ResetPolicy::StaticError, 100, 0x3F),
];

/// Sensor module registers
pub mod sensor {
    pub const TEMPERATURE_DDEG: u8 = 0x04;
    pub const HUMIDITY_PERCENT: u8 = 0x05;
}

const SENSOR_REGISTERS: [RegisterDef; 2] = [
    reg(sensor::TEMPERATURE_DDEG, "TEMPERATURE_DDEG", 0x0000_FFFF, Access::ReadOnly, ResetPolicy::StaticError, 100, 0xFFFF),
    reg(sensor::HUMIDITY_PERCENT, "HUMIDITY_PERCENT", 0x0000_00FF, Access::ReadOnly, ResetPolicy::StaticError, 100, 0xFF),
];

/// Metering module registers
pub mod meter {
    pub const MAINS_VOLTAGE_MV: u8 = 0x04;
    pub const MAINS_CURRENT_MA: u8 = 0x05;
    pub const ACTIVE_POWER_MW: u8 = 0x06;
    pub const ENERGY_WH: u8 = 0x07;
}

const METER_REGISTERS: [RegisterDef; 4] = [
    reg(meter::MAINS_VOLTAGE_MV, "MAINS_VOLTAGE_MV", 0x0000_FFFF, Access::ReadOnly, ResetPolicy::StaticError, 100, 0xFFFF),
    reg(meter::MAINS_CURRENT_MA, "MAINS_CURRENT_MA", 0x0000_FFFF, Access::ReadOnly, ResetPolicy::StaticError, 100, 0xFFFF),
    reg(meter::ACTIVE_POWER_MW, "ACTIVE_POWER_MW", 0x00FF_FFFF, Access::ReadOnly, ResetPolicy::StaticError, 100, 0x00FF_FFFF),
    reg(meter::ENERGY_WH, "ENERGY_WH", 0xFFFF_FFFF, Access::ReadOnly, ResetPolicy::StaticError, 100, 0xFFFF_FFFF),
];

/// Radio modem registers
pub mod modem {
    pub const RADIO_STATE: u8 = 0x04;
    pub const TX_POWER_DBM: u8 = 0x05;

    /// Highest legal TX power; secure_register clamps above this.
    pub const TX_POWER_MAX_DBM: u32 = 22;
}

const MODEM_REGISTERS: [RegisterDef; 2] = [
    reg(modem::RADIO_STATE, "RADIO_STATE", 0x0000_0003, Access::ReadOnly, ResetPolicy::StaticError, 100, 0x3),
    reg(modem::TX_POWER_DBM, "TX_POWER_DBM", 0x0000_00FF, Access::ReadWrite, ResetPolicy::StaticError, 500, 0xFF),
];

/// Relay rack registers (accessed over the raw protocol)
pub mod rack {
    pub const RELAY_STATES: u8 = 0x04;
}

const RACK_REGISTERS: [RegisterDef; 1] = [
    // 8 relays, 2 bits each
    reg(rack::RELAY_STATES, "RELAY_STATES", 0x0000_FFFF, Access::ReadWrite, ResetPolicy::StaticError, 2000, 0xFFFF),
];

/// Master virtual registers (local, partly persisted)
pub mod master {
    pub const UPLINK_PERIOD_S: u8 = 0x04;
    pub const DOWNLINK_ENABLE: u8 = 0x05;
    pub const UPTIME_S: u8 = 0x06;
}

const MASTER_REGISTERS: [RegisterDef; 3] = [
    reg(master::UPLINK_PERIOD_S, "UPLINK_PERIOD_S", 0x0000_FFFF, Access::ReadWrite, ResetPolicy::Persisted, 100, 0xFFFF),
    reg(master::DOWNLINK_ENABLE, "DOWNLINK_ENABLE", 0x0000_0001, Access::ReadWrite, ResetPolicy::Persisted, 100, 0x1),
    reg(master::UPTIME_S, "UPTIME_S", 0xFFFF_FFFF, Access::ReadOnly, ResetPolicy::Runtime, 100, 0xFFFF_FFFF),
];

/// Functional class of a peripheral board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoardType {
    Master,
    RelayModule,
    BatteryModule,
    GpsModule,
    SensorModule,
    MeterModule,
    RadioModem,
    RelayRack,
}

impl BoardType {
    /// Board id as reported by the BOARD_ID register
    pub fn board_id(&self) -> u8 {
        match self {
            BoardType::Master => 0x00,
            BoardType::RelayModule => 0x01,
            BoardType::BatteryModule => 0x02,
            BoardType::GpsModule => 0x03,
            BoardType::SensorModule => 0x04,
            BoardType::MeterModule => 0x05,
            BoardType::RadioModem => 0x06,
            BoardType::RelayRack => 0x07,
        }
    }

    /// Resolve a board id read off the bus
    pub fn from_board_id(id: u8) -> Option<Self> {
        match id {
            0x00 => Some(BoardType::Master),
            0x01 => Some(BoardType::RelayModule),
            0x02 => Some(BoardType::BatteryModule),
            0x03 => Some(BoardType::GpsModule),
            0x04 => Some(BoardType::SensorModule),
            0x05 => Some(BoardType::MeterModule),
            0x06 => Some(BoardType::RadioModem),
            0x07 => Some(BoardType::RelayRack),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BoardType::Master => "Master",
            BoardType::RelayModule => "RelayModule",
            BoardType::BatteryModule => "BatteryModule",
            BoardType::GpsModule => "GpsModule",
            BoardType::SensorModule => "SensorModule",
            BoardType::MeterModule => "MeterModule",
            BoardType::RadioModem => "RadioModem",
            BoardType::RelayRack => "RelayRack",
        }
    }

    fn specific_registers(&self) -> &'static [RegisterDef] {
        match self {
            BoardType::Master => &MASTER_REGISTERS,
            BoardType::RelayModule => &RELAY_REGISTERS,
            BoardType::BatteryModule => &BATTERY_REGISTERS,
            BoardType::GpsModule => &GPS_REGISTERS,
            BoardType::SensorModule => &SENSOR_REGISTERS,
            BoardType::MeterModule => &METER_REGISTERS,
            BoardType::RadioModem => &MODEM_REGISTERS,
            BoardType::RelayRack => &RACK_REGISTERS,
        }
    }

    /// Last register address of this board's table
    pub fn last_register(&self) -> u8 {
        self.specific_registers()
            .iter()
            .map(|r| r.addr)
            .max()
            .unwrap_or(common::ERROR_STACK)
    }

    /// Look up a register definition by address
    pub fn register(&self, addr: u8) -> Option<&'static RegisterDef> {
        COMMON_REGISTERS
            .iter()
            .chain(self.specific_registers().iter())
            .find(|r| r.addr == addr)
    }

    /// Write timeout for a register; the common default when unknown
    pub fn write_timeout_ms(&self, addr: u8) -> u64 {
        self.register(addr).map(|r| r.write_timeout_ms).unwrap_or(100)
    }

    /// Error value consumers see when access to a register fails
    pub fn error_value(&self, addr: u8) -> u32 {
        self.register(addr)
            .map(|r| r.error_value)
            .unwrap_or(0xFFFF_FFFF)
    }

    /// Validate and clamp a value before committing a write.
    ///
    /// Rejects writes to unknown or read-only registers and values with
    /// bits outside the declared field; clamps board-specific legal ranges
    /// (modem TX power).
    pub fn secure_register(&self, addr: u8, value: u32) -> Result<u32> {
        let def = self
            .register(addr)
            .ok_or_else(|| NodeBusError::RegisterOutOfRange(addr, self.name().to_string()))?;
        if def.access == Access::ReadOnly {
            return Err(NodeBusError::RegisterReadOnly(addr));
        }
        if value & !def.mask != 0 {
            return Err(NodeBusError::RegisterFieldValue {
                reg: addr,
                value,
                mask: def.mask,
            });
        }
        let mut secured = value;
        if *self == BoardType::RadioModem && addr == modem::TX_POWER_DBM {
            secured = secured.min(modem::TX_POWER_MAX_DBM);
        }
        Ok(secured)
    }
}

impl std::fmt::Display for BoardType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
