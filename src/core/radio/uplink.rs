//! Builds one uplink payload from live register reads.
//!
//! A failed register read does not abort the payload: the error value lands
//! in the field and the failure itself reaches the backend through the
//! error-stack payload on a later tick.

use tracing::debug;

use crate::core::hal::NvmStore;
use crate::core::node::{Node, NodeAccess};
use crate::core::registers::boards::{battery, common, gps, meter, modem, rack, relay, sensor};
use crate::core::registers::BoardType;
use crate::error::{NodeBusError, Result};

use super::payload::{PayloadBuilder, PayloadType};

/// Read a register's full declared field.
async fn read_full<N: NvmStore>(
    access: &mut NodeAccess<N>,
    board: BoardType,
    address: u8,
    reg: u8,
) -> Result<u32> {
    let mask = board.register(reg).map(|d| d.mask).unwrap_or(0xFFFF_FFFF);
    Ok(access.read(board, address, reg, mask).await?.value)
}

/// Build the payload of the given type for one node.
pub async fn build_node_uplink<N: NvmStore>(
    access: &mut NodeAccess<N>,
    node: &Node,
    payload_type: PayloadType,
) -> Result<Vec<u8>> {
    let board = node.board;
    let address = node.address;
    let mut payload = PayloadBuilder::node(payload_type, board, address)?;

    match payload_type {
        PayloadType::Status => {
            let status = read_full(access, board, address, common::STATUS).await?;
            payload.push_u16(status as u16)?;
        }
        PayloadType::Startup => {
            let reason = access
                .read(board, address, common::STATUS, common::STATUS_RESET_REASON_MASK)
                .await?
                .value;
            let fw = read_full(access, board, address, common::FW_VERSION).await?;
            payload.push_u8(reason as u8)?;
            payload.push_u16(fw as u16)?;
        }
        PayloadType::Ambient => {
            let temperature =
                read_full(access, board, address, sensor::TEMPERATURE_DDEG).await?;
            let humidity = read_full(access, board, address, sensor::HUMIDITY_PERCENT).await?;
            payload.push_u16(temperature as u16)?;
            payload.push_u8(humidity as u8)?;
        }
        PayloadType::Geoloc => {
            let latitude = read_full(access, board, address, gps::LATITUDE).await?;
            let longitude = read_full(access, board, address, gps::LONGITUDE).await?;
            let fix = read_full(access, board, address, gps::FIX_STATUS).await?;
            payload.push_u32(latitude)?;
            payload.push_u32(longitude)?;
            payload.push_u8(fix as u8)?;
        }
        PayloadType::Mains => {
            let voltage = read_full(access, board, address, meter::MAINS_VOLTAGE_MV).await?;
            let current = read_full(access, board, address, meter::MAINS_CURRENT_MA).await?;
            let power = read_full(access, board, address, meter::ACTIVE_POWER_MW).await?;
            payload.push_u16(voltage as u16)?;
            payload.push_u16(current as u16)?;
            payload.push_u32(power)?;
        }
        PayloadType::Electrical => {
            let (control_reg, voltage_reg, current_reg) = match board {
                BoardType::BatteryModule => (
                    battery::CHARGE_CONTROL,
                    battery::VBATT_MV,
                    battery::OUTPUT_CURRENT_UA,
                ),
                _ => (relay::RELAY_STATE, relay::VOLTAGE_MV, relay::CURRENT_UA),
            };
            let control = read_full(access, board, address, control_reg).await?;
            let voltage = read_full(access, board, address, voltage_reg).await?;
            let current = read_full(access, board, address, current_reg).await?;
            payload.push_u8(control as u8)?;
            payload.push_u16(voltage as u16)?;
            payload.push_u32(current)?;
        }
        PayloadType::RadioSettings => {
            let state = read_full(access, board, address, modem::RADIO_STATE).await?;
            let tx_power = read_full(access, board, address, modem::TX_POWER_DBM).await?;
            payload.push_u8(state as u8)?;
            payload.push_u8(tx_power as u8)?;
        }
        PayloadType::RelayStates => {
            let states = read_full(access, board, address, rack::RELAY_STATES).await?;
            payload.push_u16(states as u16)?;
        }
        PayloadType::ErrorStack => {
            // Reading the register pops the oldest code pair off the node's
            // own stack.
            let codes = read_full(access, board, address, common::ERROR_STACK).await?;
            payload.push_u16(codes as u16)?;
        }
        PayloadType::ActionLog => {
            return Err(NodeBusError::radio(
                "action logs are not built per node".to_string(),
            ));
        }
    }

    let payload = payload.finish();
    debug!(
        "uplink payload for 0x{:02X}: type {:?}, {} bytes",
        address,
        payload_type,
        payload.len()
    );
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::config::{BusConfig, RackConfig};
    use crate::core::hal::{MemoryNvmStore, MockPowerControl};
    use crate::core::protocols::{AddressedProtocol, LocalProtocol, RawProtocol};
    use crate::core::transport::MockBusTransport;

    fn node_reply(node: u8, text: &str) -> Vec<u8> {
        let mut frame = vec![0x80, node];
        frame.extend_from_slice(text.as_bytes());
        frame.push(0x0D);
        frame
    }

    fn make_access(
        responder: impl Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    ) -> NodeAccess<MemoryNvmStore> {
        let (bus_transport, bus_handle) = MockBusTransport::new("bus");
        bus_handle.set_responder(responder);
        let (rack_transport, _rack_handle) = MockBusTransport::new("rack");
        let bus = BusConfig {
            device: "/dev/null".to_string(),
            baud_rate: 19200,
            data_bits: 8,
            stop_bits: 1,
            parity: "none".to_string(),
            master_address: 0x00,
            scan_start: 0x08,
            scan_end: 0x0A,
            reply_timeout_ms: 100,
            sequence_timeout_ms: 10_000,
            poll_granule_ms: 10,
        };
        let rack = RackConfig {
            device: "/dev/null".to_string(),
            baud_rate: 9600,
            bus_address: 0xFF,
            node_address: 0x70,
            reply_timeout_ms: 100,
            sequence_timeout_ms: 10_000,
        };
        NodeAccess::new(
            AddressedProtocol::new(Box::new(bus_transport), bus.clone()),
            RawProtocol::new(Box::new(rack_transport), rack.clone()),
            LocalProtocol::new(MemoryNvmStore::new(), 0x100),
            Arc::new(MockPowerControl::new()),
            rack.node_address,
            bus.scan_start,
            bus.scan_end,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_ambient_payload_layout() {
        let mut access = make_access(|frame| {
            let text = String::from_utf8_lossy(&frame[2..frame.len() - 1]).into_owned();
            match text.as_str() {
                // 22.5 degC, 60 %
                "AT$R=04" => Some(node_reply(0x09, "E1")),
                "AT$R=05" => Some(node_reply(0x09, "3C")),
                _ => None,
            }
        });
        let node = Node::new(0x09, BoardType::SensorModule);

        let payload = build_node_uplink(&mut access, &node, PayloadType::Ambient)
            .await
            .unwrap();
        assert_eq!(payload, vec![0x24, 0x09, 0x00, 0xE1, 0x3C]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_payload_from_silent_node_carries_error_value() {
        let mut access = make_access(|_| None);
        let node = Node::new(0x08, BoardType::RelayModule);

        let payload = build_node_uplink(&mut access, &node, PayloadType::Status)
            .await
            .unwrap();
        // STATUS error value 0xFF03.
        assert_eq!(payload, vec![0x01, 0x08, 0xFF, 0x03]);
        assert_eq!(access.errors().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_geoloc_payload_fits_cap() {
        let mut access = make_access(|frame| {
            let node = frame[0] & 0x7F;
            Some(node_reply(node, "12345678"))
        });
        let node = Node::new(0x0B, BoardType::GpsModule);

        let payload = build_node_uplink(&mut access, &node, PayloadType::Geoloc)
            .await
            .unwrap();
        assert_eq!(payload.len(), 11);
        assert_eq!(payload[0], 0x33);
        assert_eq!(&payload[2..6], &[0x12, 0x34, 0x56, 0x78]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_stack_payload_drains_node_register() {
        let mut access = make_access(|frame| {
            let text = String::from_utf8_lossy(&frame[2..frame.len() - 1]).into_owned();
            match text.as_str() {
                "AT$R=03" => Some(node_reply(0x08, "1234")),
                _ => None,
            }
        });
        let node = Node::new(0x08, BoardType::RelayModule);

        let payload = build_node_uplink(&mut access, &node, PayloadType::ErrorStack)
            .await
            .unwrap();
        assert_eq!(payload, vec![0xE1, 0x08, 0x12, 0x34]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_payload_layout() {
        let mut access = make_access(|frame| {
            let text = String::from_utf8_lossy(&frame[2..frame.len() - 1]).into_owned();
            match text.as_str() {
                // Reset reason 0x04, boot flag set.
                "AT$R=02" => Some(node_reply(0x09, "405")),
                "AT$R=01" => Some(node_reply(0x09, "102")),
                _ => None,
            }
        });
        let node = Node::new(0x09, BoardType::SensorModule);

        let payload = build_node_uplink(&mut access, &node, PayloadType::Startup)
            .await
            .unwrap();
        assert_eq!(payload, vec![0x14, 0x09, 0x04, 0x01, 0x02]);
    }
}
