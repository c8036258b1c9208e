//! Integration tests for the full master stack.
//!
//! These tests wire the dispatcher, registry and radio process together
//! over mock transports and a mock radio link, simulating the nodes a real
//! bus would carry: discovery, reporting rotation, downlink command
//! execution and the deferred-action hold times.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use nodebus::config::{BusConfig, RackConfig, RadioConfig};
use nodebus::core::hal::{MemoryNvmStore, MockPowerControl, MockRadioLink};
use nodebus::core::node::{NodeAccess, NodeRegistry};
use nodebus::core::protocols::{AddressedProtocol, LocalProtocol, RawProtocol};
use nodebus::core::radio::{downlink_hash, RadioProcess};
use nodebus::core::registers::boards::{common, master, relay};
use nodebus::core::registers::BoardType;
use nodebus::core::transport::MockBusTransport;

fn bus_config() -> BusConfig {
    BusConfig {
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
    }
}

fn rack_config() -> RackConfig {
    RackConfig {
        device: "/dev/null".to_string(),
        baud_rate: 9600,
        bus_address: 0xFF,
        node_address: 0x70,
        reply_timeout_ms: 100,
        sequence_timeout_ms: 10_000,
    }
}

fn node_reply(node: u8, text: &str) -> Vec<u8> {
    let mut frame = vec![0x80, node];
    frame.extend_from_slice(text.as_bytes());
    frame.push(0x0D);
    frame
}

/// Simulated bus population: a relay module at 0x08 and a sensor module at
/// 0x09, each with a live relay-state/measurement register file.
struct SimulatedBus {
    relay_state: Mutex<u32>,
}

impl SimulatedBus {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            relay_state: Mutex::new(0),
        })
    }

    fn answer(&self, frame: &[u8]) -> Option<Vec<u8>> {
        let dest = frame[0] & 0x7F;
        let text = String::from_utf8_lossy(&frame[2..frame.len() - 1]).into_owned();
        let board_id = match dest {
            0x08 => 0x01u32,
            0x09 => 0x04u32,
            _ => return None,
        };
        if text == "RS" {
            return Some(node_reply(dest, "HELLO"));
        }
        match text.as_str() {
            "AT$R=00" => return Some(node_reply(dest, &format!("{board_id:X}"))),
            "AT$R=01" => return Some(node_reply(dest, "102")),
            "AT$R=02" => return Some(node_reply(dest, "0")),
            _ => {}
        }
        if dest == 0x08 {
            if text == "AT$R=04" {
                return Some(node_reply(dest, &format!("{:X}", *self.relay_state.lock())));
            }
            if text == "AT$R=05" {
                // 12.0 V on the switched output
                return Some(node_reply(dest, "2EE0"));
            }
            if text == "AT$R=06" {
                return Some(node_reply(dest, "3E8"));
            }
            if let Some(args) = text.strip_prefix("AT$W=04,") {
                *self.relay_state.lock() = u32::from_str_radix(args, 16).unwrap();
                return Some(node_reply(dest, "OK"));
            }
        }
        if dest == 0x09 && text == "AT$R=04" {
            // 21.7 degC
            return Some(node_reply(dest, "D9"));
        }
        if dest == 0x09 && text == "AT$R=05" {
            return Some(node_reply(dest, "37"));
        }
        if text.starts_with("AT$W=") {
            return Some(node_reply(dest, "OK"));
        }
        None
    }
}

fn make_access(sim: Arc<SimulatedBus>, power: Arc<MockPowerControl>) -> NodeAccess<MemoryNvmStore> {
    let (bus_transport, bus_handle) = MockBusTransport::new("bus");
    bus_handle.set_responder(move |frame| sim.answer(frame));
    let (rack_transport, rack_handle) = MockBusTransport::new("rack");
    rack_handle.set_responder(|cmd| {
        if cmd[1] == 0x01 {
            Some(vec![0xFF, 0x00, 0x00])
        } else {
            Some(vec![0xFF, 0x00, 0x01])
        }
    });
    let bus = bus_config();
    let rack = rack_config();
    NodeAccess::new(
        AddressedProtocol::new(Box::new(bus_transport), bus.clone()),
        RawProtocol::new(Box::new(rack_transport), rack.clone()),
        LocalProtocol::new(MemoryNvmStore::new(), 0x100),
        power,
        rack.node_address,
        bus.scan_start,
        bus.scan_end,
    )
}

async fn scanned_process(
    sim: Arc<SimulatedBus>,
) -> (RadioProcess<MemoryNvmStore, MockRadioLink>, MockRadioLink, Arc<MockPowerControl>) {
    let power = Arc::new(MockPowerControl::new());
    let mut access = make_access(sim, power.clone());
    let mut registry = NodeRegistry::new(0x00);
    access.scan(&mut registry).await.unwrap();

    // Clear the master's own boot flag so ticks start with regular reports.
    access
        .write(
            BoardType::Master,
            0x00,
            common::STATUS,
            common::STATUS_BOOT_FLAG_MASK,
            0,
        )
        .await
        .unwrap();

    let link = MockRadioLink::new();
    let process = RadioProcess::new(
        access,
        registry,
        link.clone(),
        RadioConfig {
            tick_period_s: 600,
            error_stack_flood_limit: 3,
        },
    );
    (process, link, power)
}

#[tokio::test(start_paused = true)]
async fn scan_discovers_bus_and_rack_nodes() {
    let power = Arc::new(MockPowerControl::new());
    let mut access = make_access(SimulatedBus::new(), power.clone());
    let mut registry = NodeRegistry::new(0x00);

    let found = access.scan(&mut registry).await.unwrap();

    assert_eq!(found, 3);
    assert_eq!(registry.get(0x08).unwrap().board, BoardType::RelayModule);
    assert_eq!(registry.get(0x09).unwrap().board, BoardType::SensorModule);
    assert_eq!(registry.get(0x70).unwrap().board, BoardType::RelayRack);
    // The rail never stays up after a scan.
    assert!(power.is_balanced());
}

#[tokio::test(start_paused = true)]
async fn rescan_preserves_payload_rotation() {
    let sim = SimulatedBus::new();
    let power = Arc::new(MockPowerControl::new());
    let mut access = make_access(sim, power);
    let mut registry = NodeRegistry::new(0x00);
    access.scan(&mut registry).await.unwrap();

    registry.get_mut(0x08).unwrap().payload_type_counter = 1;
    access.scan(&mut registry).await.unwrap();

    assert_eq!(registry.get(0x08).unwrap().payload_type_counter, 1);
}

#[tokio::test(start_paused = true)]
async fn reporting_rotates_across_nodes_and_types() {
    let (mut process, link, power) = scanned_process(SimulatedBus::new()).await;
    let nodes = process.registry().len();
    assert_eq!(nodes, 4);

    // Two full rounds over master, relay, sensor, rack.
    for _ in 0..(nodes * 2) {
        process.tick().await.unwrap();
    }

    let uplinks = link.uplinks();
    assert_eq!(uplinks.len(), nodes * 2);
    // First round is all status-class payloads.
    assert_eq!(uplinks[0][0], 0x00); // master status
    assert_eq!(uplinks[1][0], 0x01); // relay status
    assert_eq!(uplinks[2][0], 0x04); // sensor status
    assert_eq!(uplinks[3][0], 0x77); // rack relay states
    // Second round advances each two-entry rotation.
    assert_eq!(uplinks[5][0], 0x51); // relay electrical
    assert_eq!(uplinks[6][0], 0x24); // sensor ambient
    assert_eq!(uplinks[6][2..5], [0x00, 0xD9, 0x37]);
    assert!(power.is_balanced());
}

#[tokio::test(start_paused = true)]
async fn downlink_masked_write_executes_and_reports() {
    let sim = SimulatedBus::new();
    let (mut process, link, _) = scanned_process(sim.clone()).await;

    // Enable downlinks through the master's virtual register.
    process
        .access_mut()
        .write(BoardType::Master, 0x00, master::DOWNLINK_ENABLE, 0x1, 1)
        .await
        .unwrap();

    // Set bits 7:4 of the relay state at 0x08 to 0x5.
    let frame = [0x03, 0x08, relay::RELAY_STATE, 0x00, 0xF0, 0x00, 0x05, 0x00];
    link.queue_downlink(frame);

    process.tick().await.unwrap();

    // The write lands on the action list with a due-now deadline and runs
    // at the head of the next tick.
    assert_eq!(*sim.relay_state.lock(), 0x00);
    assert_eq!(process.pending_actions(), 1);

    process.tick().await.unwrap();

    assert_eq!(*sim.relay_state.lock(), 0x50);
    let uplinks = link.uplinks();
    // Two status reports with the action-log receipt between them.
    assert_eq!(uplinks.len(), 3);
    let receipt = &uplinks[1];
    let hash = downlink_hash(&frame);
    assert_eq!(receipt[0] & 0xF0, 0xF0);
    assert_eq!(((receipt[0] as u16 & 0x0F) << 8) | receipt[1] as u16, hash);
    assert_eq!(receipt[2], relay::RELAY_STATE);
    assert_eq!(&receipt[3..7], &[0x00, 0x00, 0x00, 0x50]);
    assert_eq!(receipt[7], 0x80);
}

#[tokio::test(start_paused = true)]
async fn temporary_write_restores_after_hold_time() {
    let sim = SimulatedBus::new();
    *sim.relay_state.lock() = 0x03;
    let (mut process, link, _) = scanned_process(sim.clone()).await;

    process
        .access_mut()
        .write(BoardType::Master, 0x00, master::DOWNLINK_ENABLE, 0x1, 1)
        .await
        .unwrap();

    // Full write of 0xFF, held for 30 seconds.
    let frame = [0x04, 0x08, relay::RELAY_STATE, 0x00, 0x00, 0x00, 0xFF, 0x1E];
    link.queue_downlink(frame);
    process.tick().await.unwrap();

    // Both the immediate write and its restore are on the action list.
    assert_eq!(*sim.relay_state.lock(), 0x03);
    assert_eq!(process.pending_actions(), 2);

    process.tick().await.unwrap();
    assert_eq!(*sim.relay_state.lock(), 0xFF);
    assert_eq!(process.pending_actions(), 1);

    // Next tick arrives after the hold expires; the previous value returns.
    tokio::time::advance(Duration::from_secs(31)).await;
    process.tick().await.unwrap();

    assert_eq!(*sim.relay_state.lock(), 0x03);
    assert_eq!(process.pending_actions(), 0);
    // The restore receipt carries the restored value.
    let uplinks = link.uplinks();
    let restore = &uplinks[3];
    assert_eq!(restore[2], relay::RELAY_STATE);
    assert_eq!(&restore[3..7], &[0x00, 0x00, 0x00, 0x03]);
}

#[tokio::test(start_paused = true)]
async fn failed_accesses_surface_as_error_payloads() {
    let (mut process, link, _) = scanned_process(SimulatedBus::new()).await;

    // The sensor that answered the scan disappears from the bus: point its
    // registry entry at a vacant address so every access times out.
    process.registry_mut().get_mut(0x09).unwrap().address = 0x0A;

    let nodes = process.registry().len();
    for _ in 0..nodes {
        process.tick().await.unwrap();
    }
    // The silent node's status reads failed; the master's next report turn
    // drains them instead of its regular status.
    process.tick().await.unwrap();

    let uplinks = link.uplinks();
    let error_payload = uplinks
        .iter()
        .find(|p| p[0] & 0xF0 == 0xE0)
        .expect("error payload expected");
    assert_eq!(&error_payload[..2], &[0xE0, 0x00]);
    assert_eq!(error_payload[2], 0x0A);
    assert_eq!(error_payload[3], common::STATUS);
    // Read-direction reply timeout.
    assert_eq!(error_payload[4], 0x02);
}
