//! Node Bus Master service binary.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use nodebus::config::AppConfig;
use nodebus::core::hal::{FileNvmStore, GpioPowerControl, ModemRadioLink};
use nodebus::core::protocols::{AddressedProtocol, LocalProtocol, RawProtocol};
use nodebus::core::transport::{SerialBusTransport, SerialConfig};
use nodebus::core::node::{NodeAccess, NodeRegistry};
use nodebus::core::radio::RadioProcess;
use nodebus::utils::logger::init_logger;
use nodebus::utils::Result;

#[derive(Parser, Debug)]
#[command(name = "nodebus", about = "Node bus master controller", version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "NODEBUS_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    validate: bool,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,

    /// GPIO line controlling the bus power rail
    #[arg(long, env = "NODEBUS_POWER_GPIO", default_value = "/sys/class/gpio/gpio17/value")]
    power_gpio: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref())?;
    if args.validate {
        println!("configuration OK");
        return Ok(());
    }

    let level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.service.log_level);
    init_logger(&config.service.log_dir, "nodebus", level, config.service.console)?;
    info!("nodebus {} starting", env!("CARGO_PKG_VERSION"));

    let local = {
        let mut local = LocalProtocol::new(
            FileNvmStore::new(&config.nvm.store_path),
            config.nvm.base_address,
        );
        local.restore().await?;
        local
    };

    let mut access = NodeAccess::new(
        AddressedProtocol::new(
            Box::new(SerialBusTransport::new(SerialConfig::from(&config.bus))),
            config.bus.clone(),
        ),
        RawProtocol::new(
            Box::new(SerialBusTransport::new(SerialConfig::from(&config.rack))),
            config.rack.clone(),
        ),
        local,
        Arc::new(GpioPowerControl::new(&args.power_gpio)),
        config.rack.node_address,
        config.bus.scan_start,
        config.bus.scan_end,
    );

    let mut registry = NodeRegistry::new(config.bus.master_address);
    match access.scan(&mut registry).await {
        Ok(found) => info!("bus scan found {} node(s)", found),
        Err(e) => warn!("initial bus scan failed: {}", e),
    }

    let link = ModemRadioLink::new(
        Box::new(SerialBusTransport::new(SerialConfig::from(&config.modem))),
        config.modem.clone(),
    );
    let mut process = RadioProcess::new(access, registry, link, config.radio.clone());
    let period = process.tick_period();
    info!("radio process started, tick period {:?}", period);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            _ = tokio::time::sleep(period) => {
                if let Err(e) = process.tick().await {
                    error!("radio tick failed: {}", e);
                }
            }
        }
    }

    info!("nodebus stopped");
    Ok(())
}
