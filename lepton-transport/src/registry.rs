use crate::bus::i2c::{CommandBus, CommandConnector};
use crate::bus::shared::SharedBus;
use crate::bus::spi::{SerialBus, SerialConnector};
use crate::bus::BusType;
use crate::config::BusConfig;
use crate::errors::{RegistryError, RegistryResult};
use crate::hal::{DefaultCommandConnector, DefaultSerialConnector};
use std::collections::HashMap;
use tracing::{info, warn};

/// Every configured bus, opened and ready, keyed by bus id
pub struct Buses<CC: CommandConnector = DefaultCommandConnector, SC: SerialConnector = DefaultSerialConnector> {
    pub command: HashMap<String, SharedBus<CommandBus<CC>>>,
    pub serial: HashMap<String, SharedBus<SerialBus<SC>>>,
}

impl<CC: CommandConnector, SC: SerialConnector> Buses<CC, SC> {
    pub fn command(&self, id: &str) -> Option<&SharedBus<CommandBus<CC>>> {
        self.command.get(id)
    }

    pub fn serial(&self, id: &str) -> Option<&SharedBus<SerialBus<SC>>> {
        self.serial.get(id)
    }

    pub fn len(&self) -> usize {
        self.command.len() + self.serial.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Opens every bus in `config` with the platform connectors
pub fn init_all(config: &BusConfig) -> RegistryResult<Buses> {
    init_all_with(
        config,
        DefaultCommandConnector::default(),
        DefaultSerialConnector::default(),
    )
}

/// Opens every bus in `config`. Stops at the first bus that fails to come
/// up; buses opened before it are closed again as they are dropped.
pub fn init_all_with<CC, SC>(
    config: &BusConfig,
    command_connector: CC,
    serial_connector: SC,
) -> RegistryResult<Buses<CC, SC>>
where
    CC: CommandConnector + Clone,
    CC::Device: Send + 'static,
    CC: Send + 'static,
    SC: SerialConnector + Clone,
    SC::Device: Send + 'static,
    SC: Send + 'static,
{
    config.validate()?;

    let mut buses = Buses {
        command: HashMap::new(),
        serial: HashMap::new(),
    };

    info!("[registry] initializing {} bus(es)...", config.buses.len());
    for entry in config.buses.iter() {
        match entry.r#type {
            BusType::I2C => {
                let mut bus = CommandBus::with_connector(entry.bus, command_connector.clone());
                bus.initialise().map_err(|e| {
                    warn!("[registry] bus '{}' failed: {}", entry.id, e);
                    RegistryError::BusInitError {
                        bus: entry.id.clone(),
                        source: e,
                    }
                })?;
                info!(
                    "[registry] registered command bus: id={} device={}",
                    entry.id,
                    bus.device_name()
                );
                buses.command.insert(
                    entry.id.clone(),
                    SharedBus::new(entry.id.clone(), bus).with_timeout(entry.timeout()),
                );
            }
            BusType::Spi => {
                let spi_config = entry.spi_config()?;
                let mut bus = SerialBus::with_connector(
                    entry.bus,
                    entry.chip_select(),
                    spi_config,
                    serial_connector.clone(),
                );
                bus.enable().map_err(|e| {
                    warn!("[registry] bus '{}' failed: {}", entry.id, e);
                    RegistryError::BusInitError {
                        bus: entry.id.clone(),
                        source: e,
                    }
                })?;
                info!(
                    "[registry] registered serial bus: id={} device={}",
                    entry.id,
                    bus.device_name()
                );
                buses.serial.insert(
                    entry.id.clone(),
                    SharedBus::new(entry.id.clone(), bus).with_timeout(entry.timeout()),
                );
            }
        }
    }

    Ok(buses)
}
