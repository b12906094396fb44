//! Board-specific constants and bring-up checks for the Lepton breakout
//! (250-0577-00) wired to a Raspberry Pi.
//!
//! This board exposes:
//! - CCI command interface on I2C
//! - VoSPI video stream on SPI

use lepton_transport::bus::i2c::CommandConnector;
use lepton_transport::bus::spi::SerialConnector;
use lepton_transport::cci::{self, CciStatus};
use lepton_transport::{BusConfig, Buses, ConfigError};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Default configuration directory (embedded at compile time)
pub const CONFIG_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/config");

/// Embedded TOML configuration
pub const BUSES_TOML: &str = include_str!("../config/buses.toml");

/// Board name
pub const BOARD_NAME: &str = "Lepton-Breakout-RPi";

pub const CCI_BUS_ID: &str = "cci";
pub const VOSPI_BUS_ID: &str = "vospi";

/// Byte clocked out on the VoSPI bus during the probe
pub const PROBE_PATTERN: u8 = 0xA5;

/// Get the configuration path (allow override via CONFIG_PATH env var)
pub fn get_config_path() -> String {
    std::env::var("CONFIG_PATH").unwrap_or_else(|_| CONFIG_DIR.to_string())
}

/// Loads `buses.toml` from `config_path`, falling back to the embedded copy
/// when the directory has none.
pub fn load_config(config_path: &str) -> Result<BusConfig, ConfigError> {
    let bus_config_path = format!("{}/buses.toml", config_path);
    if Path::new(&bus_config_path).exists() {
        lepton_transport::load_bus_config(&bus_config_path)
    } else {
        warn!(
            "[{}] {} not found, using embedded configuration",
            BOARD_NAME, bus_config_path
        );
        BusConfig::from_toml_str(BUSES_TOML)
    }
}

/// Outcome of a bring-up probe
#[derive(Debug, Default, Serialize)]
pub struct ProbeReport {
    pub board: String,
    pub cci_status: Option<u16>,
    pub cci_ready: Option<bool>,
    pub cci_error: Option<String>,
    pub vospi_sent: Option<u8>,
    pub vospi_received: Option<u8>,
    pub vospi_error: Option<String>,
}

impl ProbeReport {
    /// Both buses answered
    pub fn passed(&self) -> bool {
        self.cci_error.is_none()
            && self.vospi_error.is_none()
            && self.cci_status.is_some()
            && self.vospi_received.is_some()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Reads the CCI status register and clocks one byte over VoSPI.
pub async fn probe<CC, SC>(buses: &Buses<CC, SC>) -> ProbeReport
where
    CC: CommandConnector + Send + 'static,
    CC::Device: Send + 'static,
    SC: SerialConnector + Send + 'static,
    SC::Device: Send + 'static,
{
    let mut report = ProbeReport {
        board: BOARD_NAME.to_string(),
        ..ProbeReport::default()
    };

    match buses.command(CCI_BUS_ID) {
        Some(bus) => match bus.run(|bus| bus.read_register(cci::STATUS)).await {
            Ok(raw) => {
                let status = CciStatus::decode(raw);
                info!("[probe] CCI status {:#06x} ({:?})", raw, status);
                report.cci_status = Some(raw);
                report.cci_ready = Some(status.is_ready());
            }
            Err(e) => report.cci_error = Some(e.to_string()),
        },
        None => report.cci_error = Some(format!("no bus named '{}'", CCI_BUS_ID)),
    }

    match buses.serial(VOSPI_BUS_ID) {
        Some(bus) => {
            let result = bus
                .run(|bus| {
                    let mut rx = [0u8; 1];
                    bus.transfer(&[PROBE_PATTERN], &mut rx)?;
                    Ok(rx[0])
                })
                .await;
            report.vospi_sent = Some(PROBE_PATTERN);
            match result {
                Ok(byte) => {
                    info!("[probe] VoSPI received {:#04x}", byte);
                    report.vospi_received = Some(byte);
                }
                Err(e) => report.vospi_error = Some(e.to_string()),
            }
        }
        None => report.vospi_error = Some(format!("no bus named '{}'", VOSPI_BUS_ID)),
    }

    report
}
