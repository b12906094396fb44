//! Bus transports for the FLIR Lepton thermal sensor.
//!
//! [`CommandBus`] speaks the CCI register protocol over I2C and
//! [`SerialBus`] moves VoSPI traffic over SPI. Both own their kernel device
//! handle, report every failure as a [`BusError`], and are generic over a
//! connector so the mock transports in [`bus::mock`] can stand in for
//! hardware.

// Public modules
pub mod bus;
pub mod cci;
pub mod config;
pub mod errors;
pub mod hal;
pub mod registry;

// Re-export commonly used types
pub use bus::i2c::{CommandBus, RegisterInterface, CCI_ADDRESS};
pub use bus::shared::SharedBus;
pub use bus::spi::{SerialBus, SpiConfig, SpiMode};
pub use config::{load_bus_config, BusConfig};
pub use errors::{BusError, BusResult, ConfigError, FailureKind, RegistryError};
pub use registry::{init_all, Buses};

use tracing_subscriber::EnvFilter;

/// Initialize tracing with default configuration
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}
