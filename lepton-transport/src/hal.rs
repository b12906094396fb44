//! Hardware Abstraction Layer (HAL) for the bus device nodes
//!
//! The bus components are generic over a connector that knows how to open
//! the kernel device. On Linux with the `linux-hal` feature this is the
//! i2c-dev / spidev pair; everywhere else the connectors refuse to open.

#[cfg(all(feature = "linux-hal", target_os = "linux"))]
pub mod linux;

pub mod unsupported;

#[cfg(all(feature = "linux-hal", target_os = "linux"))]
pub type DefaultCommandConnector = linux::LinuxI2cConnector;
#[cfg(all(feature = "linux-hal", target_os = "linux"))]
pub type DefaultSerialConnector = linux::LinuxSpiConnector;

#[cfg(not(all(feature = "linux-hal", target_os = "linux")))]
pub type DefaultCommandConnector = unsupported::UnsupportedConnector;
#[cfg(not(all(feature = "linux-hal", target_os = "linux")))]
pub type DefaultSerialConnector = unsupported::UnsupportedConnector;
