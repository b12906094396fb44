pub mod i2c;
pub mod mock;
pub mod shared;
pub mod spi;

use serde::Deserialize;

/// Bus type enum for the two Lepton interfaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusType {
    /// Two-wire CCI command bus
    I2C,
    /// Four-wire VoSPI stream bus
    Spi,
}
