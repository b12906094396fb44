use crate::bus::i2c::{self, CommandConnector, CommandDevice};
use crate::bus::spi::{self, Segment, SerialConnector, SerialDevice, SpiConfig};
use crate::errors::{BusError, BusResult};

/// Connector for platforms without i2c-dev / spidev. Every open fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedConnector;

/// Device type that can never be constructed
#[derive(Debug)]
pub enum NoDevice {}

impl CommandDevice for NoDevice {
    fn write(&mut self, _bytes: &[u8]) -> BusResult<usize> {
        match *self {}
    }

    fn read(&mut self, _buf: &mut [u8]) -> BusResult<usize> {
        match *self {}
    }
}

impl SerialDevice for NoDevice {
    fn transfer(&mut self, _segments: &mut [Segment<'_>]) -> BusResult<()> {
        match *self {}
    }
}

impl CommandConnector for UnsupportedConnector {
    type Device = NoDevice;

    fn open(&mut self, bus_index: u8, _address: u16) -> BusResult<NoDevice> {
        Err(BusError::DeviceUnavailable {
            device: i2c::device_path(bus_index),
            reason: "I2C is only supported on Linux with the linux-hal feature".to_string(),
        })
    }
}

impl SerialConnector for UnsupportedConnector {
    type Device = NoDevice;

    fn open(&mut self, bus_index: u8, chip_select: u8, _config: &SpiConfig) -> BusResult<NoDevice> {
        Err(BusError::DeviceUnavailable {
            device: spi::device_path(bus_index, chip_select),
            reason: "SPI is only supported on Linux with the linux-hal feature".to_string(),
        })
    }
}
