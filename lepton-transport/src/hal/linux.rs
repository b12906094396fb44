//! Linux i2c-dev and spidev connectors.

use crate::bus::i2c::{self, CommandConnector, CommandDevice};
use crate::bus::spi::{self, Segment, SerialConnector, SerialDevice, SpiConfig, SpiMode};
use crate::errors::{BusError, BusResult};
use i2cdev::core::{I2CMessage, I2CTransfer};
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CMessage};
use linux_embedded_hal::spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};
use tracing::debug;

/// Opens `/dev/i2c-N` and binds the peripheral address
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxI2cConnector;

impl CommandConnector for LinuxI2cConnector {
    type Device = LinuxI2cDevice;

    fn open(&mut self, bus_index: u8, address: u16) -> BusResult<LinuxI2cDevice> {
        let path = i2c::device_path(bus_index);
        // Opens the node and issues I2C_SLAVE; the file is closed again if binding fails.
        let device = LinuxI2CDevice::new(&path, address).map_err(|e| {
            BusError::DeviceUnavailable {
                device: path.clone(),
                reason: format!("cannot bind address {:#04x}: {}", address, e),
            }
        })?;

        debug!("[hal] {} bound to {:#04x}", path, address);
        Ok(LinuxI2cDevice { device, path })
    }
}

/// i2c-dev handle. Each call is one I2C_RDWR message, so the kernel either
/// moves the whole buffer or reports the message as not completed.
pub struct LinuxI2cDevice {
    device: LinuxI2CDevice,
    path: String,
}

impl LinuxI2cDevice {
    fn failed(&self, e: impl std::fmt::Display) -> BusError {
        BusError::TransactionFailed {
            device: self.path.clone(),
            reason: e.to_string(),
        }
    }
}

impl CommandDevice for LinuxI2cDevice {
    fn write(&mut self, bytes: &[u8]) -> BusResult<usize> {
        let mut messages = [LinuxI2CMessage::write(bytes)];
        let completed = self
            .device
            .transfer(&mut messages)
            .map_err(|e| self.failed(e))?;

        Ok(if completed == 1 { bytes.len() } else { 0 })
    }

    fn read(&mut self, buf: &mut [u8]) -> BusResult<usize> {
        let len = buf.len();
        let mut messages = [LinuxI2CMessage::read(buf)];
        let completed = self
            .device
            .transfer(&mut messages)
            .map_err(|e| self.failed(e))?;

        Ok(if completed == 1 { len } else { 0 })
    }
}

/// Opens `/dev/spidevB.C` and applies mode, word size and clock rate
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxSpiConnector;

fn mode_flags(mode: SpiMode) -> SpiModeFlags {
    match mode {
        SpiMode::Mode0 => SpiModeFlags::SPI_MODE_0,
        SpiMode::Mode1 => SpiModeFlags::SPI_MODE_1,
        SpiMode::Mode2 => SpiModeFlags::SPI_MODE_2,
        SpiMode::Mode3 => SpiModeFlags::SPI_MODE_3,
    }
}

impl SerialConnector for LinuxSpiConnector {
    type Device = LinuxSpiDevice;

    fn open(&mut self, bus_index: u8, chip_select: u8, config: &SpiConfig) -> BusResult<LinuxSpiDevice> {
        let path = spi::device_path(bus_index, chip_select);
        let mut spi = Spidev::open(&path).map_err(|e| BusError::DeviceUnavailable {
            device: path.clone(),
            reason: e.to_string(),
        })?;

        let options = SpidevOptions::new()
            .mode(mode_flags(config.mode))
            .bits_per_word(config.bits_per_word)
            .max_speed_hz(config.speed_hz)
            .build();
        // On failure `spi` is dropped here, closing the descriptor.
        spi.configure(&options)
            .map_err(|e| BusError::DeviceUnavailable {
                device: path.clone(),
                reason: format!("configuration rejected: {}", e),
            })?;

        debug!("[hal] {} configured", path);
        Ok(LinuxSpiDevice { spi, path })
    }
}

/// spidev handle. Every segment becomes one `spi_ioc_transfer` of a single
/// SPI_IOC_MESSAGE, built fresh for each call.
pub struct LinuxSpiDevice {
    spi: Spidev,
    path: String,
}

impl SerialDevice for LinuxSpiDevice {
    fn transfer(&mut self, segments: &mut [Segment<'_>]) -> BusResult<()> {
        let mut transfers: Vec<SpidevTransfer<'_, '_>> = segments
            .iter_mut()
            .map(|segment| match segment {
                Segment::Write(tx) => SpidevTransfer::write(&tx[..]),
                Segment::Read(rx) => SpidevTransfer::read(&mut rx[..]),
                Segment::Duplex { tx, rx } => SpidevTransfer::read_write(&tx[..], &mut rx[..]),
            })
            .collect();

        self.spi
            .transfer_multiple(&mut transfers)
            .map_err(|e| BusError::TransactionFailed {
                device: self.path.clone(),
                reason: e.to_string(),
            })
    }
}
