//! CCI command bus: 16-bit registers on a fixed-address I2C peripheral.
//!
//! Register addresses and values travel most-significant byte first. A
//! register write is a single 4-byte transaction; a register read writes the
//! 2-byte address and then reads the value back in a second transaction.

use crate::errors::{BusError, BusResult};
use crate::hal::DefaultCommandConnector;
use tracing::{debug, trace};

/// FLIR Lepton default CCI I2C address
pub const CCI_ADDRESS: u16 = 0x2A;

/// Path of the kernel I2C device node for a bus index
pub fn device_path(bus_index: u8) -> String {
    format!("/dev/i2c-{}", bus_index)
}

/// An open I2C device already bound to its peripheral address.
///
/// Both calls return the number of bytes actually moved; the command bus
/// decides whether a short count is an error.
pub trait CommandDevice {
    fn write(&mut self, bytes: &[u8]) -> BusResult<usize>;
    fn read(&mut self, buf: &mut [u8]) -> BusResult<usize>;
}

/// Opens command devices. Closing happens when the device is dropped.
pub trait CommandConnector {
    type Device: CommandDevice;

    fn open(&mut self, bus_index: u8, address: u16) -> BusResult<Self::Device>;
}

/// Register-level access to the sensor's command interface.
///
/// Sensor drivers are written against this trait so that the real bus and
/// the in-memory [`RegisterFile`](crate::bus::mock::RegisterFile) are
/// interchangeable.
pub trait RegisterInterface {
    fn initialise(&mut self) -> BusResult<()>;
    fn write_register(&mut self, address: u16, value: u16) -> BusResult<()>;
    fn read_register(&mut self, address: u16) -> BusResult<u16>;
    fn terminate(&mut self);
    fn is_open(&self) -> bool;
}

/// Two-wire register transport bound to [`CCI_ADDRESS`]
pub struct CommandBus<C: CommandConnector = DefaultCommandConnector> {
    connector: C,
    bus_index: u8,
    device_name: String,
    device: Option<C::Device>,
}

impl CommandBus {
    /// Command bus on `/dev/i2c-{bus_index}` using the platform connector
    pub fn new(bus_index: u8) -> Self {
        Self::with_connector(bus_index, DefaultCommandConnector::default())
    }
}

impl<C: CommandConnector> CommandBus<C> {
    pub fn with_connector(bus_index: u8, connector: C) -> Self {
        Self {
            connector,
            bus_index,
            device_name: device_path(bus_index),
            device: None,
        }
    }

    pub fn bus_index(&self) -> u8 {
        self.bus_index
    }

    pub fn address(&self) -> u16 {
        CCI_ADDRESS
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Opens the bus and binds the CCI address, closing any previous handle first.
    pub fn initialise(&mut self) -> BusResult<()> {
        self.terminate();

        let device = self.connector.open(self.bus_index, CCI_ADDRESS)?;
        self.device = Some(device);

        debug!(
            "[CommandBus] opened {} at {:#04x}",
            self.device_name, CCI_ADDRESS
        );
        Ok(())
    }

    /// Closes the handle if open. Safe to call repeatedly.
    pub fn terminate(&mut self) {
        if self.device.take().is_some() {
            debug!("[CommandBus] closed {}", self.device_name);
        }
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    pub fn write_register(&mut self, address: u16, value: u16) -> BusResult<()> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| BusError::not_open(&self.device_name))?;

        let frame = encode_write(address, value);
        let written = device.write(&frame)?;
        check_count(&self.device_name, frame.len(), written)?;

        trace!(
            "[CommandBus] write {:#06x} <- {:#06x}",
            address,
            value
        );
        Ok(())
    }

    pub fn read_register(&mut self, address: u16) -> BusResult<u16> {
        let mut data = [0u8; 2];
        self.select_and_read(address, &mut data)?;
        let value = u16::from_be_bytes(data);

        trace!("[CommandBus] read {:#06x} -> {:#06x}", address, value);
        Ok(value)
    }

    /// Reads `buf.len()` bytes starting at `address` using the same
    /// address-then-data sequence as [`read_register`](Self::read_register).
    pub fn read_block(&mut self, address: u16, buf: &mut [u8]) -> BusResult<()> {
        if self.device.is_some() && buf.is_empty() {
            return Err(BusError::invalid(&self.device_name, "empty read buffer"));
        }
        self.select_and_read(address, buf)?;

        trace!(
            "[CommandBus] read {} byte(s) from {:#06x}",
            buf.len(),
            address
        );
        Ok(())
    }

    fn select_and_read(&mut self, address: u16, buf: &mut [u8]) -> BusResult<()> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| BusError::not_open(&self.device_name))?;

        let pointer = address.to_be_bytes();
        let written = device.write(&pointer)?;
        check_count(&self.device_name, pointer.len(), written)?;

        let read = device.read(buf)?;
        check_count(&self.device_name, buf.len(), read)
    }
}

impl<C: CommandConnector> RegisterInterface for CommandBus<C> {
    fn initialise(&mut self) -> BusResult<()> {
        CommandBus::initialise(self)
    }

    fn write_register(&mut self, address: u16, value: u16) -> BusResult<()> {
        CommandBus::write_register(self, address, value)
    }

    fn read_register(&mut self, address: u16) -> BusResult<u16> {
        CommandBus::read_register(self, address)
    }

    fn terminate(&mut self) {
        CommandBus::terminate(self)
    }

    fn is_open(&self) -> bool {
        CommandBus::is_open(self)
    }
}

impl<C: CommandConnector> Drop for CommandBus<C> {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Register write frame: address then value, both big-endian
pub fn encode_write(address: u16, value: u16) -> [u8; 4] {
    let [addr_hi, addr_lo] = address.to_be_bytes();
    let [data_hi, data_lo] = value.to_be_bytes();
    [addr_hi, addr_lo, data_hi, data_lo]
}

fn check_count(device: &str, expected: usize, actual: usize) -> BusResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(BusError::ShortTransfer {
            device: device.to_string(),
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::{MockI2c, WireOp};
    use crate::errors::FailureKind;
    use test_case::test_case;

    fn open_bus() -> (CommandBus<MockI2c>, MockI2c) {
        let mock = MockI2c::new();
        let mut bus = CommandBus::with_connector(1, mock.clone());
        bus.initialise().unwrap();
        (bus, mock)
    }

    #[test]
    fn test_initialise_binds_cci_address() {
        let (bus, mock) = open_bus();
        assert!(bus.is_open());
        assert_eq!(bus.device_name(), "/dev/i2c-1");
        assert_eq!(bus.bus_index(), 1);
        assert_eq!(bus.address(), 0x2A);
        assert_eq!(mock.bound_address(), Some(bus.address()));
        assert_eq!(mock.open_devices(), 1);
    }

    #[test]
    fn test_initialise_failure_leaves_bus_closed() {
        let mock = MockI2c::new();
        mock.fail_open(true);
        let mut bus = CommandBus::with_connector(1, mock.clone());

        let err = bus.initialise().unwrap_err();
        assert_eq!(err.kind(), FailureKind::DeviceUnavailable);
        assert!(!bus.is_open());
        assert_eq!(mock.open_devices(), 0);
    }

    #[test]
    fn test_initialise_twice_keeps_one_handle() {
        let (mut bus, mock) = open_bus();
        bus.initialise().unwrap();
        assert_eq!(mock.open_devices(), 1);
        assert_eq!(mock.opens(), 2);
    }

    #[test]
    fn test_write_register_frames_big_endian() {
        let (mut bus, mock) = open_bus();
        bus.write_register(0x0004, 0x1234).unwrap();
        assert_eq!(
            mock.wire_log(),
            vec![WireOp::Write(vec![0x00, 0x04, 0x12, 0x34])]
        );
    }

    #[test]
    fn test_read_register_writes_pointer_then_reads() {
        let (mut bus, mock) = open_bus();
        mock.set_register(0x0002, 0x0106);

        assert_eq!(bus.read_register(0x0002).unwrap(), 0x0106);
        assert_eq!(
            mock.wire_log(),
            vec![WireOp::Write(vec![0x00, 0x02]), WireOp::Read(2)]
        );
    }

    #[test_case(0x0000, 0x0000 ; "zero value")]
    #[test_case(0x0008, 0xFFFF ; "all ones")]
    #[test_case(0x0026, 0x8001 ; "top and bottom bits")]
    #[test_case(0xF800, 0x00FF ; "block buffer")]
    fn test_register_round_trip(address: u16, value: u16) {
        let (mut bus, _mock) = open_bus();
        bus.write_register(address, value).unwrap();
        assert_eq!(bus.read_register(address).unwrap(), value);
    }

    #[test]
    fn test_read_zero_is_distinct_from_failure() {
        let (mut bus, mock) = open_bus();
        assert_eq!(bus.read_register(0x0010).unwrap(), 0);

        mock.truncate_reads(Some(1));
        assert!(bus.read_register(0x0010).is_err());
    }

    #[test]
    fn test_operations_before_initialise_fail_without_io() {
        let mock = MockI2c::new();
        let mut bus = CommandBus::with_connector(1, mock.clone());

        assert!(matches!(
            bus.write_register(0x0004, 1),
            Err(BusError::NotOpen { .. })
        ));
        assert!(matches!(
            bus.read_register(0x0002),
            Err(BusError::NotOpen { .. })
        ));
        assert!(mock.wire_log().is_empty());
    }

    #[test]
    fn test_short_write_is_reported() {
        let (mut bus, mock) = open_bus();
        mock.truncate_writes(Some(3));

        match bus.write_register(0x0004, 0xBEEF) {
            Err(BusError::ShortTransfer {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("expected short transfer, got {:?}", other),
        }
        assert!(bus.is_open());
    }

    #[test]
    fn test_short_pointer_write_skips_data_read() {
        let (mut bus, mock) = open_bus();
        mock.truncate_writes(Some(1));

        let err = bus.read_register(0x0002).unwrap_err();
        assert_eq!(err.kind(), FailureKind::TransactionShort);
        assert_eq!(mock.wire_log(), vec![WireOp::Write(vec![0x00, 0x02])]);
    }

    #[test]
    fn test_read_block_reads_consecutive_registers() {
        let (mut bus, mock) = open_bus();
        mock.set_register(0x0008, 0xAABB);
        mock.set_register(0x000A, 0xCCDD);

        let mut buf = [0u8; 4];
        bus.read_block(0x0008, &mut buf).unwrap();
        assert_eq!(buf, [0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn test_read_block_rejects_empty_buffer() {
        let (mut bus, mock) = open_bus();
        let err = bus.read_block(0x0008, &mut []).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Precondition);
        assert!(mock.wire_log().is_empty());
    }

    #[test]
    fn test_terminate_is_idempotent_and_runs_on_drop() {
        let (mut bus, mock) = open_bus();
        bus.terminate();
        bus.terminate();
        assert!(!bus.is_open());
        assert_eq!(mock.open_devices(), 0);

        bus.initialise().unwrap();
        assert_eq!(mock.open_devices(), 1);
        drop(bus);
        assert_eq!(mock.open_devices(), 0);
    }

    #[test]
    fn test_encode_write() {
        assert_eq!(encode_write(0x0102, 0x0304), [0x01, 0x02, 0x03, 0x04]);
    }
}
