//! VoSPI serial bus: clocked byte transfers on a `/dev/spidevB.C` node.
//!
//! The electrical profile ([`SpiConfig`]) is fixed per [`SerialBus`] and is
//! re-applied every time the bus is enabled. Each transfer call is submitted
//! to the kernel as one message made of one or more [`Segment`]s.

use crate::errors::{BusError, BusResult, ConfigError, ConfigResult};
use crate::hal::DefaultSerialConnector;
use embedded_hal::spi::{ErrorKind, ErrorType, Operation, SpiDevice};
use tracing::{debug, trace};

/// Default clock rate in Hz. Lepton operates reliably between 8 and 20 MHz.
pub const DEFAULT_SPEED_HZ: u32 = 11_000_000;
/// Lepton VoSPI clock ceiling
pub const MAX_SPEED_HZ: u32 = 20_000_000;
pub const DEFAULT_BITS_PER_WORD: u8 = 8;

/// SPI clock polarity and phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiMode {
    /// CPOL 0, CPHA 0
    Mode0 = 0,
    /// CPOL 0, CPHA 1
    Mode1 = 1,
    /// CPOL 1, CPHA 0
    Mode2 = 2,
    /// CPOL 1, CPHA 1
    Mode3 = 3,
}

impl SpiMode {
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(SpiMode::Mode0),
            1 => Some(SpiMode::Mode1),
            2 => Some(SpiMode::Mode2),
            3 => Some(SpiMode::Mode3),
            _ => None,
        }
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    /// Clock idles high
    pub fn cpol(self) -> bool {
        matches!(self, SpiMode::Mode2 | SpiMode::Mode3)
    }

    /// Data sampled on the trailing clock edge
    pub fn cpha(self) -> bool {
        matches!(self, SpiMode::Mode1 | SpiMode::Mode3)
    }
}

/// Electrical profile applied to the device on every enable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiConfig {
    pub mode: SpiMode,
    pub speed_hz: u32,
    pub bits_per_word: u8,
}

impl Default for SpiConfig {
    /// Mode 3, 11 MHz, 8-bit words as required by VoSPI
    fn default() -> Self {
        Self {
            mode: SpiMode::Mode3,
            speed_hz: DEFAULT_SPEED_HZ,
            bits_per_word: DEFAULT_BITS_PER_WORD,
        }
    }
}

impl SpiConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.speed_hz == 0 || self.speed_hz > MAX_SPEED_HZ {
            return Err(ConfigError::InvalidValue {
                field: "speed_hz".to_string(),
                reason: format!(
                    "{} Hz is outside 1..={} Hz",
                    self.speed_hz, MAX_SPEED_HZ
                ),
            });
        }
        if self.bits_per_word == 0 {
            return Err(ConfigError::InvalidValue {
                field: "bits_per_word".to_string(),
                reason: "word size must be at least one bit".to_string(),
            });
        }
        Ok(())
    }
}

/// Path of the kernel spidev node for a (bus, chip select) pair
pub fn device_path(bus_index: u8, chip_select: u8) -> String {
    format!("/dev/spidev{}.{}", bus_index, chip_select)
}

/// One directional part of an SPI message.
///
/// Maps onto one kernel transfer descriptor. Receive-only segments shift
/// out zeros.
#[derive(Debug)]
pub enum Segment<'a> {
    Write(&'a [u8]),
    Read(&'a mut [u8]),
    Duplex { tx: &'a [u8], rx: &'a mut [u8] },
}

impl Segment<'_> {
    pub fn len(&self) -> usize {
        match self {
            Segment::Write(tx) => tx.len(),
            Segment::Read(rx) => rx.len(),
            Segment::Duplex { tx, .. } => tx.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn captures(&self) -> bool {
        !matches!(self, Segment::Write(_))
    }
}

/// An open, configured spidev handle
pub trait SerialDevice {
    /// Submits all segments as a single message
    fn transfer(&mut self, segments: &mut [Segment<'_>]) -> BusResult<()>;
}

/// Opens and configures serial devices. A device that fails configuration
/// must be closed before the error is returned.
pub trait SerialConnector {
    type Device: SerialDevice;

    fn open(
        &mut self,
        bus_index: u8,
        chip_select: u8,
        config: &SpiConfig,
    ) -> BusResult<Self::Device>;
}

/// Four-wire synchronous transport
pub struct SerialBus<C: SerialConnector = DefaultSerialConnector> {
    connector: C,
    bus_index: u8,
    chip_select: u8,
    config: SpiConfig,
    device_name: String,
    device: Option<C::Device>,
}

impl SerialBus {
    /// Serial bus with the default VoSPI profile (Mode 3, 11 MHz, 8 bits)
    pub fn new(bus_index: u8, chip_select: u8) -> Self {
        Self::with_config(bus_index, chip_select, SpiConfig::default())
    }

    pub fn with_config(bus_index: u8, chip_select: u8, config: SpiConfig) -> Self {
        Self::with_connector(
            bus_index,
            chip_select,
            config,
            DefaultSerialConnector::default(),
        )
    }
}

impl<C: SerialConnector> SerialBus<C> {
    pub fn with_connector(bus_index: u8, chip_select: u8, config: SpiConfig, connector: C) -> Self {
        Self {
            connector,
            bus_index,
            chip_select,
            config,
            device_name: device_path(bus_index, chip_select),
            device: None,
        }
    }

    pub fn config(&self) -> &SpiConfig {
        &self.config
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Opens and configures the device, closing any previous handle first.
    pub fn enable(&mut self) -> BusResult<()> {
        self.disable()?;

        self.config
            .validate()
            .map_err(|e| BusError::DeviceUnavailable {
                device: self.device_name.clone(),
                reason: e.to_string(),
            })?;

        let device = self
            .connector
            .open(self.bus_index, self.chip_select, &self.config)?;
        self.device = Some(device);

        debug!(
            "[SerialBus] opened {} (mode {}, {} Hz, {} bits)",
            self.device_name,
            self.config.mode.index(),
            self.config.speed_hz,
            self.config.bits_per_word
        );
        Ok(())
    }

    /// Closes the handle if open. Closing a closed bus is not an error.
    pub fn disable(&mut self) -> BusResult<()> {
        if self.device.take().is_some() {
            debug!("[SerialBus] closed {}", self.device_name);
        }
        Ok(())
    }

    /// Transmit-only transaction
    pub fn write(&mut self, tx: &[u8]) -> BusResult<()> {
        self.ensure_open()?;
        if tx.is_empty() {
            return Err(BusError::invalid(&self.device_name, "empty transmit buffer"));
        }
        self.submit(&mut [Segment::Write(tx)])
    }

    /// Full-duplex transaction: `tx.len()` bytes out while the same number
    /// of bytes are captured into `rx`.
    pub fn transfer(&mut self, tx: &[u8], rx: &mut [u8]) -> BusResult<()> {
        self.ensure_open()?;
        if tx.is_empty() || rx.is_empty() {
            return Err(BusError::invalid(&self.device_name, "empty transfer buffer"));
        }
        if tx.len() != rx.len() {
            return Err(BusError::invalid(
                &self.device_name,
                format!(
                    "transmit length {} differs from receive length {}",
                    tx.len(),
                    rx.len()
                ),
            ));
        }
        self.submit(&mut [Segment::Duplex { tx, rx }])
    }

    /// Half-duplex transaction: send `tx`, then capture `rx`, as one message
    pub fn write_then_read(&mut self, tx: &[u8], rx: &mut [u8]) -> BusResult<()> {
        self.ensure_open()?;
        if tx.is_empty() || rx.is_empty() {
            return Err(BusError::invalid(&self.device_name, "empty transfer buffer"));
        }
        self.submit(&mut [Segment::Write(tx), Segment::Read(rx)])
    }

    fn ensure_open(&self) -> BusResult<()> {
        if self.device.is_some() {
            Ok(())
        } else {
            Err(BusError::not_open(&self.device_name))
        }
    }

    fn submit(&mut self, segments: &mut [Segment<'_>]) -> BusResult<()> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| BusError::not_open(&self.device_name))?;

        trace!(
            "[SerialBus] {}: message of {} segment(s), {} byte(s)",
            self.device_name,
            segments.len(),
            segments.iter().map(Segment::len).sum::<usize>()
        );
        device.transfer(segments)
    }
}

impl<C: SerialConnector> Drop for SerialBus<C> {
    fn drop(&mut self) {
        let _ = self.disable();
    }
}

// None of the controller-level kinds describe these failures; drivers that
// need the detail get the `BusError` itself.
impl embedded_hal::spi::Error for BusError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl<C: SerialConnector> ErrorType for SerialBus<C> {
    type Error = BusError;
}

/// Lets embedded-hal drivers run on top of the bus. The whole operation list
/// goes out as a single message; zero-length operations are skipped and
/// delays are not supported.
impl<C: SerialConnector> SpiDevice for SerialBus<C> {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), BusError> {
        self.ensure_open()?;

        // In-place transfers need a separate copy of the outgoing bytes.
        let outgoing: Vec<Option<Vec<u8>>> = operations
            .iter()
            .map(|op| match op {
                Operation::TransferInPlace(buf) => Some(buf.to_vec()),
                _ => None,
            })
            .collect();

        let mut segments = Vec::with_capacity(operations.len());
        for (op, copy) in operations.iter_mut().zip(outgoing.iter()) {
            match op {
                Operation::Write(tx) => segments.push(Segment::Write(&tx[..])),
                Operation::Read(rx) => segments.push(Segment::Read(&mut rx[..])),
                Operation::Transfer(rx, tx) => {
                    // Clocked for the longer buffer: the overlap is full
                    // duplex, then the remaining bytes go out or come in.
                    let common = rx.len().min(tx.len());
                    let (tx_head, tx_tail) = tx.split_at(common);
                    let (rx_head, rx_tail) = rx.split_at_mut(common);
                    segments.push(Segment::Duplex {
                        tx: tx_head,
                        rx: rx_head,
                    });
                    if !tx_tail.is_empty() {
                        segments.push(Segment::Write(tx_tail));
                    }
                    if !rx_tail.is_empty() {
                        segments.push(Segment::Read(rx_tail));
                    }
                }
                Operation::TransferInPlace(buf) => {
                    if let Some(tx) = copy {
                        segments.push(Segment::Duplex {
                            tx: tx.as_slice(),
                            rx: &mut buf[..],
                        })
                    }
                }
                Operation::DelayNs(_) => {
                    return Err(BusError::Unsupported {
                        device: self.device_name.clone(),
                        operation: "DelayNs".to_string(),
                    })
                }
            }
        }
        segments.retain(|segment| !segment.is_empty());

        if segments.is_empty() {
            return Ok(());
        }
        self.submit(&mut segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::mock::{MockSpi, SegmentRecord};
    use crate::errors::FailureKind;

    fn enabled_bus() -> (SerialBus<MockSpi>, MockSpi) {
        let mock = MockSpi::new();
        let mut bus = SerialBus::with_connector(0, 0, SpiConfig::default(), mock.clone());
        bus.enable().unwrap();
        (bus, mock)
    }

    #[test]
    fn test_default_profile_is_vospi() {
        let config = SpiConfig::default();
        assert_eq!(config.mode, SpiMode::Mode3);
        assert!(config.mode.cpol() && config.mode.cpha());
        assert_eq!(config.speed_hz, 11_000_000);
        assert_eq!(config.bits_per_word, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_speed() {
        let config = SpiConfig {
            speed_hz: 25_000_000,
            ..SpiConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SpiConfig {
            speed_hz: 0,
            ..SpiConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_enable_applies_config() {
        let (bus, mock) = enabled_bus();
        assert!(bus.is_open());
        assert_eq!(bus.device_name(), "/dev/spidev0.0");
        assert_eq!(mock.applied_configs(), vec![SpiConfig::default()]);
    }

    #[test]
    fn test_enable_twice_holds_one_descriptor() {
        let (mut bus, mock) = enabled_bus();
        bus.enable().unwrap();

        assert_eq!(mock.opens(), 2);
        assert_eq!(mock.open_devices(), 1);
        assert_eq!(mock.applied_configs().len(), 2);
    }

    #[test]
    fn test_failed_configuration_leaves_bus_closed() {
        let mock = MockSpi::new();
        mock.fail_configure(true);
        let mut bus = SerialBus::with_connector(0, 1, SpiConfig::default(), mock.clone());

        let err = bus.enable().unwrap_err();
        assert_eq!(err.kind(), FailureKind::DeviceUnavailable);
        assert!(!bus.is_open());
        assert_eq!(mock.opens(), 1);
        assert_eq!(mock.open_devices(), 0);
    }

    #[test]
    fn test_failed_reenable_closes_previous_handle() {
        let (mut bus, mock) = enabled_bus();
        mock.fail_open(true);

        assert!(bus.enable().is_err());
        assert!(!bus.is_open());
        assert_eq!(mock.open_devices(), 0);
    }

    #[test]
    fn test_invalid_config_never_opens_device() {
        let mock = MockSpi::new();
        let config = SpiConfig {
            bits_per_word: 0,
            ..SpiConfig::default()
        };
        let mut bus = SerialBus::with_connector(0, 0, config, mock.clone());

        assert!(bus.enable().is_err());
        assert_eq!(mock.opens(), 0);
    }

    #[test]
    fn test_disable_always_succeeds() {
        let (mut bus, mock) = enabled_bus();
        assert!(bus.disable().is_ok());
        assert!(bus.disable().is_ok());
        assert_eq!(mock.open_devices(), 0);
    }

    #[test]
    fn test_empty_buffers_are_rejected_without_io() {
        let (mut bus, mock) = enabled_bus();
        let mut rx = [0u8; 2];

        assert!(matches!(bus.write(&[]), Err(BusError::InvalidRequest { .. })));
        assert!(matches!(
            bus.transfer(&[], &mut rx),
            Err(BusError::InvalidRequest { .. })
        ));
        assert!(matches!(
            bus.transfer(&[0x01, 0x02], &mut []),
            Err(BusError::InvalidRequest { .. })
        ));
        assert!(matches!(
            bus.write_then_read(&[], &mut rx),
            Err(BusError::InvalidRequest { .. })
        ));
        assert!(matches!(
            bus.write_then_read(&[0x01], &mut []),
            Err(BusError::InvalidRequest { .. })
        ));
        assert!(mock.messages().is_empty());
    }

    #[test]
    fn test_transfer_rejects_mismatched_lengths() {
        let (mut bus, mock) = enabled_bus();
        let mut rx = [0u8; 3];
        let err = bus.transfer(&[0x01, 0x02], &mut rx).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Precondition);
        assert!(mock.messages().is_empty());
    }

    #[test]
    fn test_transfer_echoes_on_loopback() {
        let (mut bus, mock) = enabled_bus();
        let mut rx = [0u8; 1];

        bus.transfer(&[0xA5], &mut rx).unwrap();
        assert_eq!(rx, [0xA5]);
        assert_eq!(
            mock.messages(),
            vec![vec![SegmentRecord {
                tx: Some(vec![0xA5]),
                len: 1,
                captures: true,
            }]]
        );
    }

    #[test]
    fn test_write_is_transmit_only() {
        let (mut bus, mock) = enabled_bus();
        bus.write(&[0x01, 0x02, 0x03]).unwrap();

        let messages = mock.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].len(), 1);
        assert_eq!(messages[0][0].tx, Some(vec![0x01, 0x02, 0x03]));
        assert!(!messages[0][0].captures);
    }

    #[test]
    fn test_write_then_read_issues_two_segments() {
        let (mut bus, mock) = enabled_bus();
        mock.queue_response(&[0x12, 0x34]);
        let mut rx = [0u8; 2];

        bus.write_then_read(&[0x0F, 0x00], &mut rx).unwrap();

        assert_eq!(rx, [0x12, 0x34]);
        assert_eq!(
            mock.messages(),
            vec![vec![
                SegmentRecord {
                    tx: Some(vec![0x0F, 0x00]),
                    len: 2,
                    captures: false,
                },
                SegmentRecord {
                    tx: None,
                    len: 2,
                    captures: true,
                },
            ]]
        );
    }

    #[test]
    fn test_write_after_disable_fails() {
        let (mut bus, mock) = enabled_bus();
        bus.disable().unwrap();

        assert!(matches!(
            bus.write(&[0x01]),
            Err(BusError::NotOpen { .. })
        ));
        assert!(mock.messages().is_empty());
    }

    #[test]
    fn test_duplex_calls_after_disable_fail() {
        let (mut bus, mock) = enabled_bus();
        bus.disable().unwrap();
        let mut rx = [0u8; 2];

        assert!(matches!(
            bus.transfer(&[0x01, 0x02], &mut rx),
            Err(BusError::NotOpen { .. })
        ));
        assert!(matches!(
            bus.write_then_read(&[0x01], &mut rx),
            Err(BusError::NotOpen { .. })
        ));
        assert!(mock.messages().is_empty());
    }

    #[test]
    fn test_closed_bus_is_reported_before_empty_buffers() {
        let mock = MockSpi::new();
        let mut bus = SerialBus::with_connector(0, 0, SpiConfig::default(), mock.clone());

        assert!(matches!(
            bus.transfer(&[], &mut []),
            Err(BusError::NotOpen { .. })
        ));
        assert!(matches!(
            bus.write_then_read(&[], &mut []),
            Err(BusError::NotOpen { .. })
        ));
        assert_eq!(mock.opens(), 0);
    }

    #[test]
    fn test_transaction_failure_keeps_bus_open() {
        let (mut bus, mock) = enabled_bus();
        mock.fail_transfers(true);

        let err = bus.write(&[0x01]).unwrap_err();
        assert_eq!(err.kind(), FailureKind::TransactionFailed);
        assert!(bus.is_open());
    }

    #[test]
    fn test_drop_closes_device() {
        let (bus, mock) = enabled_bus();
        drop(bus);
        assert_eq!(mock.open_devices(), 0);
    }

    #[test]
    fn test_spi_device_transaction_maps_operations() {
        let (mut bus, mock) = enabled_bus();
        mock.queue_response(&[0xEE]);
        let mut read = [0u8; 1];
        let mut in_place = [0x5A, 0xC3];

        bus.transaction(&mut [
            Operation::Write(&[0x01]),
            Operation::Read(&mut read),
            Operation::TransferInPlace(&mut in_place),
        ])
        .unwrap();

        assert_eq!(read, [0xEE]);
        assert_eq!(in_place, [0x5A, 0xC3]);
        let messages = mock.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].len(), 3);
    }

    #[test]
    fn test_spi_device_transfer_reads_past_command() {
        let (mut bus, mock) = enabled_bus();
        mock.queue_response(&[0x11, 0x22, 0x33]);
        let mut rx = [0u8; 4];

        SpiDevice::transfer(&mut bus, &mut rx, &[0x9F]).unwrap();

        assert_eq!(rx, [0x9F, 0x11, 0x22, 0x33]);
        assert_eq!(
            mock.messages(),
            vec![vec![
                SegmentRecord {
                    tx: Some(vec![0x9F]),
                    len: 1,
                    captures: true,
                },
                SegmentRecord {
                    tx: None,
                    len: 3,
                    captures: true,
                },
            ]]
        );
    }

    #[test]
    fn test_spi_device_transfer_writes_past_receive_buffer() {
        let (mut bus, mock) = enabled_bus();
        let mut rx = [0u8; 1];

        bus.transaction(&mut [Operation::Transfer(&mut rx, &[0x9F, 0x01, 0x02])])
            .unwrap();

        assert_eq!(rx, [0x9F]);
        assert_eq!(
            mock.messages(),
            vec![vec![
                SegmentRecord {
                    tx: Some(vec![0x9F]),
                    len: 1,
                    captures: true,
                },
                SegmentRecord {
                    tx: Some(vec![0x01, 0x02]),
                    len: 2,
                    captures: false,
                },
            ]]
        );
    }

    #[test]
    fn test_spi_device_transfer_with_empty_receive_is_a_write() {
        let (mut bus, mock) = enabled_bus();

        bus.transaction(&mut [Operation::Transfer(&mut [], &[0x01, 0x02])])
            .unwrap();

        let messages = mock.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].len(), 1);
        assert!(!messages[0][0].captures);
    }

    #[test]
    fn test_spi_device_rejects_delays() {
        let (mut bus, mock) = enabled_bus();
        let err = bus
            .transaction(&mut [Operation::Write(&[0x01]), Operation::DelayNs(100)])
            .unwrap_err();
        assert!(matches!(err, BusError::Unsupported { .. }));
        assert!(mock.messages().is_empty());
    }
}
