//! In-memory stand-ins for the command and serial buses.
//!
//! [`MockI2c`] and [`MockSpi`] plug into [`CommandBus`](super::i2c::CommandBus)
//! and [`SerialBus`](super::spi::SerialBus) in place of the Linux connectors.
//! Both are cheap to clone; clones share state, so a test can keep one copy
//! to inspect the wire traffic and inject faults while the bus owns another.
//! [`RegisterFile`] replaces the whole command bus for driver-level tests.

use super::i2c::{CommandConnector, CommandDevice, RegisterInterface};
use super::spi::{Segment, SerialConnector, SerialDevice, SpiConfig};
use crate::errors::{BusError, BusResult};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(state: &Mutex<T>) -> MutexGuard<'_, T> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One I2C transaction as seen on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireOp {
    /// Bytes submitted for writing
    Write(Vec<u8>),
    /// Number of bytes requested
    Read(usize),
}

#[derive(Debug, Default)]
struct I2cState {
    opens: usize,
    open_devices: usize,
    bound_address: Option<u16>,
    fail_open: bool,
    truncate_writes: Option<usize>,
    truncate_reads: Option<usize>,
    registers: HashMap<u16, u16>,
    pointer: u16,
    wire_log: Vec<WireOp>,
}

impl I2cState {
    /// Word-addressed register file: each register spans two bytes, so
    /// consecutive registers are two addresses apart.
    fn register_byte(&self, offset: usize) -> u8 {
        let address = self.pointer.wrapping_add((offset / 2 * 2) as u16);
        let value = self.registers.get(&address).copied().unwrap_or(0);
        value.to_be_bytes()[offset % 2]
    }
}

/// Emulated CCI peripheral behind an I2C connector.
///
/// A write of two bytes moves the register pointer; longer writes also store
/// the following 16-bit words. Reads return big-endian words from the pointer.
#[derive(Debug, Clone, Default)]
pub struct MockI2c {
    state: Arc<Mutex<I2cState>>,
}

impl MockI2c {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next opens fail with `DeviceUnavailable`
    pub fn fail_open(&self, fail: bool) {
        lock(&self.state).fail_open = fail;
    }

    /// Accept at most `limit` bytes per write
    pub fn truncate_writes(&self, limit: Option<usize>) {
        lock(&self.state).truncate_writes = limit;
    }

    /// Return at most `limit` bytes per read
    pub fn truncate_reads(&self, limit: Option<usize>) {
        lock(&self.state).truncate_reads = limit;
    }

    pub fn set_register(&self, address: u16, value: u16) {
        lock(&self.state).registers.insert(address, value);
    }

    pub fn register(&self, address: u16) -> u16 {
        lock(&self.state)
            .registers
            .get(&address)
            .copied()
            .unwrap_or(0)
    }

    /// Total number of successful opens
    pub fn opens(&self) -> usize {
        lock(&self.state).opens
    }

    /// Devices currently open
    pub fn open_devices(&self) -> usize {
        lock(&self.state).open_devices
    }

    pub fn bound_address(&self) -> Option<u16> {
        lock(&self.state).bound_address
    }

    pub fn wire_log(&self) -> Vec<WireOp> {
        lock(&self.state).wire_log.clone()
    }
}

impl CommandConnector for MockI2c {
    type Device = MockI2cDevice;

    fn open(&mut self, bus_index: u8, address: u16) -> BusResult<MockI2cDevice> {
        let mut state = lock(&self.state);
        if state.fail_open {
            return Err(BusError::DeviceUnavailable {
                device: super::i2c::device_path(bus_index),
                reason: "mock open failure".to_string(),
            });
        }
        state.opens += 1;
        state.open_devices += 1;
        state.bound_address = Some(address);

        Ok(MockI2cDevice {
            state: Arc::clone(&self.state),
        })
    }
}

/// Open handle produced by [`MockI2c`]
#[derive(Debug)]
pub struct MockI2cDevice {
    state: Arc<Mutex<I2cState>>,
}

impl CommandDevice for MockI2cDevice {
    fn write(&mut self, bytes: &[u8]) -> BusResult<usize> {
        let mut state = lock(&self.state);
        state.wire_log.push(WireOp::Write(bytes.to_vec()));

        let accepted = state
            .truncate_writes
            .map_or(bytes.len(), |limit| limit.min(bytes.len()));
        let bytes = &bytes[..accepted];

        if bytes.len() >= 2 {
            state.pointer = u16::from_be_bytes([bytes[0], bytes[1]]);
            let base = state.pointer;
            for (i, word) in bytes[2..].chunks_exact(2).enumerate() {
                let address = base.wrapping_add((i * 2) as u16);
                state
                    .registers
                    .insert(address, u16::from_be_bytes([word[0], word[1]]));
            }
        }
        Ok(accepted)
    }

    fn read(&mut self, buf: &mut [u8]) -> BusResult<usize> {
        let mut state = lock(&self.state);
        state.wire_log.push(WireOp::Read(buf.len()));

        let delivered = state
            .truncate_reads
            .map_or(buf.len(), |limit| limit.min(buf.len()));
        for (offset, byte) in buf[..delivered].iter_mut().enumerate() {
            *byte = state.register_byte(offset);
        }
        Ok(delivered)
    }
}

impl Drop for MockI2cDevice {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.open_devices = state.open_devices.saturating_sub(1);
    }
}

/// Loopback implementation of [`RegisterInterface`] with no wire underneath
#[derive(Debug, Default)]
pub struct RegisterFile {
    open: bool,
    registers: HashMap<u16, u16>,
    writes: Vec<(u16, u16)>,
}

impl RegisterFile {
    const NAME: &'static str = "register-file";

    pub fn new() -> Self {
        Self::default()
    }

    /// Preload a register without recording a write
    pub fn preset(&mut self, address: u16, value: u16) {
        self.registers.insert(address, value);
    }

    /// Every successful write in order
    pub fn writes(&self) -> &[(u16, u16)] {
        &self.writes
    }
}

impl RegisterInterface for RegisterFile {
    fn initialise(&mut self) -> BusResult<()> {
        self.open = true;
        Ok(())
    }

    fn write_register(&mut self, address: u16, value: u16) -> BusResult<()> {
        if !self.open {
            return Err(BusError::not_open(Self::NAME));
        }
        self.registers.insert(address, value);
        self.writes.push((address, value));
        Ok(())
    }

    fn read_register(&mut self, address: u16) -> BusResult<u16> {
        if !self.open {
            return Err(BusError::not_open(Self::NAME));
        }
        Ok(self.registers.get(&address).copied().unwrap_or(0))
    }

    fn terminate(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// One SPI segment as submitted to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    /// Transmitted bytes, `None` for receive-only segments
    pub tx: Option<Vec<u8>>,
    pub len: usize,
    /// Whether the segment captured incoming bytes
    pub captures: bool,
}

#[derive(Debug, Default)]
struct SpiState {
    opens: usize,
    open_devices: usize,
    fail_open: bool,
    fail_configure: bool,
    fail_transfers: bool,
    applied_configs: Vec<SpiConfig>,
    messages: Vec<Vec<SegmentRecord>>,
    responses: VecDeque<u8>,
}

/// Loopback spidev stand-in.
///
/// Full-duplex segments echo MOSI back on MISO; receive-only segments are
/// fed from the queued response bytes and read zero once the queue runs dry.
#[derive(Debug, Clone, Default)]
pub struct MockSpi {
    state: Arc<Mutex<SpiState>>,
}

impl MockSpi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_open(&self, fail: bool) {
        lock(&self.state).fail_open = fail;
    }

    /// Open succeeds but applying the configuration fails
    pub fn fail_configure(&self, fail: bool) {
        lock(&self.state).fail_configure = fail;
    }

    pub fn fail_transfers(&self, fail: bool) {
        lock(&self.state).fail_transfers = fail;
    }

    pub fn queue_response(&self, bytes: &[u8]) {
        lock(&self.state).responses.extend(bytes.iter().copied());
    }

    pub fn opens(&self) -> usize {
        lock(&self.state).opens
    }

    pub fn open_devices(&self) -> usize {
        lock(&self.state).open_devices
    }

    pub fn applied_configs(&self) -> Vec<SpiConfig> {
        lock(&self.state).applied_configs.clone()
    }

    /// Every message submitted, one inner vector per message
    pub fn messages(&self) -> Vec<Vec<SegmentRecord>> {
        lock(&self.state).messages.clone()
    }
}

impl SerialConnector for MockSpi {
    type Device = MockSpiDevice;

    fn open(&mut self, bus_index: u8, chip_select: u8, config: &SpiConfig) -> BusResult<MockSpiDevice> {
        let device_name = super::spi::device_path(bus_index, chip_select);
        let device = {
            let mut state = lock(&self.state);
            if state.fail_open {
                return Err(BusError::DeviceUnavailable {
                    device: device_name,
                    reason: "mock open failure".to_string(),
                });
            }
            state.opens += 1;
            state.open_devices += 1;
            MockSpiDevice {
                state: Arc::clone(&self.state),
                device_name: device_name.clone(),
            }
        };

        let mut state = lock(&self.state);
        if state.fail_configure {
            drop(state);
            drop(device);
            return Err(BusError::DeviceUnavailable {
                device: device_name,
                reason: "mock configuration failure".to_string(),
            });
        }
        state.applied_configs.push(*config);
        drop(state);

        Ok(device)
    }
}

/// Open handle produced by [`MockSpi`]
#[derive(Debug)]
pub struct MockSpiDevice {
    state: Arc<Mutex<SpiState>>,
    device_name: String,
}

impl SerialDevice for MockSpiDevice {
    fn transfer(&mut self, segments: &mut [Segment<'_>]) -> BusResult<()> {
        let mut state = lock(&self.state);
        if state.fail_transfers {
            return Err(BusError::TransactionFailed {
                device: self.device_name.clone(),
                reason: "mock transfer failure".to_string(),
            });
        }

        let mut records = Vec::with_capacity(segments.len());
        for segment in segments.iter_mut() {
            records.push(SegmentRecord {
                tx: match segment {
                    Segment::Write(tx) | Segment::Duplex { tx, .. } => Some(tx.to_vec()),
                    Segment::Read(_) => None,
                },
                len: segment.len(),
                captures: segment.captures(),
            });
            match segment {
                Segment::Write(_) => {}
                Segment::Read(rx) => {
                    for byte in rx.iter_mut() {
                        *byte = state.responses.pop_front().unwrap_or(0);
                    }
                }
                Segment::Duplex { tx, rx } => {
                    let echoed = tx.len().min(rx.len());
                    rx[..echoed].copy_from_slice(&tx[..echoed]);
                }
            }
        }
        state.messages.push(records);
        Ok(())
    }
}

impl Drop for MockSpiDevice {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.open_devices = state.open_devices.saturating_sub(1);
    }
}
