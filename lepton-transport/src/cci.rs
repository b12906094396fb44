//! CCI register map of the Lepton command interface.
//!
//! Only the addresses and the status word layout live here; command
//! sequencing belongs to the sensor driver.

pub const POWER_ON: u16 = 0x0000;
pub const STATUS: u16 = 0x0002;
pub const COMMAND_ID: u16 = 0x0004;
pub const DATA_LENGTH: u16 = 0x0006;
/// First of sixteen consecutive 16-bit data registers
pub const DATA_0: u16 = 0x0008;
pub const DATA_REGISTER_COUNT: u16 = 16;
/// Block data buffer 0, used for transfers longer than the data registers
pub const BLOCK_BUFFER_0: u16 = 0xF800;

const STATUS_BUSY: u16 = 1 << 0;
const STATUS_BOOT_MODE: u16 = 1 << 1;
const STATUS_BOOTED: u16 = 1 << 2;

/// Address of data register `index` (0..16)
pub fn data_register(index: u16) -> Option<u16> {
    (index < DATA_REGISTER_COUNT).then(|| DATA_0 + index * 2)
}

/// Decoded STATUS register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CciStatus {
    pub busy: bool,
    pub boot_mode: bool,
    pub booted: bool,
    /// Result of the last command, 0 on success
    pub error_code: i8,
}

impl CciStatus {
    pub fn decode(raw: u16) -> Self {
        Self {
            busy: raw & STATUS_BUSY != 0,
            boot_mode: raw & STATUS_BOOT_MODE != 0,
            booted: raw & STATUS_BOOTED != 0,
            error_code: (raw >> 8) as u8 as i8,
        }
    }

    /// Booted, idle and the last command succeeded
    pub fn is_ready(&self) -> bool {
        self.booted && !self.busy && self.error_code == 0
    }
}
