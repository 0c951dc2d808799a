use core::fmt;
use thiserror::Error;

pub const SECTOR_COUNT: usize = 32;
pub const SECTORS_PER_BANK: usize = 16;
pub const BYTES_PER_SECTOR: usize = 4096;
pub const SECTOR_SHIFT: u32 = 12;
pub const BANK_COUNT: usize = SECTOR_COUNT / SECTORS_PER_BANK;
pub const BANK_SIZE: usize = SECTORS_PER_BANK * BYTES_PER_SECTOR;

/// Command-set addresses, relative to the cartridge flash window.
pub mod addr {
    pub const UNLOCK1: u32 = 0x5555;
    pub const UNLOCK2: u32 = 0x2AAA;
    pub const BANK_SELECT: u32 = 0x0000;
    pub const ID_MANUFACTURER: u32 = 0x0000;
    pub const ID_DEVICE: u32 = 0x0001;
}

/// Command-set data bytes.
pub mod cmd {
    pub const UNLOCK1: u8 = 0xAA;
    pub const UNLOCK2: u8 = 0x55;
    pub const ID_ENTER: u8 = 0x90;
    pub const ID_EXIT: u8 = 0xF0;
    pub const RESET: u8 = 0xF0;
    pub const BANK_SWITCH: u8 = 0xB0;
    pub const ERASE_SETUP: u8 = 0x80;
    pub const SECTOR_ERASE: u8 = 0x30;
    pub const BYTE_PROGRAM: u8 = 0xA0;
}

/// Status bit 5: internal timeout, the chip gave up on the operation.
pub const STATUS_FAILED: u8 = 0x20;
pub const ERASED: u8 = 0xFF;

/// Timer block control bits.
pub const TIMER_CASCADE: u16 = 0x0004;
pub const TIMER_START: u16 = 0x0080;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    #[error("sector erase aborted by the chip (status bit 5)")]
    EraseAborted,
    #[error("byte program aborted by the chip (status bit 5)")]
    ProgramAborted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollStatus {
    Completed,
    Failed,
    Pending,
}

impl PollStatus {
    pub fn classify(status: u8, expected: u8) -> Self {
        if status == expected {
            PollStatus::Completed
        } else if status & STATUS_FAILED != 0 {
            PollStatus::Failed
        } else {
            PollStatus::Pending
        }
    }
}

/// Byte-wide memory-mapped window onto the flash chip.
pub trait FlashBus {
    fn issue(&mut self, offset: u32, data: u8);
    fn read(&mut self, offset: u32) -> u8;

    fn poll_status(&mut self, offset: u32, expected: u8) -> PollStatus {
        PollStatus::classify(self.read(offset), expected)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerId {
    /// Free-running low half.
    Low,
    /// Counts overflows of `Low`.
    High,
}

/// Control/count register pairs of two chained 16-bit counters, plus the
/// interrupt master enable they must run under.
pub trait TimerRegs {
    fn write_control(&mut self, timer: TimerId, value: u16);
    fn write_reload(&mut self, timer: TimerId, value: u16);
    fn read_count(&mut self, timer: TimerId) -> u16;
    fn set_interrupt_master(&mut self, enabled: bool);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bank {
    Lower = 0,
    Upper = 1,
}

impl Bank {
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            0 => Some(Bank::Lower),
            1 => Some(Bank::Upper),
            _ => None,
        }
    }
}

/// A physical sector 0..32, spanning both banks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SectorIndex(u8);

impl SectorIndex {
    pub fn new(index: u8) -> Option<Self> {
        ((index as usize) < SECTOR_COUNT).then_some(SectorIndex(index))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn bank(self) -> Bank {
        if (self.0 as usize) < SECTORS_PER_BANK { Bank::Lower } else { Bank::Upper }
    }

    /// Bank-relative sector number, the only form the chip understands.
    pub fn in_bank(self) -> u8 {
        self.0 % SECTORS_PER_BANK as u8
    }
}

impl fmt::Display for SectorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

/// Window offset of a byte inside a bank-relative sector.
pub fn sector_offset(sector: u8, offset: u16) -> u32 {
    ((sector as u32) << SECTOR_SHIFT) + offset as u32
}

pub const MACRONIX_MX29L010: u16 = 0x09C2;
pub const SANYO_LE26FV10N1TS: u16 = 0x1362;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChipModel {
    MacronixMx29l010,
    SanyoLe26fv10n1ts,
    Unknown(u16),
}

impl ChipModel {
    pub fn from_id(id: u16) -> Self {
        match id {
            MACRONIX_MX29L010 => ChipModel::MacronixMx29l010,
            SANYO_LE26FV10N1TS => ChipModel::SanyoLe26fv10n1ts,
            other => ChipModel::Unknown(other),
        }
    }

    pub fn id(self) -> u16 {
        match self {
            ChipModel::MacronixMx29l010 => MACRONIX_MX29L010,
            ChipModel::SanyoLe26fv10n1ts => SANYO_LE26FV10N1TS,
            ChipModel::Unknown(id) => id,
        }
    }
}

impl fmt::Display for ChipModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChipModel::MacronixMx29l010 => write!(f, "Flash Chip: Macronix MX29L010"),
            ChipModel::SanyoLe26fv10n1ts => write!(f, "Flash Chip: Sanyo LE26FV10N1TS"),
            ChipModel::Unknown(id) => write!(f, "Unknown Flash Chip: {:04X}", id),
        }
    }
}
