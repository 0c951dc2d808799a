use flash_core::{addr, cmd, sector_offset, Bank, FlashBus, FlashError, PollStatus, TimerRegs, BYTES_PER_SECTOR, ERASED};

pub mod timer;

pub use timer::{CycleTimer, TimerState};

/// Bus reads spent waiting for the chip to settle after entering or leaving
/// ID mode.
pub const SETTLE_READS: u32 = 64;

pub struct Driver<B: FlashBus, T: TimerRegs> {
    bus: B,
    timer: CycleTimer<T>,
}

impl<B: FlashBus, T: TimerRegs> Driver<B, T> {
    pub fn new(bus: B, timer: T) -> Self {
        Driver { bus, timer: CycleTimer::new(timer) }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn timer(&self) -> &CycleTimer<T> {
        &self.timer
    }

    pub fn into_parts(self) -> (B, T) {
        let Driver { bus, timer } = self;
        (bus, timer.into_regs())
    }

    fn unlock(&mut self) {
        self.bus.issue(addr::UNLOCK1, cmd::UNLOCK1);
        self.bus.issue(addr::UNLOCK2, cmd::UNLOCK2);
    }

    fn settle(&mut self) {
        for _ in 0..SETTLE_READS {
            self.bus.read(addr::UNLOCK1);
        }
    }

    fn reset(&mut self) {
        self.bus.issue(addr::UNLOCK1, cmd::RESET);
    }

    pub fn read_flash_id(&mut self) -> u16 {
        self.unlock();
        self.bus.issue(addr::UNLOCK1, cmd::ID_ENTER);
        self.settle();

        let id = (self.bus.read(addr::ID_DEVICE) as u16) << 8 | self.bus.read(addr::ID_MANUFACTURER) as u16;

        self.unlock();
        self.bus.issue(addr::UNLOCK1, cmd::ID_EXIT);
        self.bus.issue(addr::UNLOCK1, cmd::ID_EXIT);
        self.settle();

        log::debug!("flash id {:04X}", id);
        id
    }

    /// Selects which 64 KiB half the window maps. Not verified; the caller
    /// tracks the active bank.
    pub fn switch_bank(&mut self, bank: Bank) {
        log::trace!("switch to bank {}", bank.number());
        self.unlock();
        self.bus.issue(addr::UNLOCK1, cmd::BANK_SWITCH);
        self.bus.issue(addr::BANK_SELECT, bank.number());
    }

    fn erase_prefix(&mut self) {
        self.unlock();
        self.bus.issue(addr::UNLOCK1, cmd::ERASE_SETUP);
        self.unlock();
    }

    /// Spins on `target` until it reads back `expected` or the chip raises
    /// status bit 5.
    fn wait(&mut self, target: u32, expected: u8) -> bool {
        loop {
            match self.bus.poll_status(target, expected) {
                PollStatus::Completed => return true,
                PollStatus::Failed => return false,
                PollStatus::Pending => {}
            }
        }
    }

    /// Erases one bank-relative sector. No retry on abort.
    pub fn erase_sector(&mut self, sector: u8) -> Result<(), FlashError> {
        let target = sector_offset(sector, 0);
        log::trace!("erase sector {}", sector);
        self.erase_prefix();
        self.bus.issue(target, cmd::SECTOR_ERASE);

        if self.wait(target, ERASED) {
            Ok(())
        } else {
            self.reset();
            log::debug!("erase of sector {} aborted", sector);
            Err(FlashError::EraseAborted)
        }
    }

    /// As [`Driver::erase_sector`], returning the cycles between the confirm
    /// write and the final poll.
    pub fn erase_sector_timed(&mut self, sector: u8) -> Result<u32, FlashError> {
        self.timer.setup();
        let target = sector_offset(sector, 0);
        self.erase_prefix();

        self.timer.start();
        self.bus.issue(target, cmd::SECTOR_ERASE);
        let done = self.wait(target, ERASED);
        self.timer.end();

        if done {
            Ok(self.timer.result())
        } else {
            self.reset();
            log::debug!("timed erase of sector {} aborted", sector);
            Err(FlashError::EraseAborted)
        }
    }

    pub fn program_byte(&mut self, sector: u8, offset: u16, value: u8) -> Result<(), FlashError> {
        let target = sector_offset(sector, offset);
        self.unlock();
        self.bus.issue(addr::UNLOCK1, cmd::BYTE_PROGRAM);
        self.bus.issue(target, value);

        if self.wait(target, value) {
            Ok(())
        } else {
            self.reset();
            log::debug!("program of {:02X} at sector {} +{:#05X} aborted", value, sector, offset);
            Err(FlashError::ProgramAborted)
        }
    }

    pub fn program_byte_timed(&mut self, sector: u8, offset: u16, value: u8) -> Result<u32, FlashError> {
        self.timer.setup();
        let target = sector_offset(sector, offset);
        self.unlock();
        self.bus.issue(addr::UNLOCK1, cmd::BYTE_PROGRAM);

        self.timer.start();
        self.bus.issue(target, value);
        let done = self.wait(target, value);
        self.timer.end();

        if done {
            Ok(self.timer.result())
        } else {
            self.reset();
            log::debug!("timed program of {:02X} at sector {} +{:#05X} aborted", value, sector, offset);
            Err(FlashError::ProgramAborted)
        }
    }

    pub fn read_byte(&mut self, sector: u8, offset: u16) -> u8 {
        self.bus.read(sector_offset(sector, offset))
    }

    /// Fills at most one sector's worth of `buf`; bytes past
    /// `BYTES_PER_SECTOR` are left untouched.
    pub fn read_sector(&mut self, sector: u8, buf: &mut [u8]) {
        for (i, b) in buf.iter_mut().take(BYTES_PER_SECTOR).enumerate() {
            *b = self.read_byte(sector, i as u16);
        }
    }
}

#[cfg(feature = "sim")]
pub mod sim {
    use super::*;
    use flash_mock::{SimClock, SimConfig, SimFlash, SimTimer};

    pub type SimDriver = Driver<SimFlash, SimTimer>;

    pub struct SimEnv {
        pub clock: SimClock,
        pub config: SimConfig,
    }

    impl SimEnv {
        pub fn new() -> Self {
            Self::with_config(SimConfig::default())
        }

        pub fn with_config(config: SimConfig) -> Self {
            SimEnv { clock: SimClock::new(), config }
        }
    }

    impl Default for SimEnv {
        fn default() -> Self {
            Self::new()
        }
    }

    pub fn driver_with_env(env: &SimEnv) -> SimDriver {
        let flash = SimFlash::new(env.clock.clone(), env.config.clone());
        let timer = SimTimer::new(env.clock.clone());
        Driver::new(flash, timer)
    }
}
