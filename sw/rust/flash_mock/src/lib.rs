use std::cell::Cell;
use std::rc::Rc;

use flash_core::{
    addr, cmd, FlashBus, TimerId, TimerRegs, BANK_COUNT, BANK_SIZE, BYTES_PER_SECTOR, ERASED, MACRONIX_MX29L010,
    SECTOR_SHIFT, STATUS_FAILED, TIMER_CASCADE, TIMER_START,
};

/// Cycle counter shared by everything on the simulated cartridge bus.
#[derive(Clone, Debug, Default)]
pub struct SimClock(Rc<Cell<u64>>);

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.0.get()
    }

    pub fn advance(&self, cycles: u64) {
        self.0.set(self.0.get() + cycles);
    }
}

#[derive(Clone, Debug)]
pub struct SimConfig {
    pub chip_id: u16,
    pub read_cycles: u64,
    pub write_cycles: u64,
    pub erase_base_cycles: u64,
    /// Extra erase time for every byte in the sector that is not 0xFF.
    pub erase_cycles_per_dirty_byte: u64,
    pub program_base_cycles: u64,
    /// Extra program time for every 0 bit in the value written.
    pub program_cycles_per_zero_bit: u64,
    /// Upper bound of pseudo-random extra cycles added to each operation.
    pub jitter_cycles: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            chip_id: MACRONIX_MX29L010,
            read_cycles: 8,
            write_cycles: 8,
            erase_base_cycles: 60_000,
            erase_cycles_per_dirty_byte: 40,
            program_base_cycles: 300,
            program_cycles_per_zero_bit: 30,
            jitter_cycles: 16,
        }
    }
}

impl SimConfig {
    /// Zero-jitter timings small enough for exhaustive tests.
    pub fn fast() -> Self {
        SimConfig {
            erase_base_cycles: 400,
            erase_cycles_per_dirty_byte: 1,
            program_base_cycles: 40,
            program_cycles_per_zero_bit: 4,
            jitter_cycles: 0,
            ..SimConfig::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimStats {
    pub reads: u64,
    pub writes: u64,
    pub erase_confirms: u64,
    pub programs: u64,
    /// Bank numbers in the order they were selected.
    pub bank_switches: Vec<u8>,
    pub id_reads: u64,
    pub protocol_errors: u64,
    pub resets: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Seq {
    Idle,
    Unlock1,
    Unlock2,
    EraseSetup,
    EraseUnlock1,
    EraseUnlock2,
    BankSelect,
    Program,
}

#[derive(Clone, Copy, Debug)]
enum OpKind {
    Erase { base: usize },
    Program { index: usize, value: u8 },
}

#[derive(Clone, Copy, Debug)]
struct Busy {
    kind: OpKind,
    done_at: u64,
    fails: bool,
    silent: bool,
}

impl Busy {
    /// Data-polling status: bit 7 inverted from the target, bit 6 toggling.
    fn status(&self, toggle: bool) -> u8 {
        let target = match self.kind {
            OpKind::Erase { .. } => ERASED,
            OpKind::Program { value, .. } => value,
        };
        (!target & 0x80) | if toggle { 0x40 } else { 0 }
    }
}

/// Behavioural model of a two-bank 1 Mbit NOR chip behind the cartridge bus.
pub struct SimFlash {
    clock: SimClock,
    cfg: SimConfig,
    mem: Vec<u8>,
    seq: Seq,
    id_mode: bool,
    bank: usize,
    busy: Option<Busy>,
    failed: Option<Busy>,
    ghost: Option<(usize, u8)>,
    toggle: bool,
    jitter_state: u32,
    fail_erases: u32,
    fail_programs: u32,
    silent_programs: u32,
    trace: Option<Vec<(u32, u8)>>,
    stats: SimStats,
}

impl SimFlash {
    pub fn new(clock: SimClock, cfg: SimConfig) -> Self {
        SimFlash {
            clock,
            cfg,
            mem: vec![ERASED; BANK_COUNT * BANK_SIZE],
            seq: Seq::Idle,
            id_mode: false,
            bank: 0,
            busy: None,
            failed: None,
            ghost: None,
            toggle: false,
            jitter_state: 0x2545_F491,
            fail_erases: 0,
            fail_programs: 0,
            silent_programs: 0,
            trace: None,
            stats: SimStats::default(),
        }
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    pub fn clear_stats(&mut self) {
        self.stats = SimStats::default();
    }

    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    pub fn active_bank(&self) -> u8 {
        self.bank as u8
    }

    pub fn in_id_mode(&self) -> bool {
        self.id_mode
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    /// The next `n` sector erases end with status bit 5.
    pub fn fail_next_erases(&mut self, n: u32) {
        self.fail_erases = n;
    }

    /// The next `n` byte programs end with status bit 5.
    pub fn fail_next_programs(&mut self, n: u32) {
        self.fail_programs = n;
    }

    /// The next `n` byte programs pass their completion poll but leave the
    /// cell untouched.
    pub fn silent_next_programs(&mut self, n: u32) {
        self.silent_programs = n;
    }

    /// Starts recording every bus write as `(offset, data)`.
    pub fn start_trace(&mut self) {
        self.trace = Some(Vec::new());
    }

    /// Writes recorded since [`SimFlash::start_trace`]; recording stops.
    pub fn take_trace(&mut self) -> Vec<(u32, u8)> {
        self.trace.take().unwrap_or_default()
    }

    /// Raw view of one sector, bypassing the command interface.
    pub fn sector(&self, bank: u8, sector: u8) -> &[u8] {
        let base = bank as usize * BANK_SIZE + ((sector as usize) << SECTOR_SHIFT);
        &self.mem[base..base + BYTES_PER_SECTOR]
    }

    pub fn fill_sector(&mut self, bank: u8, sector: u8, value: u8) {
        let base = bank as usize * BANK_SIZE + ((sector as usize) << SECTOR_SHIFT);
        self.mem[base..base + BYTES_PER_SECTOR].fill(value);
    }

    fn jitter(&mut self) -> u64 {
        if self.cfg.jitter_cycles == 0 {
            return 0;
        }
        let mut x = self.jitter_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.jitter_state = x;
        x as u64 % (self.cfg.jitter_cycles + 1)
    }

    fn index(&self, offset: u32) -> usize {
        self.bank * BANK_SIZE + (offset as usize & (BANK_SIZE - 1))
    }

    fn protocol_error(&mut self, offset: u32, data: u8) {
        log::warn!("sim flash: unexpected write {:02X}@{:04X} in {:?}", data, offset, self.seq);
        self.stats.protocol_errors += 1;
        self.seq = Seq::Idle;
    }

    fn reset(&mut self) {
        if self.busy.is_some() || self.failed.is_some() {
            self.stats.resets += 1;
        }
        self.busy = None;
        self.failed = None;
        self.id_mode = false;
        self.seq = Seq::Idle;
    }

    /// Retires the running operation once its time has elapsed.
    fn settle(&mut self) {
        let Some(op) = self.busy else { return };
        if self.clock.now() < op.done_at {
            return;
        }
        self.busy = None;
        if op.fails {
            self.failed = Some(op);
            return;
        }
        match op.kind {
            OpKind::Erase { base } => self.mem[base..base + BYTES_PER_SECTOR].fill(ERASED),
            OpKind::Program { index, value } => {
                if op.silent {
                    self.ghost = Some((index, value));
                } else {
                    self.mem[index] &= value;
                }
            }
        }
    }

    fn start_erase(&mut self, offset: u32) {
        let sector = (offset as usize & (BANK_SIZE - 1)) >> SECTOR_SHIFT;
        let base = self.bank * BANK_SIZE + (sector << SECTOR_SHIFT);
        let dirty = self.mem[base..base + BYTES_PER_SECTOR].iter().filter(|&&b| b != ERASED).count() as u64;
        let duration = self.cfg.erase_base_cycles + dirty * self.cfg.erase_cycles_per_dirty_byte + self.jitter();
        let fails = self.fail_erases > 0;
        self.fail_erases = self.fail_erases.saturating_sub(1);
        self.stats.erase_confirms += 1;
        self.busy = Some(Busy { kind: OpKind::Erase { base }, done_at: self.clock.now() + duration, fails, silent: false });
    }

    fn start_program(&mut self, offset: u32, value: u8) {
        let index = self.index(offset);
        let duration =
            self.cfg.program_base_cycles + value.count_zeros() as u64 * self.cfg.program_cycles_per_zero_bit + self.jitter();
        // a 0 cannot be programmed back to 1 without an erase
        let unreachable = self.mem[index] & value != value;
        let fails = self.fail_programs > 0 || unreachable;
        self.fail_programs = self.fail_programs.saturating_sub(1);
        let silent = !fails && self.silent_programs > 0;
        if silent {
            self.silent_programs -= 1;
        }
        if unreachable {
            self.mem[index] &= value;
        }
        self.stats.programs += 1;
        self.busy = Some(Busy { kind: OpKind::Program { index, value }, done_at: self.clock.now() + duration, fails, silent });
    }
}

impl FlashBus for SimFlash {
    fn issue(&mut self, offset: u32, data: u8) {
        self.clock.advance(self.cfg.write_cycles);
        self.stats.writes += 1;
        let offset = offset & (BANK_SIZE as u32 - 1);
        if let Some(trace) = self.trace.as_mut() {
            trace.push((offset, data));
        }
        self.settle();

        if self.busy.is_some() || self.failed.is_some() {
            if data == cmd::RESET {
                self.reset();
            } else {
                self.protocol_error(offset, data);
            }
            return;
        }

        self.seq = match (self.seq, offset, data) {
            (Seq::Idle, addr::UNLOCK1, cmd::UNLOCK1) => Seq::Unlock1,
            (Seq::Idle, _, cmd::RESET) => {
                self.reset();
                Seq::Idle
            }
            (Seq::Unlock1, addr::UNLOCK2, cmd::UNLOCK2) => Seq::Unlock2,
            (Seq::Unlock2, addr::UNLOCK1, cmd::ID_ENTER) => {
                self.id_mode = true;
                self.stats.id_reads += 1;
                Seq::Idle
            }
            (Seq::Unlock2, addr::UNLOCK1, cmd::ID_EXIT) => {
                self.id_mode = false;
                Seq::Idle
            }
            (Seq::Unlock2, addr::UNLOCK1, cmd::BANK_SWITCH) => Seq::BankSelect,
            (Seq::Unlock2, addr::UNLOCK1, cmd::ERASE_SETUP) => Seq::EraseSetup,
            (Seq::Unlock2, addr::UNLOCK1, cmd::BYTE_PROGRAM) => Seq::Program,
            (Seq::EraseSetup, addr::UNLOCK1, cmd::UNLOCK1) => Seq::EraseUnlock1,
            (Seq::EraseUnlock1, addr::UNLOCK2, cmd::UNLOCK2) => Seq::EraseUnlock2,
            (Seq::EraseUnlock2, _, cmd::SECTOR_ERASE) => {
                self.start_erase(offset);
                Seq::Idle
            }
            (Seq::BankSelect, addr::BANK_SELECT, bank) if (bank as usize) < BANK_COUNT => {
                self.bank = bank as usize;
                self.stats.bank_switches.push(bank);
                Seq::Idle
            }
            (Seq::Program, _, value) => {
                self.start_program(offset, value);
                Seq::Idle
            }
            _ => {
                self.protocol_error(offset, data);
                Seq::Idle
            }
        };
    }

    fn read(&mut self, offset: u32) -> u8 {
        self.clock.advance(self.cfg.read_cycles);
        self.stats.reads += 1;
        let offset = offset & (BANK_SIZE as u32 - 1);
        self.settle();

        if let Some(op) = self.busy {
            self.toggle = !self.toggle;
            return op.status(self.toggle);
        }
        if let Some(op) = self.failed {
            self.toggle = !self.toggle;
            return op.status(self.toggle) | STATUS_FAILED;
        }

        let index = self.index(offset);
        if let Some((ghost, value)) = self.ghost.take() {
            if ghost == index {
                return value;
            }
        }
        if self.id_mode {
            match offset {
                addr::ID_MANUFACTURER => return self.cfg.chip_id as u8,
                addr::ID_DEVICE => return (self.cfg.chip_id >> 8) as u8,
                _ => {}
            }
        }
        self.mem[index]
    }
}

/// Two chained 16-bit timers driven by the shared [`SimClock`]. The high
/// timer in cascade mode counts overflows of the low one.
pub struct SimTimer {
    clock: SimClock,
    control: [u16; 2],
    reload: [u16; 2],
    low_started_at: Option<u64>,
    low_base: u64,
    low_frozen: u64,
    high_base: u16,
    high_frozen: u16,
    interrupts: bool,
    interrupt_log: Vec<bool>,
}

impl SimTimer {
    pub fn new(clock: SimClock) -> Self {
        SimTimer {
            clock,
            control: [0; 2],
            reload: [0; 2],
            low_started_at: None,
            low_base: 0,
            low_frozen: 0,
            high_base: 0,
            high_frozen: 0,
            interrupts: true,
            interrupt_log: Vec::new(),
        }
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts
    }

    /// Every value written to the interrupt master enable, in order.
    pub fn interrupt_log(&self) -> &[bool] {
        &self.interrupt_log
    }

    pub fn is_running(&self, timer: TimerId) -> bool {
        self.control[slot(timer)] & TIMER_START != 0
    }

    /// Ticks counted by the low timer since it was last started.
    fn low_total(&self) -> u64 {
        match self.low_started_at {
            Some(t0) => self.low_base + (self.clock.now() - t0),
            None => self.low_frozen,
        }
    }

    fn high_count(&self) -> u16 {
        let ctl = self.control[1];
        if ctl & TIMER_START == 0 {
            return self.high_frozen;
        }
        if ctl & TIMER_CASCADE != 0 {
            self.high_base.wrapping_add((self.low_total() >> 16) as u16)
        } else {
            self.high_frozen
        }
    }
}

fn slot(timer: TimerId) -> usize {
    match timer {
        TimerId::Low => 0,
        TimerId::High => 1,
    }
}

impl TimerRegs for SimTimer {
    fn write_control(&mut self, timer: TimerId, value: u16) {
        let was_running = self.is_running(timer);
        let starting = value & TIMER_START != 0;
        match timer {
            TimerId::Low => {
                if starting && !was_running {
                    self.low_started_at = Some(self.clock.now());
                    self.low_base = self.reload[0] as u64;
                } else if !starting && was_running {
                    self.low_frozen = self.low_total();
                    self.low_started_at = None;
                }
            }
            TimerId::High => {
                if starting && !was_running {
                    self.high_base = self.reload[1];
                } else if !starting && was_running {
                    self.high_frozen = self.high_count();
                }
            }
        }
        self.control[slot(timer)] = value;
    }

    fn write_reload(&mut self, timer: TimerId, value: u16) {
        self.reload[slot(timer)] = value;
        // a stopped counter shows its reload value once rewritten
        if !self.is_running(timer) {
            match timer {
                TimerId::Low => self.low_frozen = value as u64,
                TimerId::High => self.high_frozen = value,
            }
        }
    }

    fn read_count(&mut self, timer: TimerId) -> u16 {
        match timer {
            TimerId::Low => self.low_total() as u16,
            TimerId::High => self.high_count(),
        }
    }

    fn set_interrupt_master(&mut self, enabled: bool) {
        self.interrupts = enabled;
        self.interrupt_log.push(enabled);
    }
}
