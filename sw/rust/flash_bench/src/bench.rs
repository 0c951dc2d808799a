use core::ops::{Index, IndexMut};

use flash_core::{Bank, ChipModel, FlashBus, SectorIndex, TimerRegs, BYTES_PER_SECTOR, SECTORS_PER_BANK, SECTOR_COUNT};
use flash_ll::Driver;
use flash_rng::Xoshiro128PlusPlus;

use crate::condition::{randomize_sector, zero_sector};
use crate::config::BenchConfig;
use crate::error::{BenchResult, Operation};
use crate::stats::{save_results, FlashSectorTiming};

pub const NUM_BATTERIES: usize = 6;
/// Each battery is shown as two pages, one per bank.
pub const NUM_REPORT_PAGES: usize = NUM_BATTERIES * 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Battery {
    EraseAfterFf,
    EraseAfter00,
    EraseAfterRandom,
    ProgramFf,
    Program00,
    ProgramRandom,
}

impl Battery {
    /// Execution order.
    pub const ALL: [Battery; NUM_BATTERIES] = [
        Battery::EraseAfterFf,
        Battery::EraseAfter00,
        Battery::EraseAfterRandom,
        Battery::ProgramFf,
        Battery::Program00,
        Battery::ProgramRandom,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_erase(self) -> bool {
        matches!(self, Battery::EraseAfterFf | Battery::EraseAfter00 | Battery::EraseAfterRandom)
    }

    pub fn attempts_per_sector(self, config: &BenchConfig) -> u32 {
        if self.is_erase() {
            config.erase_trials
        } else {
            config.program_attempts().unwrap_or(u32::MAX)
        }
    }

    /// Data transition measured, as shown in report titles.
    pub fn transition(self) -> &'static str {
        match self {
            Battery::EraseAfterFf => "FF->FF",
            Battery::EraseAfter00 => "00->FF",
            Battery::EraseAfterRandom => "RD->FF",
            Battery::ProgramFf => "FF",
            Battery::Program00 => "00",
            Battery::ProgramRandom => "RD",
        }
    }

    pub fn label(self) -> String {
        let verb = if self.is_erase() { "Erase" } else { "Program" };
        format!("{} {}", verb, self.transition())
    }
}

/// Per-battery, per-sector results of a full run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlashTiming {
    tables: [[FlashSectorTiming; SECTOR_COUNT]; NUM_BATTERIES],
}

impl FlashTiming {
    pub fn reset(&mut self) {
        *self = FlashTiming::default();
    }

    pub fn page(&self, page: usize) -> Option<ReportPage<'_>> {
        if page >= NUM_REPORT_PAGES {
            return None;
        }
        let battery = Battery::ALL[page >> 1];
        let bank = if page & 1 == 0 { Bank::Lower } else { Bank::Upper };
        let first = bank.number() as usize * SECTORS_PER_BANK;
        Some(ReportPage { battery, bank, rows: &self[battery][first..first + SECTORS_PER_BANK] })
    }
}

impl Index<Battery> for FlashTiming {
    type Output = [FlashSectorTiming; SECTOR_COUNT];

    fn index(&self, battery: Battery) -> &Self::Output {
        &self.tables[battery.index()]
    }
}

impl IndexMut<Battery> for FlashTiming {
    fn index_mut(&mut self, battery: Battery) -> &mut Self::Output {
        &mut self.tables[battery.index()]
    }
}

/// One screen of results: a battery's 16 sectors in one bank.
#[derive(Clone, Copy, Debug)]
pub struct ReportPage<'a> {
    pub battery: Battery,
    pub bank: Bank,
    pub rows: &'a [FlashSectorTiming],
}

impl ReportPage<'_> {
    pub fn title(&self) -> String {
        let first = self.bank.number() as usize * SECTORS_PER_BANK;
        let verb = if self.battery.is_erase() { "Erase" } else { "Program" };
        format!("{} Sectors {:02}-{:02} {}", verb, first, first + SECTORS_PER_BANK - 1, self.battery.transition())
    }
}

pub struct FlashBench<B: FlashBus, T: TimerRegs> {
    driver: Driver<B, T>,
    rng: Xoshiro128PlusPlus,
    config: BenchConfig,
    samples: Vec<u32>,
    pattern: Vec<u8>,
    timing: FlashTiming,
    flash_id: u16,
    active_bank: Option<Bank>,
}

impl<B: FlashBus, T: TimerRegs> FlashBench<B, T> {
    pub fn new(driver: Driver<B, T>, config: BenchConfig) -> BenchResult<Self> {
        config.validate()?;
        Ok(FlashBench {
            driver,
            rng: Xoshiro128PlusPlus::from_seed_u64(config.seed),
            samples: Vec::with_capacity(config.sample_capacity()),
            pattern: vec![0; BYTES_PER_SECTOR],
            config,
            timing: FlashTiming::default(),
            flash_id: 0,
            active_bank: None,
        })
    }

    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    pub fn driver(&self) -> &Driver<B, T> {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut Driver<B, T> {
        &mut self.driver
    }

    pub fn into_driver(self) -> Driver<B, T> {
        self.driver
    }

    pub fn timing(&self) -> &FlashTiming {
        &self.timing
    }

    /// Data written by the most recent conditioning or program pass.
    pub fn pattern(&self) -> &[u8] {
        &self.pattern
    }

    /// Reads the chip ID on first use and caches it. An ID of zero is never
    /// cached, so a chip that answered nothing is asked again next time.
    pub fn flash_id(&mut self) -> u16 {
        if self.flash_id == 0 {
            self.flash_id = self.driver.read_flash_id();
        }
        self.flash_id
    }

    pub fn chip(&mut self) -> ChipModel {
        ChipModel::from_id(self.flash_id())
    }

    /// Runs all six batteries in order over the configured sectors.
    pub fn run(&mut self) -> BenchResult<&FlashTiming> {
        self.timing.reset();
        for battery in Battery::ALL {
            self.run_battery(battery)?;
        }
        Ok(&self.timing)
    }

    pub fn run_battery(&mut self, battery: Battery) -> BenchResult<()> {
        self.active_bank = None;
        let max_possible = battery.attempts_per_sector(&self.config);

        for sector in self.config.sectors.clone().filter_map(SectorIndex::new) {
            self.select_bank(sector.bank());
            self.samples.clear();

            let s = sector.in_bank();
            match battery {
                Battery::EraseAfterFf => {
                    self.erase_until_done(s)?;
                    for _ in 0..self.config.erase_trials {
                        self.timed_erase(s);
                    }
                }
                Battery::EraseAfter00 => {
                    for _ in 0..self.config.erase_trials {
                        zero_sector(&mut self.driver, s, self.config.retry)?;
                        self.timed_erase(s);
                    }
                }
                Battery::EraseAfterRandom => {
                    for _ in 0..self.config.erase_trials {
                        randomize_sector(&mut self.driver, &mut self.rng, s, &mut self.pattern, self.config.retry)?;
                        self.timed_erase(s);
                    }
                }
                Battery::ProgramFf | Battery::Program00 | Battery::ProgramRandom => {
                    for _ in 0..self.config.program_trials {
                        self.erase_until_done(s)?;
                        match battery {
                            Battery::ProgramFf => self.pattern.fill(0xFF),
                            Battery::Program00 => self.pattern.fill(0x00),
                            _ => self.rng.fill_pattern(&mut self.pattern),
                        }
                        self.timed_program_pass(s);
                    }
                }
            }

            let entry = &mut self.timing[battery][sector.get() as usize];
            save_results(entry, &self.samples, max_possible);
            log::debug!(
                "{} sector {}: min {} max {} mean {} failures {}",
                battery.label(),
                sector,
                entry.min_cycles,
                entry.max_cycles,
                entry.mean_cycles,
                entry.num_failures
            );
        }

        log::info!("completed {}", battery.label());
        Ok(())
    }

    fn select_bank(&mut self, bank: Bank) {
        if self.active_bank != Some(bank) {
            self.driver.switch_bank(bank);
            self.active_bank = Some(bank);
        }
    }

    fn erase_until_done(&mut self, sector: u8) -> BenchResult<()> {
        let driver = &mut self.driver;
        self.config.retry.attempt(Operation::Erase, sector, || Ok(driver.erase_sector(sector).is_ok()))
    }

    fn timed_erase(&mut self, sector: u8) {
        if let Ok(cycles) = self.driver.erase_sector_timed(sector) {
            self.samples.push(cycles);
        }
    }

    fn timed_program_pass(&mut self, sector: u8) {
        for (offset, &value) in self.pattern.iter().enumerate() {
            if let Ok(cycles) = self.driver.program_byte_timed(sector, offset as u16, value) {
                self.samples.push(cycles);
            }
        }
    }
}
