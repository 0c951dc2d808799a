#![cfg(feature = "sim")]
use flash_bench::sim::*;
use flash_bench::*;
use flash_core::BYTES_PER_SECTOR;
use flash_ll::sim::{driver_with_env, SimEnv};
use flash_mock::SimConfig;
use flash_rng::Xoshiro128PlusPlus;

fn quick(sectors: std::ops::Range<u8>) -> BenchConfig {
    BenchConfig { erase_trials: 2, program_trials: 1, sectors, ..BenchConfig::default() }
}

#[test]
fn bank_switches_once_per_bank_per_battery() {
    let cfg = BenchConfig { erase_trials: 1, ..BenchConfig::default() };
    let mut bench = new_sim(SimConfig::fast(), cfg).unwrap();
    bench.run_battery(Battery::EraseAfterFf).unwrap();
    assert_eq!(bench.driver().bus().stats().bank_switches, vec![0, 1]);

    bench.run_battery(Battery::EraseAfterFf).unwrap();
    assert_eq!(bench.driver().bus().stats().bank_switches, vec![0, 1, 0, 1]);
}

#[test]
fn no_redundant_switch_within_one_bank() {
    let cfg = BenchConfig { erase_trials: 1, sectors: 0..4, ..BenchConfig::default() };
    let mut bench = new_sim(SimConfig::fast(), cfg).unwrap();
    bench.run_battery(Battery::EraseAfterFf).unwrap();
    assert_eq!(bench.driver().bus().stats().bank_switches, vec![0]);
}

#[test]
fn full_run_fills_tested_sectors_only() {
    let mut bench = new_sim(SimConfig::fast(), quick(15..17)).unwrap();
    let timing = bench.run().unwrap().clone();

    let exact = |t: &FlashSectorTiming, cycles: u32| {
        assert_eq!(*t, FlashSectorTiming { min_cycles: cycles, max_cycles: cycles, mean_cycles: cycles, num_failures: 0 });
    };
    for s in [15usize, 16] {
        exact(&timing[Battery::EraseAfterFf][s], 408);
        exact(&timing[Battery::EraseAfter00][s], 4504);
        exact(&timing[Battery::ProgramFf][s], 48);
        exact(&timing[Battery::Program00][s], 80);

        let t = timing[Battery::EraseAfterRandom][s];
        assert_eq!(t.num_failures, 0);
        assert!(408 < t.min_cycles && t.max_cycles <= 4504);

        let t = timing[Battery::ProgramRandom][s];
        assert_eq!(t.num_failures, 0);
        assert!(48 <= t.min_cycles && t.min_cycles <= t.mean_cycles && t.mean_cycles <= t.max_cycles);
        assert!(t.max_cycles <= 80);
    }
    for battery in Battery::ALL {
        assert_eq!(timing[battery][14], FlashSectorTiming::default());
        assert_eq!(timing[battery][17], FlashSectorTiming::default());
    }

    let bus = bench.driver().bus();
    assert_eq!(bus.stats().protocol_errors, 0);
    assert!(bench.driver().timer().regs().interrupts_enabled());
    // sector 16 is bank 1 sector 0 and was programmed last
    assert_eq!(bus.sector(1, 0), bench.pattern());
}

#[test]
fn failed_timed_programs_are_counted_not_sampled() {
    let cfg = BenchConfig { program_trials: 1, sectors: 0..1, ..BenchConfig::default() };
    let mut bench = new_sim(SimConfig::fast(), cfg).unwrap();
    bench.driver_mut().bus_mut().fail_next_programs(4);
    bench.run_battery(Battery::ProgramFf).unwrap();

    let t = bench.timing()[Battery::ProgramFf][0];
    assert_eq!(t, FlashSectorTiming { min_cycles: 48, max_cycles: 48, mean_cycles: 48, num_failures: 4 });
    assert_eq!(t.successes(BYTES_PER_SECTOR as u32), BYTES_PER_SECTOR as u32 - 4);
}

#[test]
fn failed_timed_erases_are_counted_not_sampled() {
    let cfg = BenchConfig { erase_trials: 3, sectors: 2..3, ..BenchConfig::default() };
    let mut bench = new_sim(SimConfig::fast(), cfg).unwrap();
    bench.driver_mut().bus_mut().fail_next_erases(2);
    bench.run_battery(Battery::EraseAfter00).unwrap();

    let t = bench.timing()[Battery::EraseAfter00][2];
    assert_eq!(t, FlashSectorTiming { min_cycles: 4504, max_cycles: 4504, mean_cycles: 4504, num_failures: 2 });
}

#[test]
fn every_timed_erase_failing_degrades_to_zero_stats() {
    let cfg = BenchConfig { erase_trials: 4, sectors: 0..1, ..BenchConfig::default() };
    let mut bench = new_sim(SimConfig::fast(), cfg).unwrap();
    bench.driver_mut().bus_mut().fail_next_erases(4);
    bench.run_battery(Battery::EraseAfter00).unwrap();

    let t = bench.timing()[Battery::EraseAfter00][0];
    assert_eq!(t, FlashSectorTiming { min_cycles: 0, max_cycles: 0, mean_cycles: 0, num_failures: 4 });
}

#[test]
fn gate_erase_retries_until_success() {
    let cfg = BenchConfig { erase_trials: 4, sectors: 0..1, ..BenchConfig::default() };
    let mut bench = new_sim(SimConfig::fast(), cfg).unwrap();
    bench.driver_mut().bus_mut().fail_next_erases(3);
    bench.run_battery(Battery::EraseAfterFf).unwrap();

    assert_eq!(bench.timing()[Battery::EraseAfterFf][0].num_failures, 0);
    // three aborted gate erases, one good one, four timed
    assert_eq!(bench.driver().bus().stats().erase_confirms, 8);
}

#[test]
fn bounded_retry_surfaces_instead_of_hanging() {
    let cfg = BenchConfig { retry: RetryPolicy::bounded(3), sectors: 0..1, ..BenchConfig::default() };
    let mut bench = new_sim(SimConfig::fast(), cfg).unwrap();
    bench.driver_mut().bus_mut().fail_next_erases(10);
    let err = bench.run_battery(Battery::EraseAfterFf).unwrap_err();
    assert_eq!(err, BenchError::RetriesExhausted { op: Operation::Erase, sector: 0, attempts: 4 });
}

#[test]
fn zero_sector_retries_bytes_and_verifies() {
    let env = SimEnv::with_config(SimConfig::fast());
    let mut drv = driver_with_env(&env);
    drv.bus_mut().fail_next_programs(3);
    zero_sector(&mut drv, 4, RetryPolicy::UNBOUNDED).unwrap();

    let st = drv.bus().stats();
    assert_eq!(st.programs, BYTES_PER_SECTOR as u64 + 3);
    assert_eq!(st.resets, 3);
    assert!(drv.bus().sector(0, 4).iter().all(|&b| b == 0));
}

#[test]
fn zero_sector_repeats_pass_after_silent_failure() {
    let env = SimEnv::with_config(SimConfig::fast());
    let mut drv = driver_with_env(&env);
    drv.bus_mut().silent_next_programs(5);
    zero_sector(&mut drv, 1, RetryPolicy::UNBOUNDED).unwrap();

    assert_eq!(drv.bus().stats().programs, 2 * BYTES_PER_SECTOR as u64);
    assert!(drv.bus().sector(0, 1).iter().all(|&b| b == 0));
}

#[test]
fn zero_sector_gives_up_with_bounded_retry() {
    let env = SimEnv::with_config(SimConfig::fast());
    let mut drv = driver_with_env(&env);
    drv.bus_mut().fail_next_programs(100);
    let err = zero_sector(&mut drv, 9, RetryPolicy::bounded(2)).unwrap_err();
    assert_eq!(err, BenchError::RetriesExhausted { op: Operation::Program, sector: 9, attempts: 3 });
}

#[test]
fn randomize_sector_round_trips_pattern() {
    let env = SimEnv::with_config(SimConfig::fast());
    let mut drv = driver_with_env(&env);
    let mut rng = Xoshiro128PlusPlus::from_seed_u64(99);
    let mut pattern = vec![0u8; BYTES_PER_SECTOR];
    drv.bus_mut().silent_next_programs(5);
    randomize_sector(&mut drv, &mut rng, 6, &mut pattern, RetryPolicy::UNBOUNDED).unwrap();

    let mut readback = vec![0u8; BYTES_PER_SECTOR];
    drv.read_sector(6, &mut readback);
    assert_eq!(readback, pattern);

    let mut expected = vec![0u8; BYTES_PER_SECTOR];
    Xoshiro128PlusPlus::from_seed_u64(99).fill_pattern(&mut expected);
    assert_eq!(pattern, expected);
}

#[test]
fn same_seed_reproduces_random_battery() {
    let cfg = BenchConfig { program_trials: 1, sectors: 3..4, seed: 1234, ..BenchConfig::default() };
    let mut a = new_sim(SimConfig::fast(), cfg.clone()).unwrap();
    let mut b = new_sim(SimConfig::fast(), cfg.clone()).unwrap();
    a.run_battery(Battery::ProgramRandom).unwrap();
    b.run_battery(Battery::ProgramRandom).unwrap();
    assert_eq!(a.timing(), b.timing());
    assert_eq!(a.pattern(), b.pattern());

    let mut c = new_sim(SimConfig::fast(), BenchConfig { seed: 4321, ..cfg }).unwrap();
    c.run_battery(Battery::ProgramRandom).unwrap();
    assert_ne!(a.pattern(), c.pattern());
}

#[test]
fn flash_id_is_read_once() {
    let mut bench = new_sim(SimConfig::fast(), BenchConfig::default()).unwrap();
    assert_eq!(bench.flash_id(), 0x09C2);
    assert_eq!(bench.flash_id(), 0x09C2);
    assert_eq!(bench.driver().bus().stats().id_reads, 1);
    assert_eq!(bench.chip().to_string(), "Flash Chip: Macronix MX29L010");
}

#[test]
fn invalid_config_is_rejected() {
    let cfg = BenchConfig { sectors: 0..40, ..BenchConfig::default() };
    assert!(matches!(new_sim(SimConfig::fast(), cfg), Err(BenchError::InvalidSectorRange { .. })));
}

#[test]
fn oversized_trials_are_rejected_before_allocating() {
    let cfg = BenchConfig { program_trials: 1_000_000, sectors: 0..0, ..BenchConfig::default() };
    assert_eq!(new_sim(SimConfig::fast(), cfg).err(), Some(BenchError::TooManyProgramTrials(1_000_000)));

    let cfg = BenchConfig { erase_trials: 4_000_000_000, sectors: 0..0, ..BenchConfig::default() };
    assert_eq!(new_sim(SimConfig::fast(), cfg).err(), Some(BenchError::TooManyEraseTrials(4_000_000_000)));
}
