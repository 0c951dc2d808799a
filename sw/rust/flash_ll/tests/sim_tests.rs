#![cfg(feature = "sim")]
use flash_core::{addr, cmd, Bank, FlashError, BYTES_PER_SECTOR, SANYO_LE26FV10N1TS};
use flash_ll::sim::*;
use flash_ll::TimerState;
use flash_mock::SimConfig;

fn fast_env() -> SimEnv {
    SimEnv::with_config(SimConfig::fast())
}

#[test]
fn drv_reads_chip_id_and_leaves_id_mode() {
    let env = SimEnv::new();
    let mut drv = driver_with_env(&env);
    assert_eq!(drv.read_flash_id(), 0x09C2);
    assert!(!drv.bus().in_id_mode());
    assert_eq!(drv.bus().stats().protocol_errors, 0);
    // array data visible again
    assert_eq!(drv.read_byte(0, 0), 0xFF);

    let env = SimEnv::with_config(SimConfig { chip_id: SANYO_LE26FV10N1TS, ..SimConfig::fast() });
    let mut drv = driver_with_env(&env);
    assert_eq!(drv.read_flash_id(), 0x1362);
}

#[test]
fn drv_id_read_writes_exact_command_sequence() {
    let env = fast_env();
    let mut drv = driver_with_env(&env);
    drv.bus_mut().start_trace();
    drv.read_flash_id();

    let unlock = [(addr::UNLOCK1, cmd::UNLOCK1), (addr::UNLOCK2, cmd::UNLOCK2)];
    let mut expected = Vec::new();
    expected.extend(unlock);
    expected.push((addr::UNLOCK1, cmd::ID_ENTER));
    expected.extend(unlock);
    // exit is written twice
    expected.push((addr::UNLOCK1, cmd::ID_EXIT));
    expected.push((addr::UNLOCK1, cmd::ID_EXIT));
    assert_eq!(drv.bus_mut().take_trace(), expected);
}

#[test]
fn drv_read_sector_stops_at_sector_end() {
    let env = fast_env();
    let mut drv = driver_with_env(&env);
    drv.bus_mut().fill_sector(0, 1, 0x00);
    let mut buf = vec![0xA5u8; 70_000];
    drv.read_sector(0, &mut buf);
    assert!(buf[..BYTES_PER_SECTOR].iter().all(|&b| b == 0xFF));
    assert!(buf[BYTES_PER_SECTOR..].iter().all(|&b| b == 0xA5));
}

#[test]
fn drv_erase_of_erased_sector_completes_on_first_poll() {
    let env = SimEnv::with_config(SimConfig { erase_base_cycles: 0, ..SimConfig::fast() });
    let mut drv = driver_with_env(&env);
    drv.bus_mut().clear_stats();
    drv.erase_sector(3).unwrap();
    let st = drv.bus().stats();
    assert_eq!(st.erase_confirms, 1);
    assert_eq!(st.reads, 1);
    assert_eq!(st.protocol_errors, 0);
}

#[test]
fn drv_program_and_readback() {
    let env = fast_env();
    let mut drv = driver_with_env(&env);
    let data = [0xDEu8, 0xAD, 0xBE, 0xEF];
    for (i, &b) in data.iter().enumerate() {
        drv.program_byte(2, 0x10 + i as u16, b).unwrap();
    }
    let mut out = [0u8; 4];
    for (i, o) in out.iter_mut().enumerate() {
        *o = drv.read_byte(2, 0x10 + i as u16);
    }
    assert_eq!(out, data);
    assert_eq!(&drv.bus().sector(0, 2)[0x10..0x14], &data);
}

#[test]
fn drv_program_zero_to_one_aborts_and_resets() {
    let env = fast_env();
    let mut drv = driver_with_env(&env);
    drv.program_byte(0, 0, 0x00).unwrap();
    assert_eq!(drv.program_byte(0, 0, 0x01), Err(FlashError::ProgramAborted));
    assert_eq!(drv.bus().stats().resets, 1);
    assert!(!drv.bus().is_busy());
    // chip accepts commands again
    drv.erase_sector(0).unwrap();
    drv.program_byte(0, 0, 0x01).unwrap();
    assert_eq!(drv.read_byte(0, 0), 0x01);
    assert_eq!(drv.bus().stats().protocol_errors, 0);
}

#[test]
fn drv_injected_erase_failure_is_not_retried() {
    let env = fast_env();
    let mut drv = driver_with_env(&env);
    drv.program_byte(5, 7, 0x00).unwrap();
    drv.bus_mut().clear_stats();
    drv.bus_mut().fail_next_erases(1);
    assert_eq!(drv.erase_sector(5), Err(FlashError::EraseAborted));
    assert_eq!(drv.bus().stats().erase_confirms, 1);
    assert_eq!(drv.read_byte(5, 7), 0x00);
    drv.erase_sector(5).unwrap();
    assert_eq!(drv.read_byte(5, 7), 0xFF);
}

#[test]
fn drv_timed_erase_counts_confirm_write_and_busy_time() {
    let env = fast_env();
    let mut drv = driver_with_env(&env);
    // clean sector: 400 busy cycles + 8 for the confirm write
    assert_eq!(drv.erase_sector_timed(1), Ok(408));
    assert_eq!(drv.timer().state(), TimerState::Stopped);
}

#[test]
fn drv_timed_program_depends_on_zero_bits() {
    let env = fast_env();
    let mut drv = driver_with_env(&env);
    assert_eq!(drv.program_byte_timed(0, 0, 0xFF), Ok(48));
    assert_eq!(drv.program_byte_timed(0, 1, 0x00), Ok(80));
}

#[test]
fn drv_timer_spans_more_than_sixteen_bits() {
    let env = SimEnv::with_config(SimConfig { erase_base_cycles: 100_000, ..SimConfig::fast() });
    let mut drv = driver_with_env(&env);
    assert_eq!(drv.erase_sector_timed(0), Ok(100_008));
}

#[test]
fn drv_timed_ops_mask_interrupts_only_while_timing() {
    let env = fast_env();
    let mut drv = driver_with_env(&env);
    drv.program_byte_timed(0, 0, 0x5A).unwrap();
    assert_eq!(drv.timer().regs().interrupt_log(), &[false, true]);

    drv.bus_mut().fail_next_erases(1);
    assert_eq!(drv.erase_sector_timed(0), Err(FlashError::EraseAborted));
    assert_eq!(drv.timer().regs().interrupt_log(), &[false, true, false, true]);
    assert!(drv.timer().regs().interrupts_enabled());
}

#[test]
fn drv_bank_switch_remaps_window() {
    let env = fast_env();
    let mut drv = driver_with_env(&env);
    drv.switch_bank(Bank::Upper);
    drv.program_byte(0, 0, 0x12).unwrap();
    assert_eq!(drv.bus().sector(1, 0)[0], 0x12);
    assert_eq!(drv.bus().sector(0, 0)[0], 0xFF);

    drv.switch_bank(Bank::Lower);
    assert_eq!(drv.read_byte(0, 0), 0xFF);
    assert_eq!(drv.bus().stats().bank_switches, vec![1, 0]);
}
