//! Bring a sector into a known state before an erase is timed.
//!
//! Both helpers program byte by byte, retrying each byte until the chip
//! accepts it, then read the whole sector back. The single-byte completion
//! poll does not catch every bad cell, so a failed readback repeats the pass.

use flash_core::{FlashBus, TimerRegs, BYTES_PER_SECTOR};
use flash_ll::Driver;
use flash_rng::Xoshiro128PlusPlus;

use crate::config::RetryPolicy;
use crate::error::{BenchResult, Operation};

fn program_with_retry<B: FlashBus, T: TimerRegs>(
    drv: &mut Driver<B, T>,
    retry: RetryPolicy,
    sector: u8,
    offset: u16,
    value: u8,
) -> BenchResult<()> {
    retry.attempt(Operation::Program, sector, || Ok(drv.program_byte(sector, offset, value).is_ok()))
}

pub fn zero_sector<B: FlashBus, T: TimerRegs>(drv: &mut Driver<B, T>, sector: u8, retry: RetryPolicy) -> BenchResult<()> {
    retry.attempt(Operation::ZeroSector, sector, || {
        for offset in 0..BYTES_PER_SECTOR as u16 {
            program_with_retry(drv, retry, sector, offset, 0x00)?;
        }

        let mut check = 0u8;
        for offset in 0..BYTES_PER_SECTOR as u16 {
            check |= drv.read_byte(sector, offset);
        }
        Ok(check == 0)
    })
}

/// Fills `pattern` with one fresh draw per byte and programs it. A repeated
/// pass reprograms the same pattern.
pub fn randomize_sector<B: FlashBus, T: TimerRegs>(
    drv: &mut Driver<B, T>,
    rng: &mut Xoshiro128PlusPlus,
    sector: u8,
    pattern: &mut [u8],
    retry: RetryPolicy,
) -> BenchResult<()> {
    debug_assert_eq!(pattern.len(), BYTES_PER_SECTOR);
    rng.fill_pattern(pattern);
    let pattern = &*pattern;

    retry.attempt(Operation::RandomizeSector, sector, || {
        for (offset, &value) in pattern.iter().enumerate() {
            program_with_retry(drv, retry, sector, offset as u16, value)?;
        }

        let matching = pattern
            .iter()
            .enumerate()
            .filter(|&(offset, &value)| drv.read_byte(sector, offset as u16) == value)
            .count();
        if matching < BYTES_PER_SECTOR {
            log::debug!("sector {}: {} of {} random bytes verified, reprogramming", sector, matching, BYTES_PER_SECTOR);
        }
        Ok(matching == BYTES_PER_SECTOR)
    })
}
