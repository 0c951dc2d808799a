use core::ops::Range;

use flash_core::{BYTES_PER_SECTOR, SECTOR_COUNT};

use crate::error::{BenchError, BenchResult, Operation};

pub const ERASE_TRIALS_PER_SECTOR: u32 = 10;
pub const PROGRAM_TRIALS_PER_BYTE: u32 = 10;
/// Largest number of samples one sector may record under any battery. Sets
/// the ceiling of the preallocated sample buffer (4 MiB).
pub const MAX_SAMPLES_PER_SECTOR: u32 = 1 << 20;

/// How often a failing erase, program or verification pass is repeated.
///
/// `max_retries: None` repeats forever: a chip that never completes stalls
/// the run instead of producing partial statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: Option<u32>,
}

impl RetryPolicy {
    pub const UNBOUNDED: RetryPolicy = RetryPolicy { max_retries: None };

    pub fn bounded(max_retries: u32) -> Self {
        RetryPolicy { max_retries: Some(max_retries) }
    }

    /// Runs `f` until it reports success or the retry budget is spent.
    pub fn attempt<F>(&self, op: Operation, sector: u8, mut f: F) -> BenchResult<()>
    where
        F: FnMut() -> BenchResult<bool>,
    {
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            if f()? {
                return Ok(());
            }
            if let Some(max) = self.max_retries {
                if attempts > max {
                    log::debug!("{} on sector {} gave up after {} attempts", op, sector, attempts);
                    return Err(BenchError::RetriesExhausted { op, sector, attempts });
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BenchConfig {
    pub erase_trials: u32,
    /// Passes over the whole sector; each pass times every byte.
    pub program_trials: u32,
    /// Physical sectors to test, 0..32 for a full run.
    pub sectors: Range<u8>,
    /// Scrambler seed for the random data pattern.
    pub seed: u64,
    pub retry: RetryPolicy,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            erase_trials: ERASE_TRIALS_PER_SECTOR,
            program_trials: PROGRAM_TRIALS_PER_BYTE,
            sectors: 0..SECTOR_COUNT as u8,
            seed: 0,
            retry: RetryPolicy::UNBOUNDED,
        }
    }
}

impl BenchConfig {
    pub fn validate(&self) -> BenchResult<()> {
        if self.sectors.start > self.sectors.end || self.sectors.end as usize > SECTOR_COUNT {
            return Err(BenchError::InvalidSectorRange { start: self.sectors.start, end: self.sectors.end });
        }
        if self.erase_trials > MAX_SAMPLES_PER_SECTOR {
            return Err(BenchError::TooManyEraseTrials(self.erase_trials));
        }
        match self.program_attempts() {
            Some(n) if n <= MAX_SAMPLES_PER_SECTOR => {}
            _ => return Err(BenchError::TooManyProgramTrials(self.program_trials)),
        }
        Ok(())
    }

    pub fn program_attempts(&self) -> Option<u32> {
        self.program_trials.checked_mul(BYTES_PER_SECTOR as u32)
    }

    /// Scratch buffer size: whichever battery kind records more samples per
    /// sector.
    pub fn sample_capacity(&self) -> usize {
        let program = self.program_attempts().unwrap_or(u32::MAX);
        self.erase_trials.max(program) as usize
    }
}
