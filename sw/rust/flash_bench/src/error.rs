use core::fmt;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Erase,
    Program,
    ZeroSector,
    RandomizeSector,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Erase => "sector erase",
            Operation::Program => "byte program",
            Operation::ZeroSector => "zero-sector verify",
            Operation::RandomizeSector => "randomize-sector verify",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BenchError {
    #[error("{op} on bank sector {sector} still failing after {attempts} attempts")]
    RetriesExhausted { op: Operation, sector: u8, attempts: u32 },

    #[error("sector range {start}..{end} is outside 0..32")]
    InvalidSectorRange { start: u8, end: u8 },

    #[error("{0} trials per byte overflow the sample buffer")]
    TooManyProgramTrials(u32),

    #[error("{0} erase trials per sector overflow the sample buffer")]
    TooManyEraseTrials(u32),
}

pub type BenchResult<T> = Result<T, BenchError>;
