//! Erase/program latency characterization of the cartridge flash chip.
//!
//! [`FlashBench`] drives six test batteries across every sector of both
//! banks, timing each erase and byte program with the cycle counter and
//! reducing the samples per sector with [`save_results`].

pub mod bench;
pub mod condition;
pub mod config;
pub mod error;
pub mod stats;

pub use bench::{Battery, FlashBench, FlashTiming, ReportPage, NUM_BATTERIES, NUM_REPORT_PAGES};
pub use condition::{randomize_sector, zero_sector};
pub use config::{BenchConfig, RetryPolicy};
pub use error::{BenchError, BenchResult, Operation};
pub use stats::{save_results, FlashSectorTiming};

#[cfg(feature = "sim")]
pub mod sim {
    use super::*;
    use flash_ll::sim::{driver_with_env, SimEnv};
    use flash_mock::{SimConfig, SimFlash, SimTimer};

    pub type SimBench = FlashBench<SimFlash, SimTimer>;

    pub fn new_sim(sim: SimConfig, config: BenchConfig) -> BenchResult<SimBench> {
        let env = SimEnv::with_config(sim);
        FlashBench::new(driver_with_env(&env), config)
    }
}
