use std::ops::Range;

use anyhow::{anyhow, bail, Result};
use clap::{ArgAction, Parser, Subcommand};
use flash_bench::config::{ERASE_TRIALS_PER_SECTOR, PROGRAM_TRIALS_PER_BYTE};
use flash_bench::sim::{new_sim, SimBench};
use flash_bench::{randomize_sector, BenchConfig, FlashSectorTiming, ReportPage, RetryPolicy, NUM_REPORT_PAGES};
use flash_core::{ChipModel, SectorIndex, BYTES_PER_SECTOR, MACRONIX_MX29L010, SANYO_LE26FV10N1TS, SECTOR_COUNT};
use flash_mock::SimConfig;
use flash_rng::Xoshiro128PlusPlus;

#[derive(Parser, Debug)]
#[command(
    name = "flash_timing",
    version,
    about = "Cartridge NOR flash erase/program timing on a simulated chip",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,

    /// Scrambler seed for random test data
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Timed erases per sector
    #[arg(long, default_value_t = ERASE_TRIALS_PER_SECTOR)]
    erase_trials: u32,
    /// Timed passes over every byte of a sector
    #[arg(long, default_value_t = PROGRAM_TRIALS_PER_BYTE)]
    program_trials: u32,
    /// Physical sectors to test, START..END
    #[arg(long, default_value = "0..32", value_parser = parse_sectors)]
    sectors: Range<u8>,
    /// Give up after this many retries of a failing operation (default: never)
    #[arg(long)]
    max_retries: Option<u32>,
    /// Simulated chip: macronix, sanyo or a raw 16-bit ID
    #[arg(long, default_value = "macronix", value_parser = parse_chip)]
    chip: u16,
    /// Use short simulated busy times
    #[arg(long)]
    fast: bool,
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the detected flash chip
    Id,
    /// Run all six batteries and print the result pages
    Run {
        /// Only print this page (0-11)
        #[arg(long)]
        page: Option<usize>,
    },
    /// Randomize one sector and dump its readback
    Pattern {
        #[arg(long)]
        sector: u8,
        #[arg(long)]
        len: Option<usize>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    run_cli(cli)
}

fn run_cli(cli: Cli) -> Result<()> {
    let mut bench = new_bench(&cli)?;
    match cli.cmd {
        Command::Id => {
            println!("{}", bench.chip());
        }
        Command::Run { page } => {
            if let Some(p) = page {
                if p >= NUM_REPORT_PAGES {
                    bail!("page must be below {}", NUM_REPORT_PAGES);
                }
            }
            let chip = bench.chip();
            println!("{}", chip);
            println!("Performing Flash Tests\n(this will take a while)");
            bench.run()?;
            log::info!("all batteries complete");
            let pages: Vec<usize> = match page {
                Some(p) => vec![p],
                None => (0..NUM_REPORT_PAGES).collect(),
            };
            for p in pages {
                let page = bench.timing().page(p).ok_or_else(|| anyhow!("no page {}", p))?;
                print_page(chip, &page);
            }
        }
        Command::Pattern { sector, len } => {
            let index = SectorIndex::new(sector).ok_or_else(|| anyhow!("sector must be below {}", SECTOR_COUNT))?;
            let len = len.unwrap_or(BYTES_PER_SECTOR).min(BYTES_PER_SECTOR);
            dump_pattern(&mut bench, index, len, cli.seed, cli.max_retries)?;
        }
    }
    Ok(())
}

fn new_bench(cli: &Cli) -> Result<SimBench> {
    let base = if cli.fast { SimConfig::fast() } else { SimConfig::default() };
    let sim = SimConfig { chip_id: cli.chip, ..base };
    let config = BenchConfig {
        erase_trials: cli.erase_trials,
        program_trials: cli.program_trials,
        sectors: cli.sectors.clone(),
        seed: cli.seed,
        retry: RetryPolicy { max_retries: cli.max_retries },
    };
    Ok(new_sim(sim, config)?)
}

fn print_page(chip: ChipModel, page: &ReportPage<'_>) {
    println!();
    println!("{}", chip);
    println!("{}", page.title());
    println!("Min Cyc|Max Cyc|Avg Cyc|Fails|");
    for row in page.rows {
        print_row(row);
    }
}

fn print_row(t: &FlashSectorTiming) {
    println!("{:7}|{:7}|{:7}|{:5}|", t.min_cycles, t.max_cycles, t.mean_cycles, t.num_failures);
}

fn dump_pattern(bench: &mut SimBench, sector: SectorIndex, len: usize, seed: u64, max_retries: Option<u32>) -> Result<()> {
    let retry = RetryPolicy { max_retries };
    let mut rng = Xoshiro128PlusPlus::from_seed_u64(seed);
    let mut pattern = vec![0u8; BYTES_PER_SECTOR];
    let drv = bench.driver_mut();
    let s = sector.in_bank();

    drv.switch_bank(sector.bank());
    retry.attempt(flash_bench::Operation::Erase, s, || Ok(drv.erase_sector(s).is_ok()))?;
    randomize_sector(drv, &mut rng, s, &mut pattern, retry)?;

    let mut readback = vec![0u8; BYTES_PER_SECTOR];
    drv.read_sector(s, &mut readback);
    if readback != pattern {
        bail!("sector {} readback does not match its pattern", sector);
    }

    println!("sector {} (bank {}, sector {}), seed {}", sector, sector.bank().number(), s, seed);
    hexdump(&readback[..len]);
    Ok(())
}

fn hexdump(data: &[u8]) {
    for (i, line) in data.chunks(16).enumerate() {
        println!("{:04X}: {}", i * 16, hex::encode_upper(line));
    }
}

fn parse_sectors(s: &str) -> std::result::Result<Range<u8>, String> {
    let (a, b) = s.split_once("..").ok_or_else(|| "expected START..END".to_string())?;
    let start: u8 = a.trim().parse().map_err(|_| format!("invalid start {:?}", a))?;
    let end: u8 = b.trim().parse().map_err(|_| format!("invalid end {:?}", b))?;
    if start > end || end as usize > SECTOR_COUNT {
        return Err(format!("range must lie within 0..{}", SECTOR_COUNT));
    }
    Ok(start..end)
}

fn parse_chip(s: &str) -> std::result::Result<u16, String> {
    match s {
        "macronix" => Ok(MACRONIX_MX29L010),
        "sanyo" => Ok(SANYO_LE26FV10N1TS),
        other => {
            let hex = other.strip_prefix("0x").unwrap_or(other);
            u16::from_str_radix(hex, 16).map_err(|_| format!("unknown chip {:?}", other))
        }
    }
}
