//! vm-paging-sim - run the demand-paging simulator
//!
//! Usage: vm-paging-sim [OPTIONS] <PROCESSES> <PAGES> <FRAMES> [REF_LEN]
//!
//! Reference strings are generated from a seed unless `--refs` names a file
//! with one `<bound> <page>...` line per process.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::info;

use vm_paging_sim::constants::DEFAULT_REF_LEN;
use vm_paging_sim::io::{read_workloads, write_outcomes};
use vm_paging_sim::{SimConfig, Simulation};

#[derive(Parser)]
#[command(name = "vm-paging-sim")]
#[command(version)]
#[command(about = "Demand-paging simulator with local LRU replacement", long_about = None)]
struct Cli {
    /// Number of processes (overridden by the line count of --refs)
    processes: usize,

    /// Page table length per process
    pages: usize,

    /// Physical frames
    frames: usize,

    /// References generated per process (unused with --refs)
    #[arg(required_unless_present = "refs")]
    ref_len: Option<usize>,

    /// Seed for generated reference strings
    #[arg(long)]
    seed: Option<u64>,

    /// Probability that a generated reference is illegal
    #[arg(long, default_value_t = 0.0)]
    illegal_rate: f64,

    /// Fail when any wait exceeds this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Return a finished process's frames to the free pool
    #[arg(long)]
    reclaim: bool,

    /// Notify the scheduler about hits as well as faults
    #[arg(long)]
    notify_hits: bool,

    /// Read reference strings from a file instead of generating them
    #[arg(long, value_name = "FILE")]
    refs: Option<PathBuf>,

    /// Write raw outcome codes, one line per process
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Log more (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let workloads = cli
        .refs
        .as_ref()
        .map(|path| {
            read_workloads(path)
                .with_context(|| format!("failed to load references from {}", path.display()))
        })
        .transpose()?;
    let processes = workloads.as_ref().map_or(cli.processes, Vec::len);

    let config = build_config(&cli, processes).context("invalid configuration")?;

    let sim = match workloads {
        Some(workloads) => Simulation::new(config, workloads)?,
        None => Simulation::generated(config)?,
    };
    let report = sim.run().context("simulation failed")?;

    println!("{}", report);

    if let Some(path) = &cli.output {
        write_outcomes(path, &report.workload_reports())?;
        info!("[MASTER] outcomes written to {}", path.display());
    }

    Ok(())
}

fn build_config(cli: &Cli, processes: usize) -> anyhow::Result<SimConfig> {
    let mut config = SimConfig::new(processes, cli.pages, cli.frames)?
        .with_ref_len(cli.ref_len.unwrap_or(DEFAULT_REF_LEN))
        .with_illegal_rate(cli.illegal_rate)?
        .with_reclaim_on_exit(cli.reclaim)
        .with_notify_hits(cli.notify_hits);
    if let Some(seed) = cli.seed {
        config = config.with_seed(seed);
    }
    if let Some(ms) = cli.timeout_ms {
        config = config.with_timeout(Duration::from_millis(ms))?;
    }
    Ok(config)
}
