//! Wires the MMU, the scheduler and the workloads together and runs them to
//! completion on their own threads.

use std::fmt;
use std::thread::{self, ScopedJoinHandle};

use crossbeam::channel::unbounded;
use log::{error, info};

use crate::config::SimConfig;
use crate::error::{ConfigError, Result, SimError};
use crate::generator::ReferenceGenerator;
use crate::mmu::{Engine, ProcessStats, ResidentPage};
use crate::protocol::{Notification, Registration, Request};
use crate::scheduler::Scheduler;
use crate::workload::{Workload, WorkloadReport, WorkloadSpec};

pub struct Simulation {
    config: SimConfig,
    workloads: Vec<WorkloadSpec>,
    seed: Option<u64>,
}

impl Simulation {
    /// Run `workloads` under `config`. Workload `i` must carry pid `i`.
    pub fn new(config: SimConfig, workloads: Vec<WorkloadSpec>) -> Result<Self> {
        config.validate()?;
        if workloads.len() != config.processes {
            return Err(ConfigError::WorkloadCount {
                expected: config.processes,
                got: workloads.len(),
            }
            .into());
        }
        if let Some((index, w)) = workloads.iter().enumerate().find(|(i, w)| w.pid != *i) {
            return Err(ConfigError::WorkloadPid { index, pid: w.pid }.into());
        }
        Ok(Simulation {
            config,
            workloads,
            seed: None,
        })
    }

    /// Random reference strings drawn from the configured seed
    pub fn generated(config: SimConfig) -> Result<Self> {
        config.validate()?;
        let mut generator = ReferenceGenerator::new(config.seed);
        info!("[MASTER] reference seed {}", generator.seed());
        let workloads = generator.generate(&config);
        let mut sim = Self::new(config, workloads)?;
        sim.seed = Some(generator.seed());
        Ok(sim)
    }

    pub fn workloads(&self) -> &[WorkloadSpec] {
        &self.workloads
    }

    pub fn run(self) -> Result<SimulationReport> {
        let Simulation {
            config,
            workloads,
            seed,
        } = self;
        info!(
            "[MASTER] starting: k={} m={} f={}",
            config.processes, config.pages, config.frames
        );

        let engine = Engine::new(&config)?;
        let scheduler = Scheduler::new(config.processes, config.timeout);
        let bounds: Vec<i64> = workloads.iter().map(|w| w.bound).collect();

        let (req_tx, req_rx) = unbounded::<Request>();
        let (note_tx, note_rx) = unbounded::<Notification>();
        let (reg_tx, reg_rx) = unbounded::<Registration>();

        // Every channel end moves into the scope closure, so an early return
        // drops them and lets already running threads see a disconnect.
        let (mmu, sched, reports) = thread::scope(move |s| {
            let mmu = thread::Builder::new()
                .name("mmu".into())
                .spawn_scoped(s, move || engine.run(&req_rx, &note_tx))
                .map_err(SimError::Spawn)?;
            let sched = thread::Builder::new()
                .name("scheduler".into())
                .spawn_scoped(s, move || scheduler.run(&reg_rx, &note_rx))
                .map_err(SimError::Spawn)?;

            // Registration happens here, in pid order, so admission order is
            // deterministic.
            let mut procs = Vec::with_capacity(workloads.len());
            for spec in workloads {
                let workload = Workload::new(spec, config.timeout);
                let name = format!("proc-{}", workload.pid());
                let admission = workload.register(&reg_tx)?;
                let req_tx = req_tx.clone();
                let handle = thread::Builder::new()
                    .name(name)
                    .spawn_scoped(s, move || workload.run(admission, &req_tx))
                    .map_err(SimError::Spawn)?;
                procs.push(handle);
            }
            drop((reg_tx, req_tx));

            let mmu = join("mmu", mmu);
            let sched = join("scheduler", sched);
            let reports: Vec<_> = procs
                .into_iter()
                .enumerate()
                .map(|(pid, handle)| join(&format!("proc-{}", pid), handle))
                .collect();
            Ok::<_, SimError>((mmu, sched, reports))
        })?;

        let reports = reports.into_iter().collect::<Result<Vec<WorkloadReport>>>();
        let (mmu, sched, reports) = match (mmu, sched, reports) {
            (Ok(mmu), Ok(sched), Ok(reports)) => (mmu, sched, reports),
            (mmu, sched, reports) => {
                // Disconnects are usually fallout; report the root cause
                let err = [mmu.err(), sched.err(), reports.err()]
                    .into_iter()
                    .flatten()
                    .reduce(|cause, e| match cause {
                        SimError::Disconnected(_) if !matches!(e, SimError::Disconnected(_)) => e,
                        _ => cause,
                    })
                    .unwrap_or(SimError::Disconnected("simulation"));
                error!("[MASTER] simulation failed: {}", err);
                return Err(err);
            }
        };

        info!("[MASTER] all threads joined");
        let processes = reports
            .into_iter()
            .map(|report| ProcessSummary {
                pid: report.pid,
                bound: bounds[report.pid],
                stats: mmu.stats[report.pid],
                outcomes: report,
            })
            .collect();

        Ok(SimulationReport {
            seed,
            admission_order: sched.admission_order,
            processes,
            resident: mmu.resident,
            free_frames: mmu.free_frames,
            clock: mmu.clock,
        })
    }
}

fn join<T>(name: &str, handle: ScopedJoinHandle<'_, Result<T>>) -> Result<T> {
    handle
        .join()
        .map_err(|_| SimError::ThreadPanicked(name.to_string()))?
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    pub pid: usize,
    pub bound: i64,
    pub outcomes: WorkloadReport,
    pub stats: ProcessStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    /// Seed of generated reference strings, `None` when they were supplied
    pub seed: Option<u64>,
    pub admission_order: Vec<usize>,
    pub processes: Vec<ProcessSummary>,
    pub resident: Vec<ResidentPage>,
    pub free_frames: usize,
    pub clock: u64,
}

impl SimulationReport {
    pub fn workload_reports(&self) -> Vec<WorkloadReport> {
        self.processes.iter().map(|p| p.outcomes.clone()).collect()
    }
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Summary ===")?;
        if let Some(seed) = self.seed {
            writeln!(f, "Seed:            {}", seed)?;
        }
        let order: Vec<String> = self.admission_order.iter().map(|p| p.to_string()).collect();
        writeln!(f, "Admission order: {}", order.join(" "))?;
        writeln!(f, "Logical clock:   {}", self.clock)?;
        writeln!(f, "Free frames:     {}", self.free_frames)?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>4} {:>6} {:>6} {:>6} {:>7} {:>9} {:>8} {:>13}",
            "pid", "bound", "refs", "hits", "faults", "evictions", "invalid", "unresolvable"
        )?;
        for p in &self.processes {
            writeln!(
                f,
                "{:>4} {:>6} {:>6} {:>6} {:>7} {:>9} {:>8} {:>13}",
                p.pid,
                p.bound,
                p.outcomes.outcomes.len(),
                p.stats.hits,
                p.stats.page_faults,
                p.stats.evictions,
                p.stats.invalid_refs,
                p.stats.unresolvable
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Resident pages:  {}", self.resident.len())?;
        for page in &self.resident {
            writeln!(f, "  {}", page)?;
        }
        Ok(())
    }
}
