//! Demand-paging simulator.
//!
//! A single MMU engine owns every page table and the free frame list and
//! resolves page references for concurrently running workloads. A FCFS
//! scheduler admits the workloads one at a time. All three talk over
//! channels only.

pub mod config;
pub mod constants;
pub mod error;
pub mod generator;
pub mod io;
pub mod memory;
pub mod mmu;
pub mod protocol;
pub mod replacement;
pub mod scheduler;
pub mod simulation;
pub mod workload;

pub use config::SimConfig;
pub use error::{ConfigError, MemoryError, Result, SimError};
pub use mmu::{Engine, Mmu, ProcessStats, ResidentPage, Resolution};
pub use protocol::AccessOutcome;
pub use simulation::{ProcessSummary, Simulation, SimulationReport};
pub use workload::{WorkloadReport, WorkloadSpec};
