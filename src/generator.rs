use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SimConfig;
use crate::workload::WorkloadSpec;

/// Seeded source of per-process reference strings
pub struct ReferenceGenerator {
    rng: StdRng,
    seed: u64,
}

impl ReferenceGenerator {
    /// Seed from `seed`, or from entropy when `None`
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(rand::random);
        ReferenceGenerator {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    /// The seed in use, so a run can be replayed
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draw a legal bound in `[1, pages]`, then `ref_len` references below it.
    /// With probability `illegal_rate` a reference lands in `[bound, bound + pages)`.
    pub fn workload(&mut self, pid: usize, pages: usize, ref_len: usize, illegal_rate: f64) -> WorkloadSpec {
        let pages = pages.max(1) as i64;
        let bound = self.rng.gen_range(1..=pages);
        let rate = illegal_rate.clamp(0.0, 1.0);
        let references = (0..ref_len)
            .map(|_| {
                if rate > 0.0 && self.rng.gen_bool(rate) {
                    self.rng.gen_range(bound..bound + pages)
                } else {
                    self.rng.gen_range(0..bound)
                }
            })
            .collect();
        WorkloadSpec { pid, bound, references }
    }

    pub fn generate(&mut self, config: &SimConfig) -> Vec<WorkloadSpec> {
        (0..config.processes)
            .map(|pid| self.workload(pid, config.pages, config.ref_len, config.illegal_rate))
            .collect()
    }
}
