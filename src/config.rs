use std::time::Duration;

use crate::constants::*;
use crate::error::ConfigError;

/// Run configuration. Dimensions bound every table and are fixed for the run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Number of processes `k`.
    pub processes: usize,
    /// Page table length `m`.
    pub pages: usize,
    /// Physical frames `f`.
    pub frames: usize,
    /// Generated references per process.
    pub ref_len: usize,
    pub seed: Option<u64>,
    /// Probability that a generated reference falls outside the legal bound.
    pub illegal_rate: f64,
    /// Upper bound on every blocking receive. `None` blocks forever.
    pub timeout: Option<Duration>,
    /// Release a finished process's frames back to the pool.
    pub reclaim_on_exit: bool,
    /// Also notify the scheduler about hits.
    pub notify_hits: bool,
}

impl SimConfig {
    pub fn new(processes: usize, pages: usize, frames: usize) -> Result<Self, ConfigError> {
        let config = SimConfig {
            processes,
            pages,
            frames,
            ref_len: DEFAULT_REF_LEN,
            seed: None,
            illegal_rate: DEFAULT_ILLEGAL_RATE,
            timeout: None,
            reclaim_on_exit: false,
            notify_hits: false,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_ref_len(mut self, ref_len: usize) -> Self {
        self.ref_len = ref_len;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_illegal_rate(mut self, rate: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(ConfigError::IllegalRate(rate));
        }
        self.illegal_rate = rate;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        self.timeout = Some(timeout);
        Ok(self)
    }

    pub fn with_reclaim_on_exit(mut self, reclaim: bool) -> Self {
        self.reclaim_on_exit = reclaim;
        self
    }

    pub fn with_notify_hits(mut self, notify: bool) -> Self {
        self.notify_hits = notify;
        self
    }

    /// Re-check every field; called again by the simulation before it starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processes == 0 {
            return Err(ConfigError::NonPositive { what: "process count" });
        }
        if self.pages == 0 {
            return Err(ConfigError::NonPositive { what: "pages per process" });
        }
        if self.frames == 0 {
            return Err(ConfigError::NonPositive { what: "frame count" });
        }
        if !(0.0..=1.0).contains(&self.illegal_rate) {
            return Err(ConfigError::IllegalRate(self.illegal_rate));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}
