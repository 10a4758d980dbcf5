//! FCFS admission scheduler.
//!
//! Workloads register, are admitted one at a time in registration order,
//! and count as finished when the MMU reports their end-of-stream.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use crossbeam::channel::Receiver;
use log::{debug, info, trace, warn};

use crate::error::Result;
use crate::protocol::{self, NoticeKind, Notification, Registration, Resume};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Ready,
    Running,
    Finished,
}

/// Admission bookkeeping, independent of any channel
#[derive(Debug, Default)]
pub struct AdmissionTable {
    ready: VecDeque<Registration>,
    states: HashMap<usize, ProcessState>,
    running: Option<usize>,
    /// Finished notices that arrived before their process was admitted
    early: HashSet<usize>,
    finished: usize,
    admission_order: Vec<usize>,
}

impl AdmissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a registration. Returns `false` for a pid already known.
    pub fn register(&mut self, registration: Registration) -> bool {
        let pid = registration.pid;
        if self.states.contains_key(&pid) {
            warn!("[SCHED] process {} registered twice, ignoring", pid);
            return false;
        }
        debug!("[SCHED] process {} ready", pid);
        self.states.insert(pid, ProcessState::Ready);
        self.ready.push_back(registration);
        true
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Dequeue the oldest ready registration, unless a process is running.
    pub fn admit_next(&mut self) -> Option<Registration> {
        if self.running.is_some() {
            return None;
        }
        let registration = self.ready.pop_front()?;
        self.states.insert(registration.pid, ProcessState::Running);
        self.running = Some(registration.pid);
        self.admission_order.push(registration.pid);
        Some(registration)
    }

    /// Apply one MMU notice. Returns the pid that just finished, if any.
    pub fn observe(&mut self, notice: Notification) -> Option<usize> {
        let Notification { pid, kind } = notice;
        match kind {
            NoticeKind::FaultHandled => {
                debug!("[SCHED] process {}: page fault handled", pid);
                None
            }
            NoticeKind::NoFault => {
                trace!("[SCHED] process {}: access without fault", pid);
                None
            }
            NoticeKind::Finished if self.running == Some(pid) => {
                self.finish(pid);
                Some(pid)
            }
            NoticeKind::Finished => {
                warn!(
                    "[SCHED] finish notice for process {} while {:?} is running",
                    pid, self.running
                );
                self.early.insert(pid);
                None
            }
        }
    }

    /// Finish the running process right away if its notice came early.
    pub fn complete_early(&mut self, pid: usize) -> bool {
        if self.running == Some(pid) && self.early.remove(&pid) {
            self.finish(pid);
            return true;
        }
        false
    }

    fn finish(&mut self, pid: usize) {
        info!("[SCHED] process {} finished", pid);
        self.states.insert(pid, ProcessState::Finished);
        self.running = None;
        self.finished += 1;
    }

    pub fn state(&self, pid: usize) -> Option<ProcessState> {
        self.states.get(&pid).copied()
    }

    pub fn running(&self) -> Option<usize> {
        self.running
    }

    pub fn finished(&self) -> usize {
        self.finished
    }

    pub fn admission_order(&self) -> &[usize] {
        &self.admission_order
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerReport {
    pub admission_order: Vec<usize>,
}

pub struct Scheduler {
    table: AdmissionTable,
    processes: usize,
    timeout: Option<Duration>,
}

impl Scheduler {
    pub fn new(processes: usize, timeout: Option<Duration>) -> Self {
        Scheduler {
            table: AdmissionTable::new(),
            processes,
            timeout,
        }
    }

    /// Admit and track processes until `processes` of them have finished.
    ///
    /// `timeout` bounds the wait for a registration only.
    pub fn run(
        mut self,
        registrations: &Receiver<Registration>,
        notices: &Receiver<Notification>,
    ) -> Result<SchedulerReport> {
        info!("[SCHED] started (FCFS), expecting {} processes", self.processes);

        while self.table.finished() < self.processes {
            for registration in registrations.try_iter() {
                self.table.register(registration);
            }
            if !self.table.has_ready() {
                let registration = protocol::recv(registrations, self.timeout, "registration")?;
                self.table.register(registration);
                continue;
            }
            let Some(registration) = self.table.admit_next() else {
                continue;
            };
            let pid = registration.pid;
            info!("[SCHED] picked process {} from ready queue", pid);
            protocol::send(&registration.resume, Resume, "resume")?;

            if self.table.complete_early(pid) {
                continue;
            }
            // A run of hits sends no notices, so this wait lasts as long as
            // the process does. Stalls surface as MMU or workload timeouts,
            // which drop the notice sender.
            loop {
                let notice = protocol::recv(notices, None, "scheduler notification")?;
                if self.table.observe(notice) == Some(pid) {
                    break;
                }
            }
        }

        info!("[SCHED] all {} processes finished, exiting", self.processes);
        Ok(SchedulerReport {
            admission_order: self.table.admission_order().to_vec(),
        })
    }
}
