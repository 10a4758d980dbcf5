//! Memory resolution engine.
//!
//! [`Mmu`] owns the page tables, the free frame list and the logical clock
//! and resolves one reference at a time. [`Engine`] wraps it in the receive
//! loop that answers workloads and notifies the scheduler. Nothing else ever
//! holds the stores, so resolution is serialized by construction.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};
use log::{debug, info, trace, warn};

use crate::config::SimConfig;
use crate::error::{MemoryError, Result, SimError};
use crate::memory::{is_legal, resident_in, FreeFrameList, PageTableStore};
use crate::protocol::{self, AccessOutcome, NoticeKind, Notification, Reply, Request, RequestKind};
use crate::replacement::select_local_victim;

/// How one access was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Invalid,
    Hit { frame: usize },
    /// Fault served from the free frame list
    Allocated { frame: usize },
    /// Fault served by evicting `victim`, a page of the same process
    Evicted { frame: usize, victim: usize },
    Unresolvable,
}

impl Resolution {
    pub fn fault_handled(&self) -> bool {
        matches!(self, Resolution::Allocated { .. } | Resolution::Evicted { .. })
    }

    pub fn outcome(&self) -> AccessOutcome {
        match *self {
            Resolution::Invalid => AccessOutcome::Invalid,
            Resolution::Hit { frame }
            | Resolution::Allocated { frame }
            | Resolution::Evicted { frame, .. } => AccessOutcome::Frame(frame),
            Resolution::Unresolvable => AccessOutcome::Unresolvable,
        }
    }
}

/// Per-process access counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessStats {
    pub hits: u64,
    pub page_faults: u64,
    pub evictions: u64,
    pub invalid_refs: u64,
    pub unresolvable: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResidentPage {
    pub pid: usize,
    pub page: usize,
    pub frame: usize,
}

impl fmt::Display for ResidentPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {} page {} -> frame {}", self.pid, self.page, self.frame)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Owner {
    pid: usize,
    page: usize,
}

pub struct Mmu {
    tables: PageTableStore,
    pool: FreeFrameList,
    /// Reverse map frame -> owning (pid, page)
    owners: Vec<Option<Owner>>,
    clock: u64,
    stats: Vec<ProcessStats>,
}

impl Mmu {
    pub fn new(processes: usize, pages: usize, frames: usize) -> std::result::Result<Self, MemoryError> {
        let tables = PageTableStore::new(processes, pages)?;
        let pool = FreeFrameList::new(frames)?;
        Ok(Mmu {
            tables,
            pool,
            owners: vec![None; frames],
            clock: 0,
            stats: vec![ProcessStats::default(); processes],
        })
    }

    #[inline]
    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn tables(&self) -> &PageTableStore {
        &self.tables
    }

    pub fn pool(&self) -> &FreeFrameList {
        &self.pool
    }

    pub fn stats(&self) -> &[ProcessStats] {
        &self.stats
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Resolve one reference of `pid` to `page`, legal below `bound`.
    ///
    /// Errors are broken invariants, never workload mistakes.
    pub fn resolve(&mut self, pid: usize, page: i64, bound: i64) -> Result<Resolution> {
        if pid >= self.tables.processes() {
            warn!("[MMU] request from unknown pid={}", pid);
            return Ok(Resolution::Invalid);
        }

        let limit = bound.min(self.tables.pages() as i64);
        if !is_legal(page, limit) {
            self.stats[pid].invalid_refs += 1;
            debug!("[MMU] pid={} illegal page={} (limit={})", pid, page, limit);
            return Ok(Resolution::Invalid);
        }
        let page = page as usize;

        let pte = *self.tables.entry(pid, page)?;
        if pte.valid {
            let frame = pte.frame_no.ok_or_else(|| {
                SimError::Accounting(format!("pid {} page {} valid without a frame", pid, page))
            })?;
            let ts = self.tick();
            self.tables.touch(pid, page, ts)?;
            self.stats[pid].hits += 1;
            debug!("[MMU] pid={} hit page={} -> frame={} (ts={})", pid, page, frame, ts);
            return Ok(Resolution::Hit { frame });
        }

        if let Some(frame) = self.pool.allocate() {
            let ts = self.map(pid, page, frame)?;
            self.stats[pid].page_faults += 1;
            debug!(
                "[MMU] pid={} fault page={} allocated frame={} (ts={})",
                pid, page, frame, ts
            );
            return Ok(Resolution::Allocated { frame });
        }

        // The victim's frame is handed straight to the faulting page and
        // never passes through the free list.
        match select_local_victim(&self.tables, pid)? {
            Some(victim) => {
                let frame = self.unmap(pid, victim)?;
                let ts = self.map(pid, page, frame)?;
                self.stats[pid].page_faults += 1;
                self.stats[pid].evictions += 1;
                debug!(
                    "[MMU] pid={} fault page={} evicted page={} -> frame={} (ts={})",
                    pid, page, victim, frame, ts
                );
                Ok(Resolution::Evicted { frame, victim })
            }
            None => {
                self.stats[pid].unresolvable += 1;
                warn!(
                    "[MMU] pid={} cannot handle fault on page={}: no free frame and no local victim",
                    pid, page
                );
                Ok(Resolution::Unresolvable)
            }
        }
    }

    fn map(&mut self, pid: usize, page: usize, frame: usize) -> Result<u64> {
        let total = self.owners.len();
        let slot = self
            .owners
            .get_mut(frame)
            .ok_or(MemoryError::FrameOutOfRange { frame, frames: total })?;
        if let Some(owner) = *slot {
            return Err(SimError::FrameAlreadyOwned {
                frame,
                pid,
                page,
                owner_pid: owner.pid,
                owner_page: owner.page,
            });
        }
        *slot = Some(Owner { pid, page });
        let ts = self.tick();
        self.tables.set_mapping(pid, page, frame, ts)?;
        Ok(ts)
    }

    fn unmap(&mut self, pid: usize, page: usize) -> Result<usize> {
        let frame = self
            .tables
            .invalidate(pid, page)?
            .ok_or(MemoryError::NotResident { pid, page })?;
        match self.owners.get_mut(frame) {
            Some(slot) if *slot == Some(Owner { pid, page }) => {
                *slot = None;
                Ok(frame)
            }
            _ => Err(SimError::Accounting(format!(
                "frame {} backing pid {} page {} has another owner",
                frame, pid, page
            ))),
        }
    }

    /// Invalidate every resident page of `pid` and return the frames to the
    /// free list. Returns how many frames were released.
    pub fn reclaim(&mut self, pid: usize) -> Result<usize> {
        let resident = self.tables.resident(pid)?;
        for &(page, _) in &resident {
            let frame = self.unmap(pid, page)?;
            self.pool.release(frame)?;
        }
        Ok(resident.len())
    }

    /// Every resident page, ordered by pid then page
    pub fn resident_set(&self) -> Vec<ResidentPage> {
        self.tables
            .iter_tables()
            .enumerate()
            .flat_map(|(pid, table)| {
                resident_in(table).map(move |(page, frame)| ResidentPage { pid, page, frame })
            })
            .collect()
    }

    /// Every frame is either free exactly once or backs exactly one valid
    /// entry whose owner record matches.
    pub fn check_invariants(&self) -> Result<()> {
        let total = self.pool.total_frames();
        let mut seen = vec![false; total];

        for frame in self.pool.iter() {
            if std::mem::replace(&mut seen[frame], true) {
                return Err(SimError::Accounting(format!("frame {} free twice", frame)));
            }
            if self.owners[frame].is_some() {
                return Err(SimError::Accounting(format!(
                    "frame {} is free but has an owner",
                    frame
                )));
            }
        }

        for ResidentPage { pid, page, frame } in self.resident_set() {
            if frame >= total {
                return Err(MemoryError::FrameOutOfRange { frame, frames: total }.into());
            }
            if std::mem::replace(&mut seen[frame], true) {
                return Err(SimError::Accounting(format!(
                    "frame {} of pid {} page {} is also free or mapped elsewhere",
                    frame, pid, page
                )));
            }
            if self.owners[frame] != Some(Owner { pid, page }) {
                return Err(SimError::Accounting(format!(
                    "owner record of frame {} does not match pid {} page {}",
                    frame, pid, page
                )));
            }
        }

        match seen.iter().position(|s| !s) {
            Some(frame) => Err(SimError::Accounting(format!("frame {} orphaned", frame))),
            None => Ok(()),
        }
    }
}

/// Final MMU state handed back when the engine stops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmuReport {
    pub resident: Vec<ResidentPage>,
    pub free_frames: usize,
    pub clock: u64,
    pub stats: Vec<ProcessStats>,
}

/// The MMU's receive loop
pub struct Engine {
    mmu: Mmu,
    timeout: Option<Duration>,
    reclaim_on_exit: bool,
    notify_hits: bool,
    finished: HashSet<usize>,
}

impl Engine {
    pub fn new(config: &SimConfig) -> Result<Self> {
        let mmu = Mmu::new(config.processes, config.pages, config.frames)?;
        Ok(Engine {
            mmu,
            timeout: config.timeout,
            reclaim_on_exit: config.reclaim_on_exit,
            notify_hits: config.notify_hits,
            finished: HashSet::new(),
        })
    }

    pub fn mmu(&self) -> &Mmu {
        &self.mmu
    }

    /// Processes that have sent end-of-stream
    pub fn finished(&self) -> usize {
        self.finished.len()
    }

    pub fn is_done(&self) -> bool {
        self.finished.len() >= self.mmu.tables.processes()
    }

    /// Resolve one request into its reply and, if any, the scheduler notice.
    pub fn handle(&mut self, pid: usize, kind: RequestKind) -> Result<(Reply, Option<Notification>)> {
        match kind {
            RequestKind::Access { page, bound } => {
                let resolution = self.mmu.resolve(pid, page, bound)?;
                let notice = match resolution {
                    r if r.fault_handled() => Some(NoticeKind::FaultHandled),
                    Resolution::Hit { .. } if self.notify_hits => Some(NoticeKind::NoFault),
                    _ => None,
                };
                let reply = Reply {
                    pid,
                    outcome: resolution.outcome(),
                };
                Ok((reply, notice.map(|kind| Notification { pid, kind })))
            }
            RequestKind::EndOfStream => {
                let reply = Reply {
                    pid,
                    outcome: AccessOutcome::EndOfStream,
                };
                if pid >= self.mmu.tables.processes() {
                    warn!("[MMU] end-of-ref from unknown pid={}", pid);
                    return Ok((reply, None));
                }
                if !self.finished.insert(pid) {
                    warn!("[MMU] duplicate end-of-ref from pid={}", pid);
                    return Ok((reply, None));
                }
                info!("[MMU] pid={} end-of-ref", pid);
                if self.reclaim_on_exit {
                    let released = self.mmu.reclaim(pid)?;
                    debug!("[MMU] pid={} released {} frames", pid, released);
                }
                Ok((
                    reply,
                    Some(Notification {
                        pid,
                        kind: NoticeKind::Finished,
                    }),
                ))
            }
        }
    }

    /// Serve requests until every process has sent end-of-stream.
    pub fn run(mut self, inbox: &Receiver<Request>, notices: &Sender<Notification>) -> Result<MmuReport> {
        let mmu = &self.mmu;
        info!(
            "[MMU] started: k={} m={} f={}",
            mmu.tables.processes(),
            mmu.tables.pages(),
            mmu.pool.total_frames()
        );

        while !self.is_done() {
            let request = protocol::recv(inbox, self.timeout, "MMU request")?;
            trace!("[MMU] recv pid={} {:?}", request.pid, request.kind);

            let (reply, notice) = self.handle(request.pid, request.kind)?;
            if cfg!(debug_assertions) {
                self.mmu.check_invariants()?;
            }

            if request.reply_to.send(reply).is_err() {
                warn!("[MMU] pid={} left before its reply", request.pid);
            }
            if let Some(notice) = notice {
                protocol::send(notices, notice, "scheduler notification")?;
            }
        }

        info!("[MMU] all {} processes finished, shutting down", self.finished.len());
        Ok(MmuReport {
            resident: self.mmu.resident_set(),
            free_frames: self.mmu.pool.free_count(),
            clock: self.mmu.clock,
            stats: self.mmu.stats.clone(),
        })
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Frame conservation holds after every access, never more than f
        /// pages are resident, and a process's fault never shrinks another
        /// process's resident set.
        #[test]
        fn prop_frames_conserved_and_isolated(
            k in 1_usize..4,
            m in 1_usize..8,
            f in 1_usize..8,
            refs in proptest::collection::vec((0_usize..4, -2_i64..10), 0..200)
        ) {
            let mut mmu = Mmu::new(k, m, f).unwrap();
            for (pid, page) in refs {
                let pid = pid % k;
                let before: Vec<usize> = (0..k)
                    .map(|p| mmu.tables().resident(p).unwrap().len())
                    .collect();
                let clock = mmu.clock();

                let resolution = mmu.resolve(pid, page, m as i64).unwrap();
                prop_assert!(mmu.check_invariants().is_ok());
                prop_assert!(mmu.resident_set().len() <= f);

                for (other, &count) in before.iter().enumerate() {
                    if other != pid {
                        prop_assert_eq!(mmu.tables().resident(other).unwrap().len(), count);
                    }
                }
                match resolution {
                    Resolution::Invalid | Resolution::Unresolvable => {
                        prop_assert_eq!(mmu.clock(), clock);
                    }
                    _ => {
                        prop_assert_eq!(mmu.clock(), clock + 1);
                    }
                }
            }
        }
    }
}
