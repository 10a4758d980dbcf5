use crate::error::MemoryError;

/// One page table entry: residency record for a (process, virtual page) pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageTableEntry {
    /// Backing frame, `None` while unmapped
    pub frame_no: Option<usize>,
    pub valid: bool,
    /// Logical timestamp of the last access; only meaningful while valid
    pub last_used: u64,
}

/// Page tables for every process, stored back to back (`processes * pages` entries)
#[derive(Debug, Clone)]
pub struct PageTableStore {
    entries: Vec<PageTableEntry>,
    processes: usize,
    pages: usize,
}

impl PageTableStore {
    /// Allocate all tables with every entry unmapped
    pub fn new(processes: usize, pages: usize) -> Result<Self, MemoryError> {
        let len = match processes.checked_mul(pages) {
            Some(len) if len > 0 => len,
            _ => return Err(MemoryError::InvalidDimensions { processes, pages }),
        };
        Ok(PageTableStore {
            entries: vec![PageTableEntry::default(); len],
            processes,
            pages,
        })
    }

    #[inline]
    pub fn processes(&self) -> usize {
        self.processes
    }

    /// Length `m` of every page table
    #[inline]
    pub fn pages(&self) -> usize {
        self.pages
    }

    fn index(&self, pid: usize, page: usize) -> Result<usize, MemoryError> {
        if pid >= self.processes {
            return Err(MemoryError::UnknownProcess {
                pid,
                processes: self.processes,
            });
        }
        if page >= self.pages {
            return Err(MemoryError::PageOutOfRange {
                page,
                pages: self.pages,
            });
        }
        Ok(pid * self.pages + page)
    }

    /// The page table of one process
    pub fn table(&self, pid: usize) -> Result<&[PageTableEntry], MemoryError> {
        if pid >= self.processes {
            return Err(MemoryError::UnknownProcess {
                pid,
                processes: self.processes,
            });
        }
        let base = pid * self.pages;
        Ok(&self.entries[base..base + self.pages])
    }

    pub fn entry(&self, pid: usize, page: usize) -> Result<&PageTableEntry, MemoryError> {
        let idx = self.index(pid, page)?;
        Ok(&self.entries[idx])
    }

    /// Map `page` to `frame` and stamp it; fails without mutating on a bad index
    pub fn set_mapping(
        &mut self,
        pid: usize,
        page: usize,
        frame: usize,
        timestamp: u64,
    ) -> Result<(), MemoryError> {
        let idx = self.index(pid, page)?;
        self.entries[idx] = PageTableEntry {
            frame_no: Some(frame),
            valid: true,
            last_used: timestamp,
        };
        Ok(())
    }

    /// Drop residency. Returns the frame that backed the page, `None` if it
    /// was already invalid.
    pub fn invalidate(&mut self, pid: usize, page: usize) -> Result<Option<usize>, MemoryError> {
        let idx = self.index(pid, page)?;
        let pte = &mut self.entries[idx];
        let frame = if pte.valid { pte.frame_no } else { None };
        pte.frame_no = None;
        pte.valid = false;
        Ok(frame)
    }

    /// Refresh `last_used` of a resident page
    pub fn touch(&mut self, pid: usize, page: usize, timestamp: u64) -> Result<(), MemoryError> {
        let idx = self.index(pid, page)?;
        let pte = &mut self.entries[idx];
        if !pte.valid {
            return Err(MemoryError::NotResident { pid, page });
        }
        pte.last_used = timestamp;
        Ok(())
    }

    /// Resident pages of `pid` as `(page, frame)` pairs, in page order
    pub fn resident(&self, pid: usize) -> Result<Vec<(usize, usize)>, MemoryError> {
        Ok(resident_in(self.table(pid)?).collect())
    }

    /// Every page table, in pid order
    pub fn iter_tables(&self) -> impl Iterator<Item = &[PageTableEntry]> + '_ {
        self.entries.chunks(self.pages)
    }
}

/// `(page, frame)` of every valid entry of one table
pub fn resident_in(table: &[PageTableEntry]) -> impl Iterator<Item = (usize, usize)> + '_ {
    table
        .iter()
        .enumerate()
        .filter_map(|(page, pte)| match (pte.valid, pte.frame_no) {
            (true, Some(frame)) => Some((page, frame)),
            _ => None,
        })
}

/// `0 <= page < bound`
#[inline]
pub fn is_legal(page: i64, bound: i64) -> bool {
    page >= 0 && page < bound
}

/// Tracks which frames are available for allocation.
///
/// Fixed ring of `total` slots; frames leave from the head and return at the
/// tail, so allocation order is FIFO over release order.
#[derive(Debug, Clone)]
pub struct FreeFrameList {
    frames: Vec<usize>,
    head: usize,
    tail: usize,
    count: usize,
}

impl FreeFrameList {
    /// Every frame `0..total` starts free
    pub fn new(total: usize) -> Result<Self, MemoryError> {
        if total == 0 {
            return Err(MemoryError::NoFrames);
        }
        Ok(FreeFrameList {
            frames: (0..total).collect(),
            head: 0,
            tail: 0,
            count: total,
        })
    }

    #[inline]
    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn free_count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Pop the oldest free frame; `None` when exhausted
    pub fn allocate(&mut self) -> Option<usize> {
        if self.count == 0 {
            return None;
        }
        let frame = self.frames[self.head];
        self.head = (self.head + 1) % self.frames.len();
        self.count -= 1;
        Some(frame)
    }

    /// Return a frame to the tail of the ring
    pub fn release(&mut self, frame: usize) -> Result<(), MemoryError> {
        let total = self.frames.len();
        if frame >= total {
            return Err(MemoryError::FrameOutOfRange {
                frame,
                frames: total,
            });
        }
        if self.count >= total {
            return Err(MemoryError::PoolFull { frame });
        }
        if self.contains(frame) {
            return Err(MemoryError::DoubleFree { frame });
        }
        self.frames[self.tail] = frame;
        self.tail = (self.tail + 1) % total;
        self.count += 1;
        Ok(())
    }

    /// Free frames in allocation order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        let total = self.frames.len();
        (0..self.count).map(move |i| self.frames[(self.head + i) % total])
    }

    pub fn contains(&self, frame: usize) -> bool {
        self.iter().any(|f| f == frame)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    proptest! {
        /// Count stays within [0, f] and no frame is handed out twice.
        #[test]
        fn prop_ffl_never_double_allocates(
            total in 1_usize..16,
            ops in proptest::collection::vec(any::<bool>(), 0..128)
        ) {
            let mut ffl = FreeFrameList::new(total).unwrap();
            let mut outstanding: Vec<usize> = Vec::new();

            for alloc in ops {
                if alloc || outstanding.is_empty() {
                    match ffl.allocate() {
                        Some(frame) => {
                            prop_assert!(!outstanding.contains(&frame));
                            outstanding.push(frame);
                        }
                        None => {
                            prop_assert_eq!(outstanding.len(), total);
                        }
                    }
                } else {
                    let frame = outstanding.remove(0);
                    prop_assert!(ffl.release(frame).is_ok());
                }
                prop_assert!(ffl.free_count() <= total);
                prop_assert_eq!(ffl.free_count() + outstanding.len(), total);
            }

            let free: HashSet<usize> = ffl.iter().collect();
            prop_assert_eq!(free.len(), ffl.free_count());
            prop_assert!(outstanding.iter().all(|f| !free.contains(f)));
        }
    }
}
