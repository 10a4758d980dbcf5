//! Local LRU victim selection.
//!
//! Eviction only ever looks at the faulting process's own table, so one
//! process never loses a frame to another's fault.

use crate::error::MemoryError;
use crate::memory::{PageTableEntry, PageTableStore};

/// Least recently used valid page of one table.
///
/// Single forward scan keeping the first minimum, so ties go to the lowest
/// page number. `None` iff no entry is valid.
pub fn select_victim(table: &[PageTableEntry]) -> Option<usize> {
    let mut victim: Option<(usize, u64)> = None;
    for (page, pte) in table.iter().enumerate() {
        if !pte.valid {
            continue;
        }
        match victim {
            Some((_, oldest)) if pte.last_used >= oldest => {}
            _ => victim = Some((page, pte.last_used)),
        }
    }
    victim.map(|(page, _)| page)
}

/// [`select_victim`] over the table of `pid`
pub fn select_local_victim(store: &PageTableStore, pid: usize) -> Result<Option<usize>, MemoryError> {
    Ok(select_victim(store.table(pid)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picks_smallest_last_used() {
        let mut store = PageTableStore::new(1, 8).unwrap();
        store.set_mapping(0, 3, 0, 2).unwrap();
        store.set_mapping(0, 5, 1, 1).unwrap();
        assert_eq!(select_local_victim(&store, 0).unwrap(), Some(5));
    }

    #[test]
    fn test_touch_changes_victim() {
        let mut store = PageTableStore::new(2, 8).unwrap();
        store.set_mapping(1, 3, 0, 1).unwrap();
        store.set_mapping(1, 5, 1, 2).unwrap();
        store.touch(1, 3, 3).unwrap();
        assert_eq!(select_local_victim(&store, 1).unwrap(), Some(5));
    }

    #[test]
    fn test_tie_goes_to_lowest_page() {
        let mut store = PageTableStore::new(1, 8).unwrap();
        store.set_mapping(0, 6, 0, 4).unwrap();
        store.set_mapping(0, 2, 1, 4).unwrap();
        store.set_mapping(0, 4, 2, 4).unwrap();
        assert_eq!(select_local_victim(&store, 0).unwrap(), Some(2));
    }

    #[test]
    fn test_none_without_resident_pages() {
        let mut store = PageTableStore::new(2, 4).unwrap();
        assert_eq!(select_local_victim(&store, 0).unwrap(), None);

        // Pages of another process are never candidates
        store.set_mapping(1, 0, 0, 1).unwrap();
        assert_eq!(select_local_victim(&store, 0).unwrap(), None);

        store.set_mapping(0, 1, 1, 2).unwrap();
        store.invalidate(0, 1).unwrap();
        assert_eq!(select_local_victim(&store, 0).unwrap(), None);
    }

    #[test]
    fn test_invalid_entries_ignored_even_if_older() {
        let table = [
            PageTableEntry { frame_no: None, valid: false, last_used: 0 },
            PageTableEntry { frame_no: Some(3), valid: true, last_used: 7 },
            PageTableEntry { frame_no: Some(1), valid: true, last_used: 9 },
        ];
        assert_eq!(select_victim(&table), Some(1));
    }

    #[test]
    fn test_unknown_process() {
        let store = PageTableStore::new(1, 4).unwrap();
        assert!(select_local_victim(&store, 1).is_err());
    }
}
