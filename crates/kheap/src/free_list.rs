//! Size-ordered, intrusive free list.
//!
//! Free blocks are chained through the `prev`/`next` fields of their own
//! headers in ascending order of size. Four shortcut pointers cache the
//! first free block of at least 512 B, 1 KiB, 4 KiB and 16 KiB so that a
//! search for a large block skips every smaller one.
//!
//! ```text
//! head                shortcut[0]         shortcut[1]
//!  │                   │                   │
//!  ▼                   ▼                   ▼
//! [112] ⇄ [240] ⇄ [496] ⇄ [512] ⇄ [800] ⇄ [1024] ⇄ [3000] ⇄ null
//! ```
//!
//! A header is either *linked* (reachable from `head`) or *detached*
//! (`prev` and `next` are null and it is not the head).

use core::ptr;

use snafu::ensure;

use crate::{
    block::{Header, Region},
    fault::{AlreadyLinkedSnafu, BadLinkSnafu, Corruption, HeaderOutOfBoundsSnafu},
    layout::{HEADER_SIZE, SHORTCUT_COUNT, SHORTCUT_THRESHOLDS, size_class},
};

#[derive(Debug)]
pub(crate) struct FreeList {
    head: *mut Header,
    shortcuts: [*mut Header; SHORTCUT_COUNT],
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            shortcuts: [ptr::null_mut(); SHORTCUT_COUNT],
        }
    }

    pub(crate) fn head(&self) -> *mut Header {
        self.head
    }

    pub(crate) fn shortcuts(&self) -> [*mut Header; SHORTCUT_COUNT] {
        self.shortcuts
    }

    /// Links a detached header into the list, keeping it sorted by size.
    ///
    /// Among blocks of equal size the new one goes first.
    ///
    /// # Safety
    ///
    /// `node` must point to a valid header inside `region`, and every header
    /// already in the list must be valid.
    pub(crate) unsafe fn insert(
        &mut self,
        region: &Region,
        node: *mut Header,
    ) -> Result<(), Corruption> {
        let addr = node.addr();
        ensure!(
            !node.is_null() && region.contains(addr, HEADER_SIZE),
            HeaderOutOfBoundsSnafu { header: addr }
        );

        unsafe {
            ensure!(
                (*node).prev.is_null() && (*node).next.is_null() && !ptr::eq(self.head, node),
                AlreadyLinkedSnafu { header: addr }
            );

            let size = (*node).size;
            if self.head.is_null() {
                self.head = node;
                for (shortcut, &threshold) in self.shortcuts.iter_mut().zip(&SHORTCUT_THRESHOLDS) {
                    if size >= threshold {
                        *shortcut = node;
                    }
                }
                return Ok(());
            }

            // Everything before the chosen start is smaller than `size`.
            let mut current = self.insertion_start(size);
            let mut last = ptr::null_mut();
            while !current.is_null() && (*current).size < size {
                last = current;
                current = (*current).next;
            }

            if current.is_null() {
                // Larger than every block in the list: append.
                ensure!(!last.is_null(), BadLinkSnafu { header: addr, link: 0_usize });
                (*last).next = node;
                (*node).prev = last;
            } else {
                let prev = (*current).prev;
                (*node).prev = prev;
                (*node).next = current;
                (*current).prev = node;
                if prev.is_null() {
                    self.head = node;
                } else {
                    (*prev).next = node;
                }
            }

            // A shortcut whose target now sits right behind `node` must back
            // up to `node`, which qualifies for the same threshold.
            let next = (*node).next;
            for (shortcut, &threshold) in self.shortcuts.iter_mut().zip(&SHORTCUT_THRESHOLDS) {
                if size >= threshold && (shortcut.is_null() || ptr::eq(*shortcut, next)) {
                    *shortcut = node;
                }
            }
        }
        Ok(())
    }

    /// Unlinks `node` and clears its links.
    ///
    /// The head and any shortcut pointing at `node` advance to its
    /// successor, which is at least as large and so still qualifies.
    ///
    /// # Safety
    ///
    /// `node` must be a valid header that is either linked into this list or
    /// detached.
    pub(crate) unsafe fn remove(&mut self, node: *mut Header) {
        unsafe {
            let prev = (*node).prev;
            let next = (*node).next;

            if ptr::eq(self.head, node) {
                self.head = next;
            }
            for shortcut in &mut self.shortcuts {
                if ptr::eq(*shortcut, node) {
                    *shortcut = next;
                }
            }

            if !prev.is_null() {
                (*prev).next = next;
            }
            if !next.is_null() {
                (*next).prev = prev;
            }
            (*node).prev = ptr::null_mut();
            (*node).next = ptr::null_mut();
        }
    }

    /// Returns the first (smallest) free block of at least `size` bytes.
    ///
    /// # Safety
    ///
    /// Every header in the list must be valid.
    pub(crate) unsafe fn find_first_fit(&self, size: usize) -> Option<*mut Header> {
        let mut current = self.search_start(size)?;
        unsafe {
            while !current.is_null() {
                if (*current).size >= size {
                    return Some(current);
                }
                current = (*current).next;
            }
        }
        None
    }

    /// Where an insertion of a `size`-byte block may start scanning.
    fn insertion_start(&self, size: usize) -> *mut Header {
        let Some(class) = size_class(size) else {
            return self.head;
        };
        self.shortcuts[..=class]
            .iter()
            .rev()
            .copied()
            .find(|shortcut| !shortcut.is_null())
            .unwrap_or(self.head)
    }

    /// Where a search for `size` bytes starts, or `None` if the list cannot
    /// hold such a block.
    ///
    /// A null shortcut for a threshold at or below `size` means no free
    /// block reaches that threshold, let alone `size`.
    fn search_start(&self, size: usize) -> Option<*mut Header> {
        let start = match size_class(size) {
            Some(class) => self.shortcuts[class],
            None => self.head,
        };
        (!start.is_null()).then_some(start)
    }

    /// Iterates the list from the head.
    ///
    /// # Safety
    ///
    /// Every header in the list must be valid and the list must not be
    /// modified while the iterator is alive.
    pub(crate) unsafe fn iter(&self) -> Iter {
        Iter { next: self.head }
    }
}

pub(crate) struct Iter {
    next: *mut Header,
}

impl Iterator for Iter {
    type Item = *mut Header;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next.is_null() {
            return None;
        }
        let current = self.next;
        self.next = unsafe { (*current).next };
        Some(current)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::vec::Vec;
    use core::alloc::Layout;

    use super::*;
    use crate::block::Block;

    const ARENA: usize = 64 * 1024;

    /// Lays out detached holes of the given sizes back to back.
    fn with_holes<F>(sizes: &[usize], test_fn: F)
    where
        F: FnOnce(&Region, &[*mut Header]),
    {
        unsafe {
            let layout = Layout::from_size_align(ARENA, 16).unwrap();
            let base = alloc::alloc::alloc_zeroed(layout);
            let region = Region::new(base, ARENA);
            let mut addr = region.start();
            let mut nodes = Vec::new();
            for &size in sizes {
                nodes.push(Block::write(&region, addr, size, true).header());
                addr += size;
            }
            test_fn(&region, &nodes);
            alloc::alloc::dealloc(base, layout);
        }
    }

    fn sizes(list: &FreeList) -> Vec<usize> {
        unsafe { list.iter().map(|node| (*node).size).collect() }
    }

    /// Checks every shortcut against a linear scan of the list.
    fn assert_shortcuts(list: &FreeList) {
        for (index, &threshold) in SHORTCUT_THRESHOLDS.iter().enumerate() {
            let expected = unsafe { list.iter().find(|&node| (*node).size >= threshold) };
            assert_eq!(
                list.shortcuts[index],
                expected.unwrap_or(ptr::null_mut()),
                "shortcut #{index} ({threshold} bytes)"
            );
        }
    }

    #[test]
    fn test_insert_keeps_ascending_order() {
        with_holes(&[2048, 128, 512, 20480, 1024, 128, 4096], |region, nodes| unsafe {
            let mut list = FreeList::new();
            for &node in nodes {
                list.insert(region, node).unwrap();
                assert_shortcuts(&list);
            }
            assert_eq!(sizes(&list), [128, 128, 512, 1024, 2048, 4096, 20480]);
            assert_eq!(list.head, nodes[5]);
            assert!((*list.head).prev.is_null());
        });
    }

    #[test]
    fn test_insert_appends_past_largest() {
        with_holes(&[128, 600, 4096, 20480], |region, nodes| unsafe {
            let mut list = FreeList::new();
            for (index, &node) in nodes.iter().enumerate() {
                list.insert(region, node).unwrap();
                assert!((*node).next.is_null());
                if index > 0 {
                    assert_eq!((*node).prev, nodes[index - 1]);
                    assert_eq!((*nodes[index - 1]).next, node);
                }
                assert_shortcuts(&list);
            }
            assert_eq!(list.head, nodes[0]);
            assert_eq!(sizes(&list), [128, 600, 4096, 20480]);
        });
    }

    #[test]
    fn test_shortcut_backs_up_on_earlier_insert() {
        with_holes(&[4096, 1024, 600], |region, nodes| unsafe {
            let mut list = FreeList::new();
            list.insert(region, nodes[0]).unwrap();
            assert_eq!(list.shortcuts, [nodes[0], nodes[0], nodes[0], ptr::null_mut()]);

            list.insert(region, nodes[1]).unwrap();
            assert_eq!(list.shortcuts[0], nodes[1]);
            assert_eq!(list.shortcuts[1], nodes[1]);
            assert_eq!(list.shortcuts[2], nodes[0]);

            list.insert(region, nodes[2]).unwrap();
            assert_eq!(list.shortcuts[0], nodes[2]);
            assert_eq!(list.shortcuts[1], nodes[1]);
            assert_shortcuts(&list);
        });
    }

    #[test]
    fn test_insert_rejects_linked_and_foreign_nodes() {
        with_holes(&[256, 256], |region, nodes| unsafe {
            let mut list = FreeList::new();
            list.insert(region, nodes[0]).unwrap();
            assert!(matches!(
                list.insert(region, nodes[0]),
                Err(Corruption::AlreadyLinked { .. })
            ));
            list.insert(region, nodes[1]).unwrap();
            assert!(matches!(
                list.insert(region, nodes[0]),
                Err(Corruption::AlreadyLinked { .. })
            ));
            assert!(matches!(
                list.insert(region, ptr::null_mut()),
                Err(Corruption::HeaderOutOfBounds { header: 0, .. })
            ));
        });
    }

    #[test]
    fn test_remove_advances_head_and_shortcuts() {
        with_holes(&[512, 1024, 4096, 16384], |region, nodes| unsafe {
            let mut list = FreeList::new();
            for &node in nodes {
                list.insert(region, node).unwrap();
            }
            assert_eq!(list.shortcuts, [nodes[0], nodes[1], nodes[2], nodes[3]]);

            list.remove(nodes[0]);
            assert_eq!(list.head, nodes[1]);
            assert_eq!(list.shortcuts, [nodes[1], nodes[1], nodes[2], nodes[3]]);
            assert!((*nodes[0]).prev.is_null() && (*nodes[0]).next.is_null());

            list.remove(nodes[2]);
            assert_eq!(list.shortcuts, [nodes[1], nodes[1], nodes[3], nodes[3]]);
            assert_eq!((*nodes[1]).next, nodes[3]);
            assert_eq!((*nodes[3]).prev, nodes[1]);

            list.remove(nodes[3]);
            assert_eq!(list.shortcuts, [nodes[1], nodes[1], ptr::null_mut(), ptr::null_mut()]);

            list.remove(nodes[1]);
            assert!(list.head.is_null());
            assert_eq!(list.shortcuts, [ptr::null_mut(); SHORTCUT_COUNT]);
            assert_eq!(list.find_first_fit(1), None);
        });
    }

    #[test]
    fn test_find_first_fit() {
        with_holes(&[128, 496, 512, 1016, 1024, 8192], |region, nodes| unsafe {
            let mut list = FreeList::new();
            for &node in nodes {
                list.insert(region, node).unwrap();
            }
            assert_eq!(list.find_first_fit(1), Some(nodes[0]));
            assert_eq!(list.find_first_fit(128), Some(nodes[0]));
            assert_eq!(list.find_first_fit(136), Some(nodes[1]));
            assert_eq!(list.find_first_fit(600), Some(nodes[3]));
            assert_eq!(list.find_first_fit(4096), Some(nodes[5]));
            assert_eq!(list.find_first_fit(8192), Some(nodes[5]));
            assert_eq!(list.find_first_fit(8200), None);
            assert_eq!(list.find_first_fit(16384), None);
        });
    }

    #[test]
    fn test_find_at_exact_thresholds() {
        // Each block is exactly one threshold in size.
        with_holes(&SHORTCUT_THRESHOLDS, |region, nodes| unsafe {
            let mut list = FreeList::new();
            for &node in nodes.iter().rev() {
                list.insert(region, node).unwrap();
            }
            assert_eq!(list.shortcuts, [nodes[0], nodes[1], nodes[2], nodes[3]]);
            for (index, &threshold) in SHORTCUT_THRESHOLDS.iter().enumerate() {
                assert_eq!(list.find_first_fit(threshold), Some(nodes[index]));
                assert_eq!(list.find_first_fit(threshold - 8), Some(nodes[index]));
            }
            assert_eq!(list.find_first_fit(16 * 1024 + 8), None);
        });
    }

    #[test]
    fn test_equal_sizes_insert_first() {
        with_holes(&[1024, 1024, 1024], |region, nodes| unsafe {
            let mut list = FreeList::new();
            for &node in nodes {
                list.insert(region, node).unwrap();
            }
            let order: Vec<_> = list.iter().collect();
            assert_eq!(order, [nodes[2], nodes[1], nodes[0]]);
            assert_eq!(list.shortcuts[0], nodes[2]);
            assert_eq!(list.shortcuts[1], nodes[2]);
            assert_shortcuts(&list);
        });
    }
}
