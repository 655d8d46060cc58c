//! The heap manager.
//!
//! # Algorithm
//!
//! - **Allocation**: the request is clamped and rounded to a block size, the
//!   free list yields the smallest hole that fits, and the hole is split if
//!   the surplus is larger than [`MIN_PAYLOAD`]. Otherwise the whole hole is
//!   handed out.
//! - **Release**: the pointer is validated down to its tags, the block is
//!   merged with a free right neighbour and then with a free left
//!   neighbour, and the result is inserted into the free list.
//! - **Initialization**: the whole initial region is written as one
//!   allocated block and released, so the release path is the only code
//!   that ever builds a free-list entry.
//!
//! Capacity exhaustion is reported as `None`. Every structural violation is
//! fatal: the heap dumps its state on the console and halts the hart.

use core::ptr::{self, NonNull};

use log::{debug, error, info, trace, warn};
use snafu::{OptionExt as _, ResultExt as _, ensure};

use crate::{
    block::{Block, Header, Region},
    diagnostic::{self, Snapshot},
    fault::{
        BadLinkSnafu, Corruption, DoubleFreeSnafu, EmptyRegionSnafu,
        ExceedsMaximumSnafu, GapSnafu, HeaderOutOfBoundsSnafu, InitError, MapSnafu,
        MisalignedBaseSnafu, MisalignedSnafu, NotAHoleSnafu, NullPointerSnafu, RelocatedSnafu,
        ShortcutSnafu, StaleLinksSnafu, UncoalescedSnafu, UnlistedSnafu, UnsortedSnafu,
    },
    free_list::FreeList,
    layout::{
        FOOTER_SIZE, GRANULARITY, HEADER_SIZE, MIN_PAYLOAD, PAGE_SIZE, SHORTCUT_COUNT,
        SHORTCUT_THRESHOLDS, block_size_for,
    },
    platform::{CriticalSection, Platform},
};

/// Placement and size of the heap range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Virtual address of the first heap byte. Must be page aligned.
    pub base: usize,
    /// Pages mapped at initialization.
    pub initial_pages: usize,
    /// Size the range may theoretically grow to. Reserved, never used.
    pub max_size: usize,
}

impl HeapConfig {
    #[must_use]
    pub const fn new(base: usize, initial_pages: usize, max_size: usize) -> Self {
        Self {
            base,
            initial_pages,
            max_size,
        }
    }

    /// Bytes mapped at initialization.
    #[must_use]
    pub const fn initial_size(&self) -> usize {
        self.initial_pages.saturating_mul(PAGE_SIZE)
    }

    fn validate(&self) -> Result<(), InitError> {
        ensure!(
            self.base.is_multiple_of(PAGE_SIZE),
            MisalignedBaseSnafu { base: self.base }
        );
        ensure!(self.initial_pages > 0, EmptyRegionSnafu);
        ensure!(
            self.initial_size() <= self.max_size
                && self.base.checked_add(self.max_size).is_some(),
            ExceedsMaximumSnafu {
                initial: self.initial_size(),
                max: self.max_size,
            }
        );
        Ok(())
    }
}

/// A block as seen from outside the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Header address.
    pub addr: usize,
    /// Total size including header and footer.
    pub size: usize,
    pub hole: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub free_blocks: usize,
    pub free_bytes: usize,
    pub used_blocks: usize,
    pub used_bytes: usize,
}

/// The kernel heap.
///
/// Owns the mapped heap range, the free list and the platform it reports
/// through. `allocate` and `release` each run as one critical section.
pub struct Heap<P>
where
    P: Platform,
{
    region: Region,
    max_end: usize,
    free_list: FreeList,
    platform: P,
}

unsafe impl<P> Send for Heap<P> where P: Platform + Send {}

impl<P> Heap<P>
where
    P: Platform,
{
    /// Maps the initial heap range and seeds it with one free block.
    pub fn init(mut platform: P, config: &HeapConfig) -> Result<Self, InitError> {
        config.validate()?;
        let size = config.initial_size();
        let base = platform
            .map_range(config.base, config.initial_pages)
            .context(MapSnafu)?;
        ensure!(
            base.addr().get() == config.base,
            RelocatedSnafu {
                expected: config.base,
                found: base.addr().get(),
            }
        );

        // SAFETY: the backing layer just mapped `size` bytes at `base` for us.
        let region = unsafe { Region::new(base.as_ptr(), size) };
        let mut heap = Self {
            region,
            max_end: config.base + config.max_size,
            free_list: FreeList::new(),
            platform,
        };

        unsafe {
            let block = Block::write(&heap.region, region.start(), size, false);
            heap.release(block.payload());
        }

        info!(
            "kernel heap: {:#x}..{:#x} ({} KiB mapped, up to {:#x})",
            heap.start(),
            heap.end(),
            size / 1024,
            heap.max_end
        );
        Ok(heap)
    }

    /// Allocates at least `size` bytes.
    ///
    /// Returns `None` for `size == 0` and when no free block is large
    /// enough. The payload is aligned to [`GRANULARITY`].
    pub fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        let _critical = CriticalSection::<P>::enter();

        let Some(block_size) = block_size_for(size) else {
            warn!("allocation of {size} bytes overflows the block size");
            return None;
        };

        let result = unsafe { self.try_allocate(block_size) };
        let block = match result {
            Ok(Some(block)) => block,
            Ok(None) => {
                debug!("out of heap memory: {size} bytes requested");
                return None;
            }
            Err(fault) => self.fatal(&fault),
        };
        self.self_check();

        trace!(
            "allocate({size}) -> {:#x} (block {:#x}, {} bytes)",
            block.payload().addr(),
            block.addr(),
            block.size()
        );
        NonNull::new(block.payload())
    }

    unsafe fn try_allocate(&mut self, block_size: usize) -> Result<Option<Block>, Corruption> {
        let Some(header) = (unsafe { self.free_list.find_first_fit(block_size) }) else {
            return Ok(None);
        };
        let block = self.region.block(header.addr())?;
        ensure!(block.is_hole(), NotAHoleSnafu { header: block.addr() });

        unsafe { self.free_list.remove(block.header()) };

        let surplus = block.size() - block_size;
        if surplus <= MIN_PAYLOAD {
            block.set_hole(false);
            return Ok(Some(block));
        }

        unsafe {
            let addr = block.addr();
            let used = Block::write(&self.region, addr, block_size, false);
            let rest = Block::write(&self.region, addr + block_size, surplus, true);
            self.free_list.insert(&self.region, rest.header())?;
            Ok(Some(used))
        }
    }

    /// Returns a block obtained from [`allocate`](Self::allocate).
    ///
    /// Any inconsistency found while validating `ptr` (null, misaligned,
    /// outside the heap, broken tags, already free) halts the kernel.
    ///
    /// # Safety
    ///
    /// No reference into the payload may be used after this call.
    pub unsafe fn release(&mut self, ptr: *mut u8) {
        let _critical = CriticalSection::<P>::enter();
        if let Err(fault) = unsafe { self.try_release(ptr) } {
            self.fatal(&fault);
        }
        self.self_check();
    }

    unsafe fn try_release(&mut self, ptr: *mut u8) -> Result<(), Corruption> {
        ensure!(!ptr.is_null(), NullPointerSnafu);
        let addr = ptr.addr();
        ensure!(addr.is_multiple_of(GRANULARITY), MisalignedSnafu { ptr: addr });
        let header = addr
            .checked_sub(HEADER_SIZE)
            .context(HeaderOutOfBoundsSnafu { header: 0_usize })?;

        let block = self.region.block_unlinked(header)?;
        ensure!(!block.is_hole(), DoubleFreeSnafu { header });
        block.check_back_pointer()?;
        ensure!(block.is_detached(), StaleLinksSnafu { header });

        let block = unsafe { self.merge_right(block)? };
        let block = unsafe { self.merge_left(block)? };
        block.set_hole(true);
        unsafe { self.free_list.insert(&self.region, block.header())? };

        trace!(
            "release({addr:#x}) -> hole {:#x} ({} bytes)",
            block.addr(),
            block.size()
        );
        Ok(())
    }

    /// Absorbs the right neighbour of `block` if it is free.
    ///
    /// The header of `block` does not move.
    unsafe fn merge_right(&mut self, block: Block) -> Result<Block, Corruption> {
        let right_addr = block.end();
        if right_addr == self.region.end() {
            return Ok(block);
        }
        let right = self.region.block(right_addr)?;
        if !right.is_hole() {
            return Ok(block);
        }

        unsafe {
            self.free_list.remove(right.header());
            let size = block.size() + right.size();
            self.region
                .erase(block.footer_addr(), FOOTER_SIZE + HEADER_SIZE);
            Ok(Block::write(&self.region, block.addr(), size, block.is_hole()))
        }
    }

    /// Lets a free left neighbour absorb `block`.
    ///
    /// Returns the left neighbour, now spanning both blocks, or `block`
    /// unchanged if there is nothing to merge with.
    unsafe fn merge_left(&mut self, block: Block) -> Result<Block, Corruption> {
        let addr = block.addr();
        if addr < self.region.start() + FOOTER_SIZE {
            // First block of the heap.
            return Ok(block);
        }

        let left_footer = unsafe { self.region.footer_at(addr - FOOTER_SIZE, addr)? };
        let left_addr = unsafe { (*left_footer).header.addr() };
        let left = self.region.block(left_addr)?;
        ensure!(left.end() == addr, GapSnafu { header: left_addr });
        if !left.is_hole() {
            return Ok(block);
        }

        unsafe {
            self.free_list.remove(left.header());
            let size = left.size() + block.size();
            self.region
                .erase(left.footer_addr(), FOOTER_SIZE + HEADER_SIZE);
            Ok(Block::write(&self.region, left_addr, size, block.is_hole()))
        }
    }

    /// Dumps the heap and the offending block, then halts for good.
    fn fatal(&mut self, fault: &Corruption) -> ! {
        let _ = P::disable();
        error!("kernel heap corruption: {fault} (at {})", fault.location());
        let snapshot = self.snapshot();
        diagnostic::dump(&mut self.platform, &self.region, &snapshot, fault);
        P::halt()
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            start: self.start(),
            end: self.end(),
            max_end: self.max_end,
            head: self.free_list.head().addr(),
            shortcuts: self.free_list.shortcuts().map(<*mut Header>::addr),
        }
    }

    fn self_check(&mut self) {
        if !cfg!(feature = "self-check") {
            return;
        }
        if let Err(fault) = self.verify() {
            self.fatal(&fault);
        }
    }

    /// Checks every structural invariant of the heap.
    ///
    /// Walks the blocks in address order and the free list in size order
    /// and cross-checks the two, including every shortcut pointer.
    pub fn verify(&self) -> Result<HeapStats, Corruption> {
        let mut stats = HeapStats::default();
        let mut addr = self.region.start();
        let mut previous_hole = None;
        while addr < self.region.end() {
            let block = self.region.block(addr)?;
            if block.is_hole() {
                ensure!(
                    previous_hole.is_none(),
                    UncoalescedSnafu {
                        header: previous_hole.unwrap_or(addr),
                    }
                );
                previous_hole = Some(addr);
                stats.free_blocks += 1;
                stats.free_bytes += block.size();
            } else {
                ensure!(block.is_detached(), StaleLinksSnafu { header: addr });
                previous_hole = None;
                stats.used_blocks += 1;
                stats.used_bytes += block.size();
            }
            addr = block.end();
        }
        ensure!(addr == self.region.end(), GapSnafu { header: addr });

        let mut expected_shortcuts = [ptr::null_mut::<Header>(); SHORTCUT_COUNT];
        let mut prev = ptr::null_mut::<Header>();
        let mut prev_size = 0;
        let mut listed = 0;
        let mut current = self.free_list.head();
        while !current.is_null() {
            // More entries than holes means the list loops or leaks.
            ensure!(
                listed < stats.free_blocks,
                BadLinkSnafu {
                    header: prev.addr(),
                    link: current.addr(),
                }
            );
            let block = self.region.block(current.addr())?;
            ensure!(block.is_hole(), NotAHoleSnafu { header: block.addr() });
            let (back, next, size) =
                unsafe { ((*current).prev, (*current).next, (*current).size) };
            ensure!(
                ptr::eq(back, prev),
                BadLinkSnafu {
                    header: block.addr(),
                    link: back.addr(),
                }
            );
            ensure!(
                size >= prev_size,
                UnsortedSnafu {
                    header: block.addr(),
                }
            );
            for (expected, &threshold) in expected_shortcuts.iter_mut().zip(&SHORTCUT_THRESHOLDS) {
                if expected.is_null() && size >= threshold {
                    *expected = current;
                }
            }
            listed += 1;
            prev = current;
            prev_size = size;
            current = next;
        }
        ensure!(
            listed == stats.free_blocks,
            UnlistedSnafu {
                header: self.first_unlisted_hole().unwrap_or(0),
            }
        );

        let shortcuts = self.free_list.shortcuts();
        for (index, (&expected, &found)) in expected_shortcuts.iter().zip(&shortcuts).enumerate() {
            ensure!(
                ptr::eq(expected, found),
                ShortcutSnafu {
                    index,
                    header: expected.addr(),
                    found: found.addr(),
                }
            );
        }
        Ok(stats)
    }

    fn first_unlisted_hole(&self) -> Option<usize> {
        self.blocks()
            .filter(|block| block.hole)
            .find(|hole| self.free_blocks().all(|listed| listed.addr != hole.addr))
            .map(|hole| hole.addr)
    }

    /// Tallies free and allocated blocks.
    pub fn stats(&self) -> HeapStats {
        self.blocks().fold(HeapStats::default(), |mut stats, block| {
            if block.hole {
                stats.free_blocks += 1;
                stats.free_bytes += block.size;
            } else {
                stats.used_blocks += 1;
                stats.used_bytes += block.size;
            }
            stats
        })
    }

    /// Iterates all blocks in address order.
    ///
    /// Iteration stops early at the first block whose tags fail validation.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        let mut addr = self.region.start();
        core::iter::from_fn(move || {
            if addr >= self.region.end() {
                return None;
            }
            let block = self.region.block(addr).ok()?;
            addr = block.end();
            Some(BlockInfo {
                addr: block.addr(),
                size: block.size(),
                hole: block.is_hole(),
            })
        })
    }

    /// Iterates the free list from smallest to largest block.
    pub fn free_blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        unsafe { self.free_list.iter() }.map(|header| unsafe {
            BlockInfo {
                addr: header.addr(),
                size: (*header).size,
                hole: (*header).hole != 0,
            }
        })
    }

    /// Header addresses of the shortcut targets, smallest threshold first.
    pub fn shortcuts(&self) -> [Option<usize>; SHORTCUT_COUNT] {
        self.free_list
            .shortcuts()
            .map(|header| (!header.is_null()).then_some(header.addr()))
    }

    pub fn start(&self) -> usize {
        self.region.start()
    }

    pub fn end(&self) -> usize {
        self.region.end()
    }

    /// End address the heap range could grow to.
    pub fn max_end(&self) -> usize {
        self.max_end
    }
}
