//! Placement of the kernel heap and the platform it runs on.
//!
//! Paging stays off, so virtual addresses equal physical ones and "mapping"
//! a heap page means handing out a fresh, zeroed RAM frame above the kernel
//! image.

use core::{ops::Range, ptr::NonNull};

use ansi_term::Color;
use kheap::{
    Backing, Console, HeapConfig, HeapStats, InitError, Interrupts, LockedHeap, MapError,
    OutOfMemorySnafu, OutOfRangeSnafu, PAGE_SIZE,
};
use log::debug;
use snafu::{OptionExt as _, ensure};

use crate::{console::KernelConsole, interrupt::KernelInterrupts};

pub mod layout;

pub const HEAP_BASE: usize = 0x8400_0000;
pub const HEAP_INITIAL_PAGES: usize = 256;
pub const HEAP_MAX_SIZE: usize = 48 * 1024 * 1024;

const _: () = assert!(HEAP_BASE.is_multiple_of(PAGE_SIZE));
const _: () = assert!(layout::RAM.start <= HEAP_BASE);
const _: () = assert!(HEAP_BASE + HEAP_MAX_SIZE <= layout::RAM.end);

const HEAP_CONFIG: HeapConfig = HeapConfig::new(HEAP_BASE, HEAP_INITIAL_PAGES, HEAP_MAX_SIZE);

#[cfg_attr(target_os = "none", global_allocator)]
pub static HEAP: LockedHeap<KernelPlatform> = LockedHeap::new();

pub fn init() -> Result<(), InitError> {
    let image = layout::kernel_addr_range();
    debug!("kernel image: {:#x}..{:#x}", image.start, image.end);
    let frames = image.end.next_multiple_of(PAGE_SIZE).max(layout::RAM.start)..layout::RAM.end;
    let platform = KernelPlatform {
        backing: IdentityBacking::new(frames),
        console: KernelConsole,
    };
    HEAP.init(platform, &HEAP_CONFIG)
}

pub fn heap_stats() -> Option<HeapStats> {
    HEAP.with(|heap| heap.stats())
}

/// Hands out identity-mapped RAM frames, each at most once.
#[derive(Debug)]
pub struct IdentityBacking {
    free: Range<usize>,
}

impl IdentityBacking {
    fn new(free: Range<usize>) -> Self {
        Self { free }
    }

    /// Claims the frames for `page_count` pages at `virt`.
    ///
    /// Frames are handed out in ascending order and never returned, so a
    /// request must start at or above the first unclaimed frame.
    fn reserve(&mut self, virt: usize, page_count: usize) -> Result<Range<usize>, MapError> {
        ensure!(
            virt.is_multiple_of(PAGE_SIZE) && self.free.start <= virt && virt <= self.free.end,
            OutOfRangeSnafu { virt, page_count }
        );
        let end = page_count
            .checked_mul(PAGE_SIZE)
            .and_then(|len| virt.checked_add(len))
            .context(OutOfMemorySnafu { page_count })?;
        ensure!(end <= self.free.end, OutOfMemorySnafu { page_count });

        self.free.start = end;
        Ok(virt..end)
    }
}

impl Backing for IdentityBacking {
    fn map_range(&mut self, virt: usize, page_count: usize) -> Result<NonNull<u8>, MapError> {
        let frames = self.reserve(virt, page_count)?;
        let base = NonNull::new(core::ptr::with_exposed_provenance_mut::<u8>(frames.start))
            .context(OutOfRangeSnafu { virt, page_count })?;
        unsafe { base.as_ptr().write_bytes(0, frames.len()) };
        debug!("mapped {page_count} pages at {virt:#x}");
        Ok(base)
    }
}

/// Everything the kernel heap needs, bundled for [`LockedHeap`].
#[derive(Debug)]
pub struct KernelPlatform {
    backing: IdentityBacking,
    console: KernelConsole,
}

impl Backing for KernelPlatform {
    fn map_range(&mut self, virt: usize, page_count: usize) -> Result<NonNull<u8>, MapError> {
        self.backing.map_range(virt, page_count)
    }
}

impl Console for KernelPlatform {
    fn clear_screen(&mut self) {
        self.console.clear_screen();
    }

    fn set_color(&mut self, fg: Color, bg: Color) {
        self.console.set_color(fg, bg);
    }

    fn print_str(&mut self, s: &str) {
        self.console.print_str(s);
    }

    fn print_hex_word(&mut self, value: u16) {
        self.console.print_hex_word(value);
    }
}

impl Interrupts for KernelPlatform {
    type State = <KernelInterrupts as Interrupts>::State;

    fn disable() -> Self::State {
        KernelInterrupts::disable()
    }

    fn restore(state: Self::State) {
        KernelInterrupts::restore(state);
    }

    fn halt() -> ! {
        KernelInterrupts::halt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAMES: Range<usize> = 0x8400_0000..0x8400_4000;

    #[test]
    fn test_reserve_hands_out_frames_once() {
        let mut backing = IdentityBacking::new(FRAMES);
        assert_eq!(backing.reserve(0x8400_0000, 1).unwrap(), 0x8400_0000..0x8400_1000);
        assert_eq!(backing.reserve(0x8400_1000, 2).unwrap(), 0x8400_1000..0x8400_3000);
        assert!(matches!(
            backing.reserve(0x8400_0000, 1),
            Err(MapError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_reserve_reports_exhaustion() {
        let mut backing = IdentityBacking::new(FRAMES);
        backing.reserve(0x8400_0000, 3).unwrap();
        assert!(matches!(
            backing.reserve(0x8400_3000, 2),
            Err(MapError::OutOfMemory { page_count: 2, .. })
        ));
        assert!(matches!(
            backing.reserve(0x8400_3000, usize::MAX),
            Err(MapError::OutOfMemory { .. })
        ));
        assert_eq!(backing.reserve(0x8400_3000, 1).unwrap(), 0x8400_3000..0x8400_4000);
        assert!(matches!(
            backing.reserve(0x8400_4000, 1),
            Err(MapError::OutOfMemory { page_count: 1, .. })
        ));
    }

    #[test]
    fn test_reserve_rejects_addresses_outside_window() {
        let mut backing = IdentityBacking::new(FRAMES);
        for virt in [0x8300_0000, 0x8400_0800, 0x8400_5000] {
            assert!(matches!(
                backing.reserve(virt, 1),
                Err(MapError::OutOfRange { .. })
            ));
        }
        assert_eq!(backing.reserve(0x8400_0000, 4).unwrap(), FRAMES);
    }
}
