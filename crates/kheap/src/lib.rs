//! Boundary-tag kernel heap.
//!
//! This crate provides the general-purpose dynamic memory allocator of the
//! kernel: variable-size blocks carved out of one contiguous, page-mapped
//! virtual range. It is `no_std`, never allocates itself and talks to the
//! rest of the kernel only through the traits in [`platform`].
//!
//! # Block Layout
//!
//! Every block, free or allocated, is bracketed by a header and a footer
//! (see [`layout`]). The header records the block size and whether the block
//! is a *hole*; the footer points back at the header, so both neighbours of
//! any block can be found in constant time. Both tags carry [`MAGIC`] and are
//! validated whenever the heap reads them.
//!
//! # Free List
//!
//! Holes are kept in one doubly linked list sorted by ascending size, so the
//! first fit found is also the best fit. Four shortcut pointers remember the
//! first hole of at least 512, 1024, 4096 and 16384 bytes and let searches
//! for large blocks skip the small ones.
//!
//! # Failure Model
//!
//! - Running out of space is ordinary: [`Heap::allocate`] returns `None`.
//! - Any inconsistency (a foreign or misaligned pointer, a double free,
//!   trampled tags, a broken list) is a [`Corruption`]. The heap never tries
//!   to recover from one. It masks interrupts, paints a dump of its state on
//!   the [`Console`] and halts the hart.
//!
//! # Usage
//!
//! ```rust,ignore
//! use kheap::{HeapConfig, LockedHeap};
//!
//! #[global_allocator]
//! static HEAP: LockedHeap<KernelPlatform> = LockedHeap::new();
//!
//! const CONFIG: HeapConfig = HeapConfig::new(0x8400_0000, 256, 48 << 20);
//!
//! fn init() {
//!     HEAP.init(KernelPlatform, &CONFIG).unwrap();
//! }
//! ```
//!
//! # Features
//!
//! - `self-check`: run [`Heap::verify`] after every allocation and release
//!   and treat any finding as fatal.

#![no_std]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod block;
mod diagnostic;
mod fault;
mod free_list;
mod global;
mod heap;
pub mod layout;
pub mod platform;
#[cfg(test)]
mod testing;

pub use self::{
    fault::{Corruption, InitError, Location, MapError, OutOfMemorySnafu, OutOfRangeSnafu},
    global::LockedHeap,
    heap::{BlockInfo, Heap, HeapConfig, HeapStats},
    layout::{GRANULARITY, MAGIC, MIN_PAYLOAD, PAGE_SIZE, SHORTCUT_COUNT, SHORTCUT_THRESHOLDS},
    platform::{Backing, Console, ConsoleWriter, CriticalSection, Interrupts, Platform},
};
