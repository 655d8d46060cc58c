//! Layout constants shared by every part of the heap.
//!
//! Each block is bracketed by a [`Header`] and a [`Footer`]; the payload
//! handed to clients sits between them:
//!
//! ```text
//! ┌────────────────────────────┬───────────────────┬──────────────────────┐
//! │ Header (HEADER_SIZE)       │ Payload           │ Footer (FOOTER_SIZE) │
//! │ magic | hole | size        │ >= MIN_PAYLOAD    │ magic | padding      │
//! │ prev  | next               │                   │ header               │
//! └────────────────────────────┴───────────────────┴──────────────────────┘
//! ^ header address                                   header + size ^
//! ```

use crate::block::{Footer, Header};

/// Every block size and every payload address is a multiple of this.
pub const GRANULARITY: usize = 8;

/// Smallest payload handed out; smaller requests are raised to it.
pub const MIN_PAYLOAD: usize = 64;

/// Size of one page of the backing memory layer.
pub const PAGE_SIZE: usize = 4096;

/// Sentinel stored in every header and footer.
pub const MAGIC: u32 = 0xBAB6_BADC;

/// Size classes tracked by the free-list shortcut pointers.
pub const SHORTCUT_THRESHOLDS: [usize; SHORTCUT_COUNT] = [512, 1024, 4096, 16 * 1024];

/// Number of shortcut pointers.
pub const SHORTCUT_COUNT: usize = 4;

pub const HEADER_SIZE: usize = size_of::<Header>();
pub const FOOTER_SIZE: usize = size_of::<Footer>();

/// Bytes of bookkeeping carried by every block.
pub const OVERHEAD: usize = HEADER_SIZE + FOOTER_SIZE;

/// Size of the block produced by the smallest non-zero request.
pub const MIN_BLOCK_SIZE: usize = (MIN_PAYLOAD + OVERHEAD).next_multiple_of(GRANULARITY);

const _: () = assert!(HEADER_SIZE.is_multiple_of(GRANULARITY));
const _: () = assert!(FOOTER_SIZE.is_multiple_of(GRANULARITY));
const _: () = assert!(align_of::<Header>() <= GRANULARITY);
const _: () = assert!(PAGE_SIZE.is_multiple_of(GRANULARITY));
const _: () = assert!(MIN_BLOCK_SIZE <= PAGE_SIZE);

/// Returns the total block size needed to serve a `request`-byte payload.
///
/// The payload is raised to [`MIN_PAYLOAD`], rounded up to
/// [`GRANULARITY`] and padded with [`OVERHEAD`]. Returns `None` if the
/// result does not fit in `usize`.
#[must_use]
pub fn block_size_for(request: usize) -> Option<usize> {
    request
        .max(MIN_PAYLOAD)
        .checked_next_multiple_of(GRANULARITY)?
        .checked_add(OVERHEAD)
}

/// Returns the index of the largest shortcut threshold that `size` meets.
#[must_use]
pub fn size_class(size: usize) -> Option<usize> {
    SHORTCUT_THRESHOLDS
        .iter()
        .rposition(|&threshold| threshold <= size)
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimum_clamp() {
        assert_eq!(block_size_for(1), Some(MIN_BLOCK_SIZE));
        assert_eq!(block_size_for(MIN_PAYLOAD), Some(MIN_BLOCK_SIZE));
        assert_eq!(MIN_BLOCK_SIZE, MIN_PAYLOAD + OVERHEAD);
        assert_eq!(MIN_BLOCK_SIZE - OVERHEAD, MIN_PAYLOAD);
    }

    #[test]
    fn test_granularity_rounding() {
        assert_eq!(block_size_for(65), Some(72 + OVERHEAD));
        assert_eq!(block_size_for(72), Some(72 + OVERHEAD));
        assert_eq!(block_size_for(73), Some(80 + OVERHEAD));
        for request in 1..2048 {
            let size = block_size_for(request).unwrap();
            assert!(size.is_multiple_of(GRANULARITY));
            assert!(size - OVERHEAD >= request);
        }
    }

    #[test]
    fn test_overflow() {
        assert_eq!(block_size_for(usize::MAX), None);
        assert_eq!(block_size_for(usize::MAX - OVERHEAD), None);
    }

    #[test]
    fn test_size_class_boundaries() {
        assert_eq!(size_class(0), None);
        assert_eq!(size_class(511), None);
        assert_eq!(size_class(512), Some(0));
        assert_eq!(size_class(1023), Some(0));
        assert_eq!(size_class(1024), Some(1));
        assert_eq!(size_class(4096), Some(2));
        assert_eq!(size_class(16 * 1024 - 8), Some(2));
        assert_eq!(size_class(16 * 1024), Some(3));
        assert_eq!(size_class(usize::MAX), Some(3));
    }
}
