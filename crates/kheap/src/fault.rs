//! Error types.
//!
//! The heap distinguishes two disjoint classes of failure. Running out of
//! space is not an error at all: [`Heap::allocate`](crate::Heap::allocate)
//! simply returns `None`. Everything else is a [`Corruption`], a broken
//! structural invariant that the heap never tries to repair; the public
//! operations hand it to the fatal path, which dumps state and halts.

use core::fmt;

use snafu::{GenerateImplicitData, Snafu};

use crate::layout::{GRANULARITY, PAGE_SIZE};

/// Source location at which a check fired.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location(&'static core::panic::Location<'static>);

impl Default for Location {
    #[track_caller]
    fn default() -> Self {
        Self(core::panic::Location::caller())
    }
}

impl GenerateImplicitData for Location {
    #[track_caller]
    fn generate() -> Self {
        Self::default()
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// A violated heap invariant.
///
/// Every variant records the header address of the block that failed the
/// check (zero when no block could be located) and where the check fired.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Corruption {
    #[snafu(display("release of a null pointer"))]
    NullPointer {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("pointer {ptr:#x} is not aligned to {GRANULARITY} bytes"))]
    Misaligned {
        ptr: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("header {header:#x} lies outside the heap"))]
    HeaderOutOfBounds {
        header: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("header {header:#x} has bad magic {found:#010x}"))]
    HeaderMagic {
        header: usize,
        found: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("block {header:#x} has invalid size {size:#x}"))]
    BadSize {
        header: usize,
        size: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("footer {footer:#x} of block {header:#x} lies outside the heap"))]
    FooterOutOfBounds {
        header: usize,
        footer: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("footer {footer:#x} of block {header:#x} has bad magic {found:#010x}"))]
    FooterMagic {
        header: usize,
        footer: usize,
        found: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("footer {footer:#x} of block {header:#x} has non-zero padding {found:#x}"))]
    FooterPadding {
        header: usize,
        footer: usize,
        found: u32,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("footer {footer:#x} points back to {found:#x} instead of {header:#x}"))]
    BackPointer {
        header: usize,
        footer: usize,
        found: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("double free of block {header:#x}"))]
    DoubleFree {
        header: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("allocated block {header:#x} still carries free-list links"))]
    StaleLinks {
        header: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free-list entry {header:#x} is not a hole"))]
    NotAHole {
        header: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("block {header:#x} is already linked into the free list"))]
    AlreadyLinked {
        header: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free-list link {link:#x} of block {header:#x} is invalid"))]
    BadLink {
        header: usize,
        link: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("free list is out of order at block {header:#x}"))]
    Unsorted {
        header: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display(
        "shortcut #{index} points to {found:#x}, first qualifying block is {header:#x}"
    ))]
    Shortcut {
        index: usize,
        header: usize,
        found: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("block {header:#x} does not end where its neighbour begins"))]
    Gap {
        header: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("holes {header:#x} and its right neighbour were not coalesced"))]
    Uncoalesced {
        header: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("hole {header:#x} is not reachable from the free list"))]
    Unlisted {
        header: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

impl Corruption {
    /// Header address of the block that failed the check.
    #[must_use]
    pub fn header(&self) -> usize {
        match *self {
            Self::NullPointer { .. } => 0,
            Self::Misaligned { ptr, .. } => ptr,
            Self::HeaderOutOfBounds { header, .. }
            | Self::HeaderMagic { header, .. }
            | Self::BadSize { header, .. }
            | Self::FooterOutOfBounds { header, .. }
            | Self::FooterMagic { header, .. }
            | Self::FooterPadding { header, .. }
            | Self::BackPointer { header, .. }
            | Self::DoubleFree { header, .. }
            | Self::StaleLinks { header, .. }
            | Self::NotAHole { header, .. }
            | Self::AlreadyLinked { header, .. }
            | Self::BadLink { header, .. }
            | Self::Unsorted { header, .. }
            | Self::Shortcut { header, .. }
            | Self::Gap { header, .. }
            | Self::Uncoalesced { header, .. }
            | Self::Unlisted { header, .. } => header,
        }
    }

    /// Where the check fired.
    #[must_use]
    pub fn location(&self) -> Location {
        match *self {
            Self::NullPointer { location }
            | Self::Misaligned { location, .. }
            | Self::HeaderOutOfBounds { location, .. }
            | Self::HeaderMagic { location, .. }
            | Self::BadSize { location, .. }
            | Self::FooterOutOfBounds { location, .. }
            | Self::FooterMagic { location, .. }
            | Self::FooterPadding { location, .. }
            | Self::BackPointer { location, .. }
            | Self::DoubleFree { location, .. }
            | Self::StaleLinks { location, .. }
            | Self::NotAHole { location, .. }
            | Self::AlreadyLinked { location, .. }
            | Self::BadLink { location, .. }
            | Self::Unsorted { location, .. }
            | Self::Shortcut { location, .. }
            | Self::Gap { location, .. }
            | Self::Uncoalesced { location, .. }
            | Self::Unlisted { location, .. } => location,
        }
    }
}

/// Failure reported by the backing memory layer.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MapError {
    #[snafu(display("range {virt:#x} (+{page_count} pages) is outside the mappable window"))]
    OutOfRange {
        virt: usize,
        page_count: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("no physical memory left for {page_count} pages"))]
    OutOfMemory {
        page_count: usize,
        #[snafu(implicit)]
        location: Location,
    },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum InitError {
    #[snafu(display("heap base {base:#x} is not aligned to {PAGE_SIZE} bytes"))]
    MisalignedBase {
        base: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("initial heap region is empty"))]
    EmptyRegion {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("initial heap size {initial:#x} exceeds maximum {max:#x}"))]
    ExceedsMaximum {
        initial: usize,
        max: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("failed to map the initial heap region: {source}"))]
    Map {
        #[snafu(source)]
        source: MapError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("backing layer mapped {found:#x} instead of {expected:#x}"))]
    Relocated {
        expected: usize,
        found: usize,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("kernel heap is already initialized"))]
    AlreadyInitialized {
        #[snafu(implicit)]
        location: Location,
    },
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::string::ToString as _;

    use super::*;

    #[test]
    fn test_header_of_each_class() {
        assert_eq!(NullPointerSnafu.build().header(), 0);
        assert_eq!(MisalignedSnafu { ptr: 0x1003_usize }.build().header(), 0x1003);
        let err = BackPointerSnafu {
            header: 0x2000_usize,
            footer: 0x2070_usize,
            found: 0x1000_usize,
        }
        .build();
        assert_eq!(err.header(), 0x2000);
        assert_eq!(
            err.to_string(),
            "footer 0x2070 points back to 0x1000 instead of 0x2000"
        );
    }

    #[test]
    fn test_location_points_at_check() {
        let err = DoubleFreeSnafu { header: 0x40_usize }.build();
        assert!(err.location().to_string().contains("fault.rs"));
        assert_eq!(err.to_string(), "double free of block 0x40");
    }

    #[test]
    fn test_init_error_chains_map_error() {
        let source = OutOfMemorySnafu { page_count: 4_usize }.build();
        let err = InitError::Map {
            source,
            location: Location::default(),
        };
        assert_eq!(
            err.to_string(),
            "failed to map the initial heap region: no physical memory left for 4 pages"
        );
        assert!(core::error::Error::source(&err).is_some());
    }
}
