//! Block record: the header/footer pair bracketing every heap block.
//!
//! All access to tags goes through [`Region`], which owns the provenance of
//! the mapped heap range and validates a tag before handing out a pointer
//! to it. A [`Block`] is only ever obtained from a checked constructor (or
//! freshly written by [`Block::write`]), so code holding one can rely on
//! the header and footer agreeing with each other.

use core::ptr;

use snafu::ensure;

use crate::{
    fault::{
        BackPointerSnafu, BadSizeSnafu, Corruption, FooterMagicSnafu, FooterOutOfBoundsSnafu,
        FooterPaddingSnafu, HeaderMagicSnafu, HeaderOutOfBoundsSnafu,
    },
    layout::{FOOTER_SIZE, GRANULARITY, HEADER_SIZE, MAGIC, OVERHEAD},
};

/// Tag at the start of every block.
///
/// `prev` and `next` are only meaningful while the block is a hole and are
/// kept null while it is allocated.
#[repr(C, align(8))]
#[derive(Debug)]
pub(crate) struct Header {
    pub(crate) magic: u32,
    /// 1 while the block is free, 0 while it is allocated.
    pub(crate) hole: u32,
    /// Total block size: header, payload and footer.
    pub(crate) size: usize,
    pub(crate) prev: *mut Header,
    pub(crate) next: *mut Header,
}

/// Tag at the end of every block, pointing back at its header.
#[repr(C, align(8))]
#[derive(Debug)]
pub(crate) struct Footer {
    pub(crate) magic: u32,
    pub(crate) padding: u32,
    pub(crate) header: *mut Header,
}

/// The mapped heap range `start..end`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Region {
    base: *mut u8,
    start: usize,
    end: usize,
}

impl Region {
    /// # Safety
    ///
    /// `base..base + size` must be valid for reads and writes for as long as
    /// the region is used and must not be accessed by anything else.
    pub(crate) unsafe fn new(base: *mut u8, size: usize) -> Self {
        let start = base.addr();
        Self {
            base,
            start,
            end: start + size,
        }
    }

    pub(crate) fn start(&self) -> usize {
        self.start
    }

    pub(crate) fn end(&self) -> usize {
        self.end
    }

    /// Returns whether `addr..addr + len` lies within the region.
    pub(crate) fn contains(&self, addr: usize, len: usize) -> bool {
        addr >= self.start && addr.checked_add(len).is_some_and(|end| end <= self.end)
    }

    pub(crate) fn ptr<T>(&self, addr: usize) -> *mut T {
        debug_assert!(self.contains(addr, 0));
        self.base.with_addr(addr).cast()
    }

    /// Returns a header pointer for `addr` after checking bounds, alignment
    /// and magic.
    pub(crate) fn header(&self, addr: usize) -> Result<*mut Header, Corruption> {
        ensure!(
            self.contains(addr, HEADER_SIZE) && addr.is_multiple_of(GRANULARITY),
            HeaderOutOfBoundsSnafu { header: addr }
        );
        let header = self.ptr::<Header>(addr);
        let magic = unsafe { (*header).magic };
        ensure!(magic == MAGIC, HeaderMagicSnafu { header: addr, found: magic });
        Ok(header)
    }

    /// Returns the footer belonging to `header` after checking that it lies
    /// after the header, inside the region, with intact magic and padding.
    ///
    /// # Safety
    ///
    /// `header` must have been returned by [`Region::header`].
    pub(crate) unsafe fn footer(&self, header: *mut Header) -> Result<*mut Footer, Corruption> {
        let header_addr = header.addr();
        let size = unsafe { (*header).size };
        ensure!(
            size >= OVERHEAD && size.is_multiple_of(GRANULARITY),
            BadSizeSnafu {
                header: header_addr,
                size,
            }
        );
        let footer_addr = header_addr.wrapping_add(size - FOOTER_SIZE);
        ensure!(
            footer_addr >= header_addr + HEADER_SIZE && self.contains(footer_addr, FOOTER_SIZE),
            FooterOutOfBoundsSnafu {
                header: header_addr,
                footer: footer_addr,
            }
        );
        unsafe { self.footer_at(footer_addr, header_addr) }
    }

    /// Returns the footer at `footer_addr` after checking bounds, magic and
    /// padding. `header_addr` is only used for reporting.
    pub(crate) unsafe fn footer_at(
        &self,
        footer_addr: usize,
        header_addr: usize,
    ) -> Result<*mut Footer, Corruption> {
        ensure!(
            self.contains(footer_addr, FOOTER_SIZE) && footer_addr.is_multiple_of(GRANULARITY),
            FooterOutOfBoundsSnafu {
                header: header_addr,
                footer: footer_addr,
            }
        );
        let footer = self.ptr::<Footer>(footer_addr);
        let (magic, padding) = unsafe { ((*footer).magic, (*footer).padding) };
        ensure!(
            magic == MAGIC,
            FooterMagicSnafu {
                header: header_addr,
                footer: footer_addr,
                found: magic,
            }
        );
        ensure!(
            padding == 0,
            FooterPaddingSnafu {
                header: header_addr,
                footer: footer_addr,
                found: padding,
            }
        );
        Ok(footer)
    }

    /// Fully validated view of the block whose header is at `addr`.
    pub(crate) fn block(&self, addr: usize) -> Result<Block, Corruption> {
        let block = self.block_unlinked(addr)?;
        block.check_back_pointer()?;
        Ok(block)
    }

    /// Like [`Region::block`] but leaves the footer back-pointer unchecked.
    pub(crate) fn block_unlinked(&self, addr: usize) -> Result<Block, Corruption> {
        let header = self.header(addr)?;
        let footer = unsafe { self.footer(header)? };
        Ok(Block { header, footer })
    }

    /// Zeroes `len` bytes at `addr`.
    ///
    /// # Safety
    ///
    /// The bytes must not belong to any live tag or payload.
    pub(crate) unsafe fn erase(&self, addr: usize, len: usize) {
        debug_assert!(self.contains(addr, len));
        unsafe { ptr::write_bytes(self.ptr::<u8>(addr), 0, len) };
    }
}

/// A header/footer pair that has passed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Block {
    header: *mut Header,
    footer: *mut Footer,
}

impl Block {
    /// Builds a fresh header/footer pair for a block of `size` bytes at
    /// `addr`, with cleared free-list links.
    ///
    /// # Safety
    ///
    /// `addr..addr + size` must lie inside `region` and must not overlap any
    /// other live block.
    pub(crate) unsafe fn write(region: &Region, addr: usize, size: usize, hole: bool) -> Self {
        debug_assert!(size >= OVERHEAD && size.is_multiple_of(GRANULARITY));
        debug_assert!(region.contains(addr, size));
        let header = region.ptr::<Header>(addr);
        let footer = region.ptr::<Footer>(addr + size - FOOTER_SIZE);
        unsafe {
            header.write(Header {
                magic: MAGIC,
                hole: u32::from(hole),
                size,
                prev: ptr::null_mut(),
                next: ptr::null_mut(),
            });
            footer.write(Footer {
                magic: MAGIC,
                padding: 0,
                header,
            });
        }
        Self { header, footer }
    }

    pub(crate) fn check_back_pointer(&self) -> Result<(), Corruption> {
        let found = unsafe { (*self.footer).header };
        ensure!(
            ptr::eq(found, self.header),
            BackPointerSnafu {
                header: self.header.addr(),
                footer: self.footer.addr(),
                found: found.addr(),
            }
        );
        Ok(())
    }

    pub(crate) fn header(&self) -> *mut Header {
        self.header
    }

    pub(crate) fn addr(&self) -> usize {
        self.header.addr()
    }

    pub(crate) fn footer_addr(&self) -> usize {
        self.footer.addr()
    }

    /// Address of the byte just past the footer.
    pub(crate) fn end(&self) -> usize {
        self.footer.addr() + FOOTER_SIZE
    }

    pub(crate) fn size(&self) -> usize {
        unsafe { (*self.header).size }
    }

    pub(crate) fn is_hole(&self) -> bool {
        unsafe { (*self.header).hole != 0 }
    }

    pub(crate) fn set_hole(&self, hole: bool) {
        unsafe { (*self.header).hole = u32::from(hole) };
    }

    /// Returns whether both free-list links are null.
    pub(crate) fn is_detached(&self) -> bool {
        unsafe { (*self.header).prev.is_null() && (*self.header).next.is_null() }
    }

    pub(crate) fn payload(&self) -> *mut u8 {
        unsafe { self.header.cast::<u8>().add(HEADER_SIZE) }
    }
}
