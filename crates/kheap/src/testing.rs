//! Fixtures shared by the unit tests.
//!
//! [`TestArena`] stands in for the backing memory layer: a page-aligned
//! buffer from the host allocator. [`TestPlatform`] maps it, records console
//! output and interrupt state in thread-locals, and turns `halt` into a
//! panic carrying everything printed so far.

extern crate alloc;
extern crate std;

use alloc::string::String;
use core::{
    alloc::Layout,
    cell::{Cell, RefCell},
    fmt::Write as _,
    ptr::NonNull,
};

use ansi_term::{Attr, Color};
use snafu::ensure;

use crate::{
    fault::{MapError, OutOfRangeSnafu},
    heap::HeapConfig,
    layout::PAGE_SIZE,
    platform::{Backing, Console, Interrupts},
};

std::thread_local! {
    static INTERRUPTS_ENABLED: Cell<bool> = const { Cell::new(true) };
    static CONSOLE: RefCell<String> = const { RefCell::new(String::new()) };
}

pub(crate) fn interrupts_enabled() -> bool {
    INTERRUPTS_ENABLED.get()
}

pub(crate) fn console_output() -> String {
    CONSOLE.with_borrow(Clone::clone)
}

pub(crate) struct TestArena {
    base: NonNull<u8>,
    pages: usize,
    layout: Layout,
}

impl TestArena {
    pub(crate) fn new(pages: usize) -> Self {
        let layout = Layout::from_size_align(pages * PAGE_SIZE, PAGE_SIZE).unwrap();
        let base = unsafe { alloc::alloc::alloc(layout) };
        let base = NonNull::new(base).unwrap();
        unsafe { base.as_ptr().write_bytes(0x11, layout.size()) };
        Self {
            base,
            pages,
            layout,
        }
    }

    pub(crate) fn base(&self) -> usize {
        self.base.addr().get()
    }

    pub(crate) fn config(&self) -> HeapConfig {
        HeapConfig::new(self.base(), self.pages, self.layout.size() * 4)
    }

    pub(crate) fn platform(&self) -> TestPlatform {
        TestPlatform {
            base: self.base,
            pages: self.pages,
        }
    }
}

impl Drop for TestArena {
    fn drop(&mut self) {
        unsafe { alloc::alloc::dealloc(self.base.as_ptr(), self.layout) };
    }
}

pub(crate) struct TestPlatform {
    base: NonNull<u8>,
    pages: usize,
}

unsafe impl Send for TestPlatform {}

impl Backing for TestPlatform {
    fn map_range(&mut self, virt: usize, page_count: usize) -> Result<NonNull<u8>, MapError> {
        ensure!(
            virt == self.base.addr().get() && page_count <= self.pages,
            OutOfRangeSnafu { virt, page_count }
        );
        Ok(self.base)
    }
}

impl Console for TestPlatform {
    fn clear_screen(&mut self) {
        CONSOLE.with_borrow_mut(String::clear);
    }

    fn set_color(&mut self, fg: Color, bg: Color) {
        CONSOLE.with_borrow_mut(|out| write!(out, "{}", Attr::new(fg, bg)).unwrap());
    }

    fn print_str(&mut self, s: &str) {
        CONSOLE.with_borrow_mut(|out| out.push_str(s));
    }

    fn print_hex_word(&mut self, value: u16) {
        CONSOLE.with_borrow_mut(|out| write!(out, "{value:04X}").unwrap());
    }
}

impl Interrupts for TestPlatform {
    type State = bool;

    fn disable() -> Self::State {
        INTERRUPTS_ENABLED.replace(false)
    }

    fn restore(state: Self::State) {
        assert!(!interrupts_enabled(), "restoring with interrupts enabled");
        INTERRUPTS_ENABLED.set(state);
    }

    fn halt() -> ! {
        let irqs = if interrupts_enabled() {
            "enabled"
        } else {
            "masked"
        };
        panic!("halted with interrupts {irqs}\n{}", console_output());
    }
}
