//! Interfaces the heap consumes from the rest of the kernel.
//!
//! The heap never touches hardware itself. It asks a [`Backing`] layer to
//! map its initial region, masks interrupts through [`Interrupts`] for the
//! duration of every public operation, and reports fatal corruption on a
//! [`Console`]. A kernel bundles the three into one [`Platform`] type.

use core::{fmt, marker::PhantomData, ptr::NonNull};

use ansi_term::Color;

use crate::fault::MapError;

/// The physical/virtual memory layer backing the heap range.
pub trait Backing {
    /// Maps `page_count` pages starting at `virt` with fresh physical memory
    /// and returns a pointer to the first mapped byte.
    fn map_range(&mut self, virt: usize, page_count: usize) -> Result<NonNull<u8>, MapError>;
}

/// Diagnostic output used by the fatal path.
///
/// Hex printers emit upper-case digits only, without a `0x` prefix, and
/// always emit the full width of their type.
pub trait Console {
    fn clear_screen(&mut self);
    fn set_color(&mut self, fg: Color, bg: Color);
    fn print_str(&mut self, s: &str);
    fn print_hex_word(&mut self, value: u16);

    #[expect(clippy::cast_possible_truncation)]
    fn print_hex_dword(&mut self, value: u32) {
        self.print_hex_word((value >> 16) as u16);
        self.print_hex_word(value as u16);
    }

    #[expect(clippy::cast_possible_truncation)]
    fn print_hex_qword(&mut self, value: u64) {
        self.print_hex_dword((value >> 32) as u32);
        self.print_hex_dword(value as u32);
    }

    fn print_hex_usize(&mut self, value: usize) {
        self.print_hex_qword(value as u64);
    }

    /// Prints formatted text. Errors raised by `Display` impls are dropped.
    fn print_fmt(&mut self, args: fmt::Arguments<'_>) {
        _ = fmt::write(&mut ConsoleWriter(self), args);
    }
}

/// Interrupt masking on the executing hart.
pub trait Interrupts {
    /// Interrupt state saved by [`disable`](Self::disable).
    type State: Copy;

    /// Masks interrupts and returns the previous state.
    fn disable() -> Self::State;

    /// Restores a state returned by [`disable`](Self::disable).
    fn restore(state: Self::State);

    /// Stops the hart for good. Interrupts are already masked.
    fn halt() -> !;
}

/// Everything the heap needs from its environment.
pub trait Platform: Backing + Console + Interrupts {}

impl<T> Platform for T where T: Backing + Console + Interrupts {}

/// Masks interrupts until dropped.
///
/// Guards nest: each one restores exactly the state it found, so only the
/// outermost guard re-enables interrupts.
#[must_use]
pub struct CriticalSection<I>
where
    I: Interrupts,
{
    state: I::State,
    _not_send: PhantomData<*mut ()>,
}

impl<I> CriticalSection<I>
where
    I: Interrupts,
{
    pub fn enter() -> Self {
        Self {
            state: I::disable(),
            _not_send: PhantomData,
        }
    }
}

impl<I> Drop for CriticalSection<I>
where
    I: Interrupts,
{
    fn drop(&mut self) {
        I::restore(self.state);
    }
}

/// Adapts a [`Console`] to [`fmt::Write`].
pub struct ConsoleWriter<'a, C>(pub &'a mut C)
where
    C: Console + ?Sized;

impl<C> fmt::Write for ConsoleWriter<'_, C>
where
    C: Console + ?Sized,
{
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.print_str(s);
        Ok(())
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::string::String;

    use super::*;

    #[derive(Default)]
    struct Capture(String);

    impl Console for Capture {
        fn clear_screen(&mut self) {
            self.0.clear();
        }

        fn set_color(&mut self, _fg: Color, _bg: Color) {}

        fn print_str(&mut self, s: &str) {
            self.0.push_str(s);
        }

        fn print_hex_word(&mut self, value: u16) {
            self.print_fmt(format_args!("{value:04X}"));
        }
    }

    #[test]
    fn test_hex_printers_use_full_width() {
        let mut console = Capture::default();
        console.print_hex_dword(0xBAB6_BADC);
        console.print_str(" ");
        console.print_hex_usize(0x10);
        assert_eq!(console.0, "BAB6BADC 0000000000000010");
    }

    #[test]
    fn test_print_fmt() {
        let mut console = Capture::default();
        console.print_fmt(format_args!("  {:<9}|", "size"));
        console.print_fmt(format_args!("{}", 42));
        assert_eq!(console.0, "  size     |42");

        let dynamic: &mut dyn Console = &mut console;
        dynamic.clear_screen();
        dynamic.print_fmt(format_args!(">= {:<6}", 512));
        assert_eq!(console.0, ">= 512   ");
    }
}
