//! ANSI terminal attributes for the kernel console.
//!
//! The kernel talks to a serial terminal, so colours and screen control are
//! expressed as escape sequences. [`Color`] names the sixteen terminal
//! colours, [`Attr`] selects a foreground/background pair, and [`WithFg`]
//! wraps a value so that it is printed in a bold foreground colour.

#![no_std]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black,
    DarkGray,
    Red,
    LightRed,
    Green,
    LightGreen,
    Yellow,
    LightYellow,
    Blue,
    LightBlue,
    Magenta,
    LightMagenta,
    Cyan,
    LightCyan,
    White,
    LightGray,
    Default,
}

impl Color {
    fn code(self) -> (u8, bool) {
        match self {
            Self::Black => (0, false),
            Self::DarkGray => (0, true),
            Self::Red => (1, false),
            Self::LightRed => (1, true),
            Self::Green => (2, false),
            Self::LightGreen => (2, true),
            Self::Yellow => (3, false),
            Self::LightYellow => (3, true),
            Self::Blue => (4, false),
            Self::LightBlue => (4, true),
            Self::Magenta => (5, false),
            Self::LightMagenta => (5, true),
            Self::Cyan => (6, false),
            Self::LightCyan => (6, true),
            Self::White => (7, true),
            Self::LightGray => (7, false),
            Self::Default => (9, false),
        }
    }

    /// SGR parameter selecting this colour as foreground.
    #[must_use]
    pub fn fg(self) -> u8 {
        let (code, light) = self.code();
        if light { code + 90 } else { code + 30 }
    }

    /// SGR parameter selecting this colour as background.
    #[must_use]
    pub fn bg(self) -> u8 {
        let (code, light) = self.code();
        if light { code + 100 } else { code + 40 }
    }
}

/// Foreground/background attribute pair.
///
/// Printing an `Attr` switches the terminal to the pair; it stays active
/// until [`Reset`] is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub fg: Color,
    pub bg: Color,
}

impl Attr {
    #[must_use]
    pub const fn new(fg: Color, bg: Color) -> Self {
        Self { fg, bg }
    }
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\x1B[{};{};1m", self.fg.fg(), self.bg.bg())
    }
}

/// Restores the terminal's default attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reset;

impl fmt::Display for Reset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\x1B[0m")
    }
}

/// Erases the whole screen and homes the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearScreen;

impl fmt::Display for ClearScreen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\x1B[2J\x1B[H")
    }
}

pub struct WithFg<T>(Color, T);

impl<T> fmt::Display for WithFg<T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fg = self.0.fg();
        let value = &self.1;
        write!(f, "\x1B[{fg};1m{value}{Reset}")
    }
}

impl<T> WithFg<T> {
    pub fn new(color: Color, value: T) -> Self {
        Self(color, value)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::format;

    use super::*;

    #[test]
    fn test_fg_and_bg_codes() {
        assert_eq!(Color::Red.fg(), 31);
        assert_eq!(Color::LightRed.fg(), 91);
        assert_eq!(Color::Red.bg(), 41);
        assert_eq!(Color::Blue.bg(), 44);
        assert_eq!(Color::White.bg(), 107);
        assert_eq!(Color::Default.bg(), 49);
    }

    #[test]
    fn test_attr_sequence() {
        let attr = Attr::new(Color::White, Color::Red);
        assert_eq!(format!("{attr}"), "\x1B[97;41;1m");
    }

    #[test]
    fn test_with_fg_resets() {
        let text = format!("{}", WithFg::new(Color::Green, "ok"));
        assert_eq!(text, "\x1B[32;1mok\x1B[0m");
    }

    #[test]
    fn test_clear_screen() {
        assert_eq!(format!("{ClearScreen}"), "\x1B[2J\x1B[H");
    }
}
