use core::{
    fmt::{self, Write as _},
    hint,
    sync::atomic::{AtomicBool, Ordering},
};

use ansi_term::{Attr, ClearScreen, Color};
use spin::Mutex;

use crate::interrupt;

mod sbi;

static CONSOLE: Mutex<SbiConsole> = Mutex::new(SbiConsole {});
static PANICKED: AtomicBool = AtomicBool::new(false);

struct SbiConsole {}

impl fmt::Write for SbiConsole {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let mut bytes = s.as_bytes();
        while !bytes.is_empty() {
            match sbi::write(bytes) {
                // If no bytes were written, we should stop.
                Ok(0) => break,
                Ok(written) => bytes = &bytes[written..],
                Err(_) => return Err(fmt::Error),
            }
        }
        Ok(())
    }
}

pub fn print(args: fmt::Arguments) {
    if PANICKED.load(Ordering::Acquire) {
        loop {
            // Spin forever to avoid further issues.
            hint::spin_loop();
        }
    }
    let _guard = interrupt::disable();
    let _ = CONSOLE.lock().write_fmt(args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::console::print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => {
        $crate::print!("\n")
    };
    ($($arg:tt)*) => {
        $crate::print!("{}\n", format_args!($($arg)*))
    };
}

/// The SBI console as seen by the heap's fatal path.
#[derive(Debug)]
pub struct KernelConsole;

impl kheap::Console for KernelConsole {
    fn clear_screen(&mut self) {
        print!("{ClearScreen}");
    }

    fn set_color(&mut self, fg: Color, bg: Color) {
        print!("{}", Attr::new(fg, bg));
    }

    fn print_str(&mut self, s: &str) {
        print!("{s}");
    }

    fn print_hex_word(&mut self, value: u16) {
        print!("{value:04X}");
    }
}

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    use ansi_term::{Reset, WithFg};

    let _guard = interrupt::disable();
    PANICKED.store(true, Ordering::Release);

    let mut console = CONSOLE.try_lock();
    let mut dummy_console = SbiConsole {};
    let console = console.as_deref_mut().unwrap_or(&mut dummy_console);

    let header = WithFg::new(Color::Red, "!!! KERNEL PANIC !!!");
    let _ = writeln!(console, "{Reset}\n\n{header}\n");
    if let Some(loc) = info.location() {
        let _ = writeln!(console, "Location:\n  {loc}\n");
    }
    let _ = writeln!(console, "Message:\n  {}\n", info.message());

    interrupt::halt();
}
