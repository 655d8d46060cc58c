//! Rendering of the fatal corruption screen.
//!
//! The dump shows the heap manager fields and the raw tags of the offending
//! block. Tags are read without validation since they are the suspect, but
//! only when they lie inside the mapped region.

use ansi_term::Color;

use crate::{
    block::{Footer, Header, Region},
    fault::Corruption,
    layout::{FOOTER_SIZE, GRANULARITY, HEADER_SIZE, SHORTCUT_COUNT, SHORTCUT_THRESHOLDS},
    platform::Console,
};

/// Heap manager fields at the time of the fault.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Snapshot {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) max_end: usize,
    pub(crate) head: usize,
    pub(crate) shortcuts: [usize; SHORTCUT_COUNT],
}

pub(crate) fn dump<C>(console: &mut C, region: &Region, snapshot: &Snapshot, fault: &Corruption)
where
    C: Console + ?Sized,
{
    console.clear_screen();
    console.set_color(Color::White, Color::Red);
    console.print_str("*** KERNEL HEAP CORRUPTION ***\n\n");

    console.print_str("Reason:   ");
    console.print_fmt(format_args!("{fault}"));
    console.print_str("\nDetected: ");
    console.print_fmt(format_args!("{}", fault.location()));
    console.print_str("\n\n");

    console.set_color(Color::LightGray, Color::Blue);
    console.print_str("Heap manager\n");
    field(console, "start", snapshot.start);
    field(console, "end", snapshot.end);
    field(console, "max end", snapshot.max_end);
    field(console, "head", snapshot.head);
    for (threshold, &shortcut) in SHORTCUT_THRESHOLDS.iter().zip(&snapshot.shortcuts) {
        console.print_fmt(format_args!("  >= {threshold:<6}"));
        console.print_str("0x");
        console.print_hex_usize(shortcut);
        console.print_str("\n");
    }

    let header_addr = fault.header();
    console.print_str("\nBlock header @ 0x");
    console.print_hex_usize(header_addr);
    console.print_str("\n");
    let Some(header) = read_header(region, header_addr) else {
        console.print_str("  <outside the heap>\n");
        halted(console);
        return;
    };
    dword(console, "magic", header.magic);
    dword(console, "hole", header.hole);
    field(console, "size", header.size);
    field(console, "prev", header.prev.addr());
    field(console, "next", header.next.addr());

    let footer_addr = header_addr
        .wrapping_add(header.size)
        .wrapping_sub(FOOTER_SIZE);
    console.print_str("\nBlock footer @ 0x");
    console.print_hex_usize(footer_addr);
    console.print_str("\n");
    if let Some(footer) = read_footer(region, header_addr, footer_addr) {
        dword(console, "magic", footer.magic);
        dword(console, "padding", footer.padding);
        field(console, "header", footer.header.addr());
    } else {
        console.print_str("  <outside the heap>\n");
    }

    halted(console);
}

fn halted<C>(console: &mut C)
where
    C: Console + ?Sized,
{
    console.set_color(Color::White, Color::Red);
    console.print_str("\nSystem halted.\n");
}

fn field<C>(console: &mut C, name: &str, value: usize)
where
    C: Console + ?Sized,
{
    console.print_fmt(format_args!("  {name:<9}"));
    console.print_str("0x");
    console.print_hex_usize(value);
    console.print_str("\n");
}

fn dword<C>(console: &mut C, name: &str, value: u32)
where
    C: Console + ?Sized,
{
    console.print_fmt(format_args!("  {name:<9}"));
    console.print_str("0x");
    console.print_hex_dword(value);
    console.print_str("\n");
}

fn read_header(region: &Region, addr: usize) -> Option<Header> {
    if !region.contains(addr, HEADER_SIZE) || !addr.is_multiple_of(GRANULARITY) {
        return None;
    }
    Some(unsafe { region.ptr::<Header>(addr).read() })
}

fn read_footer(region: &Region, header_addr: usize, addr: usize) -> Option<Footer> {
    if addr <= header_addr
        || !region.contains(addr, FOOTER_SIZE)
        || !addr.is_multiple_of(GRANULARITY)
    {
        return None;
    }
    Some(unsafe { region.ptr::<Footer>(addr).read() })
}
