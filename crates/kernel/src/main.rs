//! RISC-V supervisor-mode kernel built around the `kheap` allocator.
//!
//! The kernel is entered by OpenSBI on QEMU `virt`, sets up logging, maps
//! and seeds the kernel heap, exercises it once through `alloc` and then
//! idles. It only boots on bare-metal `riscv64`; other targets build a stub
//! binary so the workspace stays checkable on a host.

#![cfg_attr(target_os = "none", no_std, no_main)]

extern crate alloc;

use alloc::{boxed::Box, vec::Vec};

use log::info;

#[macro_use]
mod console;
mod boot;
mod error;
mod interrupt;
mod logger;
mod memory;

fn kernel_main(hartid: usize, dtb_pa: usize) -> ! {
    logger::init();
    info!("kernel starting on hart {hartid} (devicetree @ {dtb_pa:#x})");

    memory::init().unwrap_or_else(|err| error::report(err));
    heap_smoke_test();
    if let Some(stats) = memory::heap_stats() {
        info!(
            "heap: {} free blocks ({} bytes), {} used blocks ({} bytes)",
            stats.free_blocks, stats.free_bytes, stats.used_blocks, stats.used_bytes
        );
    }

    info!("boot complete");
    loop {
        interrupt::wait();
    }
}

fn heap_smoke_test() {
    let before = memory::heap_stats();

    let mut values = (0..1000_u64).collect::<Vec<_>>();
    let buffer = Box::new([0x5A_u8; 3000]);
    for value in &mut values {
        *value *= 3;
    }
    assert_eq!(values.iter().sum::<u64>(), 3 * 999 * 1000 / 2);
    assert!(buffer.iter().all(|&b| b == 0x5A));
    drop(values);
    drop(buffer);

    assert_eq!(memory::heap_stats(), before, "heap smoke test leaked");
    info!("heap smoke test passed");
}

#[cfg(not(target_os = "none"))]
fn main() {
    boot::host_entry();
}
