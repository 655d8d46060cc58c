//! Addresses fixed by the linker script and the QEMU `virt` board.

use core::ops::Range;

/// RAM of the QEMU `virt` board with 128 MiB, identity mapped.
pub const RAM: Range<usize> = 0x8000_0000..0x8800_0000;

cfg_if::cfg_if! {
    if #[cfg(target_os = "none")] {
        unsafe extern "C" {
            #[link_name = "__kernel_image_start"]
            static mut KERNEL_START: u8;
            #[link_name = "__kernel_image_end"]
            static mut KERNEL_END: u8;
            #[link_name = "__kernel_bss_start"]
            static mut BSS_START: u8;
            #[link_name = "__kernel_bss_end"]
            static mut BSS_END: u8;
        }

        pub fn kernel_addr_range() -> Range<usize> {
            (&raw const KERNEL_START).addr()..(&raw const KERNEL_END).addr()
        }

        pub fn bss_addr_range() -> Range<usize> {
            (&raw const BSS_START).addr()..(&raw const BSS_END).addr()
        }
    } else {
        pub fn kernel_addr_range() -> Range<usize> {
            unimplemented!("no kernel image on this target");
        }

        pub fn bss_addr_range() -> Range<usize> {
            unimplemented!("no kernel image on this target");
        }
    }
}
