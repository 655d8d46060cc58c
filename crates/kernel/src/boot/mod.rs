use core::ptr;

use crate::memory::layout;

mod imp;

#[cfg(not(target_os = "none"))]
pub use self::imp::host_entry;

unsafe fn init_bss() {
    let bss_range = layout::bss_addr_range();
    let bss_size = bss_range.end - bss_range.start;
    unsafe {
        ptr::write_bytes(
            ptr::with_exposed_provenance_mut::<u8>(bss_range.start),
            0,
            bss_size,
        );
    }
}

unsafe extern "C" fn boot_hart_start(hartid: usize, dtb_pa: usize) -> ! {
    unsafe {
        init_bss();
    }

    crate::kernel_main(hartid, dtb_pa);
}
