use core::arch::naked_asm;

unsafe extern "C" {
    #[link_name = "__kernel_boot_stack_top"]
    static mut BOOT_STACK_TOP: u8;
}

// OpenSBI passes the information via the following registers of RISC-V CPU:
//
// * hartid via `a0` register
// * device tree blob address in memory via `a1` register
//
// https://github.com/riscv-software-src/opensbi/blob/master/docs/firmware/fw.md#opensbi-platform-firmwares
#[unsafe(naked)]
#[unsafe(link_section = ".text.entry")]
#[unsafe(export_name = "_start")]
unsafe extern "C" fn entry(hartid: usize, dtb_pa: usize) -> ! {
    naked_asm!(
        "la sp, {boot_stack_top}",
        "j {boot_hart_start}",
        boot_stack_top = sym BOOT_STACK_TOP,
        boot_hart_start = sym super::super::boot_hart_start,
    );
}
