pub fn host_entry() -> ! {
    // to suppress warnings
    let _ = super::super::boot_hart_start;
    unimplemented!("the kernel only boots on bare-metal riscv64");
}
