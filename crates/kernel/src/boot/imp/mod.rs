cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "riscv64", target_os = "none"))] {
        mod riscv64;
    } else {
        mod unsupported;
        pub use self::unsupported::host_entry;
    }
}
