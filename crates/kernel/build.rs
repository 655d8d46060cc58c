use std::env;

fn main() {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap();
    let arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap();
    let os = env::var("CARGO_CFG_TARGET_OS").unwrap();

    println!("cargo::rerun-if-changed=kernel.ld");
    if arch == "riscv64" && os == "none" {
        println!("cargo::rustc-link-arg-bins=-T{manifest_dir}/kernel.ld");
    }
}
