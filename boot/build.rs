use std::env;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

/// Emits a `memory.x` linker script sized for the selected bootloader-size
/// feature, then tells `cortex-m-rt` where to find it. There's no
/// `HUBRIS_PKG_MAP`-style external descriptor here: this is a single-image
/// binary, so the two regions are just "bootloader" and "everything else",
/// and the split point is whichever of `bootloader-8k`/`bootloader-16k` is
/// active.
fn main() {
    let out = PathBuf::from(env::var_os("OUT_DIR").unwrap());

    let bootloader_size: u32 = if env::var_os("CARGO_FEATURE_BOOTLOADER_16K").is_some() {
        16 * 1024
    } else {
        8 * 1024
    };
    let ram_size: u32 = 64 * 1024;

    let mut linkscr = File::create(out.join("memory.x")).unwrap();
    writeln!(linkscr, "MEMORY").unwrap();
    writeln!(linkscr, "{{").unwrap();
    writeln!(
        linkscr,
        "  FLASH (rx) : ORIGIN = 0x00000000, LENGTH = {bootloader_size:#x}"
    )
    .unwrap();
    writeln!(
        linkscr,
        "  RAM (rwx) : ORIGIN = 0x20000000, LENGTH = {ram_size:#x}"
    )
    .unwrap();
    writeln!(linkscr, "}}").unwrap();

    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_BOOTLOADER_16K");
}
