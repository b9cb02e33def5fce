//! The one genuinely unsafe operation in this crate: tearing down the
//! bootloader's own execution state and branching into the application.
//!
//! Everything upstream of this (the protocol engine, the crypto core, the
//! flash driver) is safe Rust operating on plain buffers; this module is
//! where that safety ends, by necessity, because handing off control to
//! code the compiler knows nothing about cannot be expressed safely.

use abi::BoardConfig;

/// Reads the application's initial stack pointer and reset vector out of its
/// vector table (the first two words at `APP_START`), loads the Main Stack
/// Pointer, relocates the vector table base, and branches — never to
/// return.
///
/// # Safety
///
/// The caller must have already confirmed the valid marker is set and that
/// `B::APP_START` holds a real vector table: in particular the first word
/// (initial SP) must not be all-ones or all-zeros, since either indicates
/// erased or unprogrammed flash rather than a linked image. Calling this
/// against unverified flash contents is undefined behavior the moment
/// control reaches the garbage entry point.
pub unsafe fn jump_to_application<B: BoardConfig>() -> ! {
    let vector_table = B::APP_START as *const u32;
    let initial_sp = core::ptr::read_volatile(vector_table);
    let reset_vector = core::ptr::read_volatile(vector_table.add(1));

    cortex_m::interrupt::disable();

    // System Control Block VTOR: relocate the exception vector table to the
    // application's, before any exception (including the branch below) can
    // fire with the bootloader's vectors still active.
    const SCB_VTOR: *mut u32 = 0xE000_ED08 as *mut u32;
    core::ptr::write_volatile(SCB_VTOR, vector_table as u32);

    cortex_m::asm::dsb();
    cortex_m::asm::isb();

    core::arch::asm!(
        "msr MSP, {sp}",
        "bx {entry}",
        sp = in(reg) initial_sp,
        entry = in(reg) reset_vector,
        options(noreturn),
    );
}
