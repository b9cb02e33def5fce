//! The boot-time decision of whether to stay resident in the bootloader or
//! hand off to the application, factored out as a pure function so it can be
//! unit-tested without any hardware.

use abi::APP_VALID_MAGIC;

/// `true` iff the bootloader should remain resident rather than jump.
///
/// Two independent conditions each force residency: the host asked for it
/// (by setting the link to the 1200-baud "touch" convention), or the
/// application region hasn't been marked valid by a completed `DONE`.
pub fn should_stay_resident(host_baud: u32, valid_marker: u32) -> bool {
    host_baud == 1200 || valid_marker != APP_VALID_MAGIC
}
