#![cfg_attr(not(test), no_std)]

//! Shared constants and wire-reply catalogue for the bootloader core.
//!
//! Nothing in this crate depends on a specific flash layout except through
//! [`BoardConfig`], so `lib-proto` and `drv-flash` can be exercised against a
//! test layout on the host without `cfg`-gating their logic.

/// Flash programming granularity, in bytes.
pub const PAGE_SIZE: usize = 64;

/// Flash erase granularity, in bytes. Four pages per row.
pub const ROW_SIZE: usize = PAGE_SIZE * 4;

/// Sentinel written immediately below `APP_START` once an authenticated
/// image has been programmed. Reads back as `0xFFFF_FFFF` after an erase.
pub const APP_VALID_MAGIC: u32 = 0x55AA_13F0;

/// Bootloader version reported by `HELLO`. Kept as named constants, not just
/// baked into the reply string, so the wire format and the version number
/// can't silently drift apart.
pub const BOOT_VERSION_MAJOR: u8 = 1;
pub const BOOT_VERSION_MINOR: u8 = 0;

/// The flash layout and trusted signing key for one bootloader build.
///
/// Implemented once per bootloader-size variant (see [`DefaultBoard`]); a
/// host test implements it again with a small synthetic layout so the
/// protocol and flash crates can be driven without touching real hardware.
pub trait BoardConfig {
    /// Address of the first byte of the application image. Must be a
    /// multiple of [`ROW_SIZE`] and at least that large, since the
    /// bootloader itself occupies `[0, APP_START)`.
    const APP_START: u32;
    /// Total flash size in bytes.
    const FLASH_SIZE: u32;
    /// Ed25519 public key of the trusted firmware signer.
    const TRUSTED_PUBKEY: [u8; 32];
}

/// The production board layout: a 256 KiB-flash part with either an 8 KiB or
/// 16 KiB bootloader region, selected by Cargo feature.
pub struct DefaultBoard;

#[cfg(all(feature = "bootloader-8k", feature = "bootloader-16k"))]
compile_error!("choose exactly one of `bootloader-8k` / `bootloader-16k`");

impl BoardConfig for DefaultBoard {
    #[cfg(feature = "bootloader-16k")]
    const APP_START: u32 = 0x0000_4000;
    #[cfg(not(feature = "bootloader-16k"))]
    const APP_START: u32 = 0x0000_2000;

    const FLASH_SIZE: u32 = 256 * 1024;

    // The trusted signer's Ed25519 public key. Provided by the project
    // requirements and must not be altered.
    const TRUSTED_PUBKEY: [u8; 32] = [
        0xEA, 0x4D, 0x85, 0x32, 0xDB, 0x8F, 0xC5, 0x70, 0xE8, 0xA3, 0xC6,
        0xD9, 0x4C, 0x8F, 0x41, 0x29, 0xBE, 0x91, 0x13, 0xD5, 0xB6, 0xF3,
        0x51, 0x50, 0xD2, 0xD3, 0xE6, 0x7F, 0x62, 0x80, 0x49, 0x7B,
    ];
}

/// One of the fixed byte sequences the bootloader may send back to the host.
///
/// Every observable effect of a command ends up here: there is no separate
/// internal error type, because every error this crate can produce is, by
/// design, visible on the wire and nothing else.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Reply {
    BootHello,
    Erase,
    Write,
    Done,
    ErrFormat,
    ErrParam,
    ErrCrc,
    ErrUnknown,
    ErrSignature,
}

impl Reply {
    /// The exact, newline-terminated byte sequence sent to the host.
    pub const fn as_bytes(self) -> &'static [u8] {
        match self {
            Reply::BootHello => b"OK BOOT v1.0\n",
            Reply::Erase => b"OK ERASE\n",
            Reply::Write => b"OK WRITE\n",
            Reply::Done => b"OK DONE\n",
            Reply::ErrFormat => b"ERR FORMAT\n",
            Reply::ErrParam => b"ERR PARAM\n",
            Reply::ErrCrc => b"ERR CRC\n",
            Reply::ErrUnknown => b"ERR UNKNOWN\n",
            Reply::ErrSignature => b"ERR SIGNATURE\n",
        }
    }
}
