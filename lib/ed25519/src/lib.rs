#![cfg_attr(not(test), no_std)]

//! Self-contained SHA-256, SHA-512 and Ed25519 verification, written
//! against the curve arithmetic directly instead of pulling in a signing
//! library: this core only ever checks a signature someone else made, and
//! owning that code end to end is a project requirement, not an oversight.
//!
//! Module layout (hash engines, then field, then group, then scalar, then
//! the verifier built on top) mirrors how the embedded Ed25519 crates this
//! bootloader could otherwise have depended on break the same problem down.

mod fe51;
mod ge;
mod sc;
mod sha256;
mod sha512;
mod verify;

pub use sha256::{sha256, Sha256};
pub use sha512::{sha512, Sha512};
pub use verify::{verify, VerifyError};
