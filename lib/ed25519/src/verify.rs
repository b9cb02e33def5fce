//! Ed25519 signature verification (RFC 8032 section 5.1.7), built directly
//! on [`crate::ge`] and [`crate::sc`] rather than a signing/keygen-capable
//! crate, since this core only ever needs to check a signature someone else
//! produced.

use crate::ge::{self, Point};
use crate::sc;
use crate::sha512::Sha512;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VerifyError {
    /// `S` was not in `[0, L)`; rejected outright per RFC 8032 to avoid
    /// scalar malleability.
    ScalarNotCanonical,
    /// The public key does not decode to a point on the curve.
    InvalidPublicKey,
    /// The recomputed `R` did not match the signature's `R`.
    Mismatch,
}

/// Verifies `signature` (64 bytes: `R || S`) over `message` under
/// `public_key`.
pub fn verify(signature: &[u8; 64], message: &[u8], public_key: &[u8; 32]) -> Result<(), VerifyError> {
    let r_bytes: [u8; 32] = signature[0..32].try_into().unwrap();
    let s_bytes: [u8; 32] = signature[32..64].try_into().unwrap();

    if !sc::is_canonical(&s_bytes) {
        return Err(VerifyError::ScalarNotCanonical);
    }

    let a = Point::decode(public_key).ok_or(VerifyError::InvalidPublicKey)?;
    let b = Point::decode(&ge::BASEPOINT_BYTES).expect("base point always decodes");

    let mut hasher = Sha512::new();
    hasher.update(&r_bytes);
    hasher.update(public_key);
    hasher.update(message);
    let digest = hasher.finalize();
    let k = sc::reduce(&digest);

    // Check [S]B == R + [k]A, i.e. [S]B - [k]A == R.
    let sb = ge::scalar_mult(&s_bytes, &b);
    let ka = ge::scalar_mult(&k, &a);
    let computed_r = sb.add(&ka.negate()).encode();

    if ct_eq_32(&computed_r, &r_bytes) {
        Ok(())
    } else {
        Err(VerifyError::Mismatch)
    }
}

/// Folds all 32 byte differences into one accumulator before testing
/// equality, so the result doesn't depend on the position of the first
/// mismatching byte.
fn ct_eq_32(a: &[u8; 32], b: &[u8; 32]) -> bool {
    let mut diff: i32 = 0;
    for i in 0..32 {
        diff |= (a[i] ^ b[i]) as i32;
    }
    (1 & ((diff - 1) >> 8)) == 1
}
