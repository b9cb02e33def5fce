//! Twisted Edwards curve group arithmetic in extended (X, Y, Z, T)
//! coordinates, `a = -1`. Formulas are the standard `add-2008-hwcd-3` and
//! `dbl-2008-hwcd` pair used throughout the Ed25519 ecosystem.

use crate::fe51::Fe51;

/// Edwards curve parameter `d = -121665/121666 mod p`, as its canonical
/// little-endian byte encoding.
const D_BYTES: [u8; 32] = [
    0xa3, 0x78, 0x59, 0x13, 0xca, 0x4d, 0xeb, 0x75, 0xab, 0xd8, 0x41, 0x41, 0x4d, 0x0a, 0x70, 0x00,
    0x98, 0xe8, 0x79, 0x77, 0x79, 0x40, 0xc7, 0x8c, 0x73, 0xfe, 0x6f, 0x2b, 0xee, 0x6c, 0x03, 0x52,
];

/// `sqrt(-1) mod p`, used to recover the other square root during point
/// decompression when the first candidate fails.
const SQRT_M1_BYTES: [u8; 32] = [
    0xb0, 0xa0, 0x0e, 0x4a, 0x27, 0x1b, 0xee, 0xc4, 0x78, 0xe4, 0x2c, 0xad, 0x06, 0x18, 0x43, 0x2f,
    0xa3, 0xd7, 0xfb, 0x3d, 0x99, 0x00, 0x4d, 0x2b, 0x0b, 0xdf, 0xc1, 0x4f, 0x80, 0x24, 0x83, 0x2b,
];

/// The standard base point B, compressed: `y = 4/5`, sign bit 0.
pub const BASEPOINT_BYTES: [u8; 32] = [
    0x58, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66,
    0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66, 0x66,
];

fn d() -> Fe51 {
    Fe51::from_bytes(&D_BYTES)
}

fn sqrt_m1() -> Fe51 {
    Fe51::from_bytes(&SQRT_M1_BYTES)
}

#[derive(Clone, Copy, Debug)]
pub struct Point {
    x: Fe51,
    y: Fe51,
    z: Fe51,
    t: Fe51,
}

impl Point {
    pub fn identity() -> Point {
        Point { x: Fe51::ZERO, y: Fe51::ONE, z: Fe51::ONE, t: Fe51::ZERO }
    }

    /// Decodes a compressed point: the low 255 bits are `y`, the top bit of
    /// byte 31 is the sign of `x`. Returns `None` if `y` doesn't lie on the
    /// curve or the decoded `x` is zero with the sign bit set (since `-0 ==
    /// 0`, that encoding can never be produced by [`Point::encode`]).
    pub fn decode(bytes: &[u8; 32]) -> Option<Point> {
        let sign = (bytes[31] >> 7) & 1;
        let mut y_bytes = *bytes;
        y_bytes[31] &= 0x7f;
        let y = Fe51::from_bytes(&y_bytes);

        let y2 = y.square();
        let u = y2.sub(&Fe51::ONE);
        let v = y2.mul(&d()).add(&Fe51::ONE);

        let v3 = v.square().mul(&v);
        let v7 = v3.square().mul(&v);
        let uv7 = u.mul(&v7);
        let candidate_root = uv7.pow_p_minus_5_over_8();
        let mut x = u.mul(&v3).mul(&candidate_root);

        let check = |x: &Fe51| v.mul(&x.square()).sub(&u).is_zero();

        if !check(&x) {
            x = x.mul(&sqrt_m1());
            if !check(&x) {
                return None;
            }
        }

        if x.is_zero() && sign == 1 {
            return None;
        }
        if x.is_negative() != (sign == 1) {
            x = x.negate();
        }

        let t = x.mul(&y);
        Some(Point { x, y, z: Fe51::ONE, t })
    }

    pub fn encode(&self) -> [u8; 32] {
        let z_inv = self.z.invert();
        let x = self.x.mul(&z_inv);
        let y = self.y.mul(&z_inv);
        let mut bytes = y.to_bytes();
        if x.is_negative() {
            bytes[31] |= 0x80;
        }
        bytes
    }

    pub fn negate(&self) -> Point {
        Point { x: self.x.negate(), y: self.y, z: self.z, t: self.t.negate() }
    }

    /// `add-2008-hwcd-3`, valid for any two points on a twisted Edwards
    /// curve with `a = -1` (the curves do not need to be distinct, so this
    /// also works as a general-purpose add during scalar multiplication).
    pub fn add(&self, rhs: &Point) -> Point {
        let d2 = d().add(&d());

        let a = self.y.sub(&self.x).mul(&rhs.y.sub(&rhs.x));
        let b = self.y.add(&self.x).mul(&rhs.y.add(&rhs.x));
        let c = self.t.mul(&d2).mul(&rhs.t);
        let dd = self.z.mul(&rhs.z).add(&self.z.mul(&rhs.z));
        let e = b.sub(&a);
        let f = dd.sub(&c);
        let g = dd.add(&c);
        let h = b.add(&a);

        Point { x: e.mul(&f), y: g.mul(&h), z: f.mul(&g), t: e.mul(&h) }
    }

    /// `dbl-2008-hwcd`. Ignores `self.t`, which doubling doesn't need.
    pub fn double(&self) -> Point {
        let a = self.x.square();
        let b = self.y.square();
        let c = self.z.square().add(&self.z.square());
        let dd = a.negate();
        let e = self.x.add(&self.y).square().sub(&a).sub(&b);
        let g = dd.add(&b);
        let f = g.sub(&c);
        let h = dd.sub(&b);

        Point { x: e.mul(&f), y: g.mul(&h), z: f.mul(&g), t: e.mul(&h) }
    }
}

/// Double-and-add scalar multiplication, MSB (bit 255) to LSB. Neither the
/// scalar nor the point is secret during signature verification, so this
/// deliberately isn't constant-time.
pub fn scalar_mult(scalar: &[u8; 32], point: &Point) -> Point {
    let mut acc = Point::identity();
    for i in (0..256).rev() {
        acc = acc.double();
        let bit = (scalar[i / 8] >> (i % 8)) & 1;
        if bit == 1 {
            acc = acc.add(point);
        }
    }
    acc
}
