//! Content-address fingerprinting — spec §4.2 "Fingerprint" and I-M1.
//!
//! `fingerprint(t) = SHA-256(UTF-8(t))[..16]` interpreted big-endian as u128.
//! Two chunks with identical text always produce identical fingerprints.

use sha2::{Digest, Sha256};

/// Compute the 128-bit content-address fingerprint of `text`.
pub fn fingerprint(text: &str) -> u128 {
    let digest = Sha256::digest(text.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    u128::from_be_bytes(bytes)
}

/// Renders a fingerprint as a 128-bit bitmap — an informational visualization
/// only, per spec §4.2: "implementations MAY additionally expose a ... view
/// that renders the fingerprint as a bitmap; this view is informational, not
/// a re-encoding." `decode(bitmap(f)) == f` always holds.
pub fn bitmap(fp: u128) -> [bool; 128] {
    let mut bits = [false; 128];
    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = (fp >> (127 - i)) & 1 == 1;
    }
    bits
}

/// Inverse of [`bitmap`] — decodes the bitmap view back to its fingerprint.
pub fn decode_bitmap(bits: &[bool; 128]) -> u128 {
    let mut fp = 0u128;
    for &bit in bits.iter() {
        fp = (fp << 1) | (bit as u128);
    }
    fp
}
