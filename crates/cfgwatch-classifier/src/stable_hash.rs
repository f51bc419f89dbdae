//! Deterministic string hash for the diff feature view.
//!
//! The hash is a cross-implementation contract: an inference engine in a
//! different runtime must produce the same bucket for the same field name.
//!
//! ```text
//! h = 0u32
//! for each Unicode scalar value c:
//!     h = h * 31 + c        (mod 2^32)
//! return h as i32           (two's complement)
//! ```
//!
//! `h * 31` is written as `(h << 5) - h`, with explicit wrapping at every
//! step. Characters are Unicode scalar values, not UTF-16 code units and not
//! UTF-8 bytes.

/// Hash a string to a signed 32-bit integer.
pub fn stable_hash(s: &str) -> i32 {
    let mut h: u32 = 0;
    for c in s.chars() {
        h = (h << 5).wrapping_sub(h).wrapping_add(u32::from(c));
    }
    h as i32
}

/// Map a hash to a bucket in `[0, width)` via `abs(hash) % width`.
///
/// `i32::MIN` has no positive counterpart in `i32`; its absolute value is
/// taken in `u32` so it lands on `2147483648 % width` like the reference
/// implementation.
pub fn bucket_of(hash: i32, width: usize) -> usize {
    if width == 0 {
        return 0;
    }
    (u64::from(hash.unsigned_abs()) % width as u64) as usize
}

/// Bucket index for a changed field name.
pub fn diff_bucket(field: &str, width: usize) -> usize {
    bucket_of(stable_hash(field), width)
}
