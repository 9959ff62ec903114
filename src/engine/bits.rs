//! Bit-field extraction helpers shared by the operand decoder.
//!
//! All callers pass literal bit positions taken from the fixed instruction
//! formats, so these helpers are infallible by construction.

/// Extract bits `hi..lo` inclusive from `word`, zero-extended.
///
/// Requires `hi >= lo` and both within `[0, 31]`.
#[inline]
pub const fn bits(word: u32, hi: u32, lo: u32) -> u64 {
    let width = hi - lo + 1;
    ((word >> lo) as u64) & ((1u64 << width) - 1)
}

/// Extract the single bit at position `i`.
#[inline]
pub const fn bit(word: u32, i: u32) -> u64 {
    ((word >> i) & 1) as u64
}

/// Sign-extend a `width`-bit quantity to 64 bits, treating bit `width - 1`
/// of `value` as the sign.
#[inline]
pub const fn sext(value: u64, width: u32) -> u64 {
    let shift = 64 - width;
    (((value << shift) as i64) >> shift) as u64
}
